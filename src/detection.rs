use crate::aggregation::KpiSnapshot;
use crate::schema::{AnalysisConfig, Sale};
use crate::utils::{round_cents, DateWindow};
use chrono::{Days, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Points required in the trailing window before a point is scored at
/// all. Below four trailing points the interquartile rule takes over
/// from the mean/sigma rule; below three, nothing is evaluated.
const MIN_TRAILING: usize = 3;
const STD_RULE_MIN_TRAILING: usize = 4;

/// Share of total revenue held by the top clients beyond which a
/// concentration advisory is emitted.
const CONCENTRATION_LIMIT: f64 = 50.0;
const CONCENTRATION_TOP_N: usize = 5;
const BRANCH_IMBALANCE_RATIO: f64 = 3.0;
const THIN_MARGIN_PCT: f64 = 10.0;
const MIX_DOMINANCE_RATIO: f64 = 1.5;

const FORECAST_MIN_SALES: usize = 7;
const FORECAST_LOOKBACK_DAYS: u64 = 14;
const FORECAST_HORIZON_DAYS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Metric {
    Revenue,
    Expense,
    Margin,
    Absorption,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Revenue,
        Metric::Expense,
        Metric::Margin,
        Metric::Absorption,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Revenue => "revenue",
            Metric::Expense => "expenses",
            Metric::Margin => "margin",
            Metric::Absorption => "absorption factor",
        }
    }

    fn value_in(&self, snapshot: &KpiSnapshot) -> Option<f64> {
        match self {
            Metric::Revenue => Some(snapshot.revenue),
            Metric::Expense => Some(snapshot.expense),
            Metric::Margin => Some(snapshot.margin),
            Metric::Absorption => snapshot.absorption.value(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub bucket: DateWindow,
    pub metric: Metric,
    pub value: f64,
    pub trailing_mean: f64,
    /// Normalized severity in 0.0..=1.0.
    pub severity: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReading {
    pub metric: Metric,
    pub trend: Trend,
    pub short_average: f64,
    pub long_average: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub projected_revenue: Option<f64>,
    pub daily_average: f64,
    pub confidence: Confidence,
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies: Vec<Anomaly>,
    pub trends: Vec<TrendReading>,
    pub recommendations: Vec<Recommendation>,
    pub forecast: Option<Forecast>,
}

impl Default for Forecast {
    fn default() -> Self {
        Self {
            projected_revenue: None,
            daily_average: 0.0,
            confidence: Confidence::Low,
            note: "Not enough data for a reliable projection".to_string(),
        }
    }
}

/// Scores every snapshot against the points that precede it and labels
/// the trend of each tracked metric. Sparsity is an expected state: with
/// fewer than two snapshots the report is empty, and metrics whose
/// history is too short are simply left out.
pub fn detect(series: &[KpiSnapshot], config: &AnalysisConfig) -> AnomalyReport {
    let mut report = AnomalyReport::default();

    if series.len() < 2 {
        return report;
    }

    for metric in Metric::ALL {
        let points: Vec<(usize, f64)> = series
            .iter()
            .enumerate()
            .filter_map(|(idx, snap)| metric.value_in(snap).map(|v| (idx, v)))
            .collect();

        for eval in MIN_TRAILING..points.len() {
            let trailing: Vec<f64> = points[..eval].iter().map(|(_, v)| *v).collect();
            let (idx, value) = points[eval];

            if let Some(anomaly) = score_point(metric, value, &trailing, config) {
                report.anomalies.push(Anomaly {
                    bucket: series[idx].window,
                    ..anomaly
                });
            }
        }

        let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
        if let Some(reading) = trend_reading(metric, &values, config) {
            report.trends.push(reading);
        }
    }

    report.recommendations = trend_recommendations(&report.trends, &report.anomalies);

    debug!(
        "Detection over {} buckets: {} anomalies, {} trends",
        series.len(),
        report.anomalies.len(),
        report.trends.len()
    );

    report
}

fn score_point(
    metric: Metric,
    value: f64,
    trailing: &[f64],
    config: &AnalysisConfig,
) -> Option<Anomaly> {
    let mean = trailing.iter().sum::<f64>() / trailing.len() as f64;

    if trailing.len() >= STD_RULE_MIN_TRAILING {
        let variance = trailing
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / (trailing.len() - 1) as f64;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            // Constant history. Any departure from the constant is
            // anomalous by itself; staying on it never is.
            if (value - mean).abs() > 1e-9 {
                return Some(anomaly(
                    metric,
                    value,
                    mean,
                    1.0,
                    format!(
                        "{} of {:.2} breaks a previously constant level of {:.2}",
                        capitalize(metric.label()),
                        value,
                        mean
                    ),
                ));
            }
            return None;
        }

        let z = (value - mean).abs() / std_dev;
        if z > config.anomaly_std_dev_threshold {
            let severity = (z / (2.0 * config.anomaly_std_dev_threshold)).min(1.0);
            return Some(anomaly(
                metric,
                value,
                mean,
                severity,
                format!(
                    "{} of {:.2} is {:.1} standard deviations from the trailing mean of {:.2}",
                    capitalize(metric.label()),
                    value,
                    z,
                    mean
                ),
            ));
        }
        return None;
    }

    // Short trailing window: interquartile fences instead of sigma.
    let mut sorted = trailing.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = quartile(&sorted, 0.25);
    let q3 = quartile(&sorted, 0.75);
    let iqr = q3 - q1;
    let lower = q1 - 1.5 * iqr;
    let upper = q3 + 1.5 * iqr;

    if value < lower || value > upper {
        let overshoot = if value > upper {
            value - upper
        } else {
            lower - value
        };
        let severity = if iqr > 0.0 {
            (overshoot / (1.5 * iqr)).min(1.0)
        } else {
            1.0
        };
        return Some(anomaly(
            metric,
            value,
            mean,
            severity,
            format!(
                "{} of {:.2} falls outside the interquartile fences [{:.2}, {:.2}] of the trailing window",
                capitalize(metric.label()),
                value,
                lower,
                upper
            ),
        ));
    }

    None
}

fn anomaly(metric: Metric, value: f64, mean: f64, severity: f64, explanation: String) -> Anomaly {
    Anomaly {
        // Placeholder window; the caller substitutes the real bucket.
        bucket: DateWindow {
            start: NaiveDate::MIN,
            end: NaiveDate::MIN,
        },
        metric,
        value,
        trailing_mean: round_cents(mean),
        severity: (severity * 10_000.0).round() / 10_000.0,
        explanation,
    }
}

/// Linear-interpolation quartile over an already sorted slice.
fn quartile(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn trend_reading(metric: Metric, values: &[f64], config: &AnalysisConfig) -> Option<TrendReading> {
    if values.len() < config.trend_long_window {
        return None;
    }

    let short = mean(&values[values.len() - config.trend_short_window..]);
    let long = mean(&values[values.len() - config.trend_long_window..]);
    let gap = short - long;
    let threshold = long.abs() * config.trend_tolerance;

    let trend = if gap > threshold {
        Trend::Rising
    } else if gap < -threshold {
        Trend::Falling
    } else {
        Trend::Flat
    };

    Some(TrendReading {
        metric,
        trend,
        short_average: round_cents(short),
        long_average: round_cents(long),
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Templated advisory text keyed by metric and direction. Presentation
/// glue, deliberately a lookup rather than logic.
fn trend_recommendations(trends: &[TrendReading], anomalies: &[Anomaly]) -> Vec<Recommendation> {
    let mut out = Vec::new();

    for reading in trends {
        let template = match (reading.metric, reading.trend) {
            (Metric::Revenue, Trend::Falling) => Some((
                "revenue-falling",
                "Revenue is trending down; follow up with inactive clients and review open quotes",
            )),
            (Metric::Revenue, Trend::Rising) => Some((
                "revenue-rising",
                "Revenue is trending up; confirm parts stock can keep pace with demand",
            )),
            (Metric::Expense, Trend::Rising) => Some((
                "expense-rising",
                "Expenses are trending up faster than their recent baseline; review recurring templates",
            )),
            (Metric::Margin, Trend::Falling) => Some((
                "margin-falling",
                "Margin is trending down; check variable costs against parts pricing",
            )),
            (Metric::Absorption, Trend::Falling) => Some((
                "absorption-falling",
                "The absorption factor is trending down; fixed costs are outgrowing after-sales revenue",
            )),
            _ => None,
        };
        if let Some((code, message)) = template {
            out.push(Recommendation {
                code: code.to_string(),
                message: message.to_string(),
            });
        }
    }

    for anomaly in anomalies {
        out.push(Recommendation {
            code: format!("anomaly-{}", anomaly.metric.label().replace(' ', "-")),
            message: format!("Investigate the flagged period: {}", anomaly.explanation),
        });
    }

    out
}

/// Advisories computed from the raw records of the window rather than
/// the bucket series: client concentration, branch imbalance, thin
/// margin, and sales-mix dominance.
pub fn portfolio_recommendations(sales: &[Sale], overall: &KpiSnapshot) -> Vec<Recommendation> {
    let mut out = Vec::new();

    let in_window: Vec<&Sale> = sales
        .iter()
        .filter(|s| overall.window.contains(s.date) && s.validate().is_ok())
        .collect();

    if overall.revenue > 0.0 {
        let margin_pct = overall.margin / overall.revenue * 100.0;
        if overall.expense > overall.revenue {
            out.push(Recommendation {
                code: "expenses-exceed-revenue".to_string(),
                message: "Expenses exceed revenue for this window; review spending urgently"
                    .to_string(),
            });
        } else if margin_pct < THIN_MARGIN_PCT {
            out.push(Recommendation {
                code: "thin-margin".to_string(),
                message: format!(
                    "Margin is thin at {margin_pct:.1}% of revenue; review expenses or pricing"
                ),
            });
        }
    }

    let mut by_client: BTreeMap<&str, f64> = BTreeMap::new();
    let mut by_branch: BTreeMap<&str, f64> = BTreeMap::new();
    for sale in &in_window {
        *by_client.entry(sale.client.as_str()).or_default() += sale.amount_usd;
        if !sale.branch.trim().is_empty() {
            *by_branch.entry(sale.branch.as_str()).or_default() += sale.amount_usd;
        }
    }

    if by_client.len() > CONCENTRATION_TOP_N && overall.revenue > 0.0 {
        let mut totals: Vec<f64> = by_client.values().copied().collect();
        totals.sort_by(|a, b| b.total_cmp(a));
        let top: f64 = totals.iter().take(CONCENTRATION_TOP_N).sum();
        let share = top / overall.revenue * 100.0;
        if share > CONCENTRATION_LIMIT {
            out.push(Recommendation {
                code: "client-concentration".to_string(),
                message: format!(
                    "The top {CONCENTRATION_TOP_N} clients account for {share:.1}% of revenue; consider diversifying the portfolio"
                ),
            });
        }
    }

    if by_branch.len() > 1 {
        let (max_branch, max_rev) = by_branch
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, v)| (*k, *v))
            .unwrap_or(("", 0.0));
        let (min_branch, min_rev) = by_branch
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, v)| (*k, *v))
            .unwrap_or(("", 0.0));
        if min_rev > 0.0 && max_rev / min_rev > BRANCH_IMBALANCE_RATIO {
            out.push(Recommendation {
                code: "branch-imbalance".to_string(),
                message: format!(
                    "Revenue at {max_branch} is more than {BRANCH_IMBALANCE_RATIO:.0}x that of {min_branch}; review branch strategy"
                ),
            });
        }
    }

    let labor = overall.revenue_by_kind.labor;
    let parts = overall.revenue_by_kind.parts;
    if labor > parts * MIX_DOMINANCE_RATIO && parts > 0.0 {
        out.push(Recommendation {
            code: "mix-labor-heavy".to_string(),
            message: "Labor dominates the sales mix; counter parts sales may be underdeveloped"
                .to_string(),
        });
    } else if parts > labor * MIX_DOMINANCE_RATIO && labor > 0.0 {
        out.push(Recommendation {
            code: "mix-parts-heavy".to_string(),
            message: "Parts dominate the sales mix; workshop capacity may be underused".to_string(),
        });
    }

    out
}

/// Projects the next 30 days of revenue from the trailing two weeks of
/// sales, graded by how noisy the daily totals were.
pub fn forecast_next_period(sales: &[Sale]) -> Forecast {
    let valid: Vec<&Sale> = sales.iter().filter(|s| s.validate().is_ok()).collect();
    if valid.len() < FORECAST_MIN_SALES {
        return Forecast::default();
    }

    let latest = valid.iter().map(|s| s.date).max().unwrap_or(NaiveDate::MIN);
    let cutoff = latest
        .checked_sub_days(Days::new(FORECAST_LOOKBACK_DAYS))
        .unwrap_or(NaiveDate::MIN);

    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for sale in valid.iter().filter(|s| s.date > cutoff) {
        *daily.entry(sale.date).or_default() += sale.amount_usd;
    }

    if daily.is_empty() {
        return Forecast::default();
    }

    let first = *daily.keys().next().unwrap();
    let last = *daily.keys().next_back().unwrap();
    let active_days = ((last - first).num_days() + 1).max(1) as f64;
    let total: f64 = daily.values().sum();
    let daily_average = total / active_days;

    let confidence = if daily.len() < 2 || daily_average <= 0.0 {
        Confidence::Low
    } else {
        let day_mean = total / daily.len() as f64;
        let variance = daily
            .values()
            .map(|v| (v - day_mean).powi(2))
            .sum::<f64>()
            / (daily.len() - 1) as f64;
        let cv = variance.sqrt() / daily_average;
        if cv < 0.3 {
            Confidence::High
        } else if cv < 0.6 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    };

    Forecast {
        projected_revenue: Some(round_cents(daily_average * FORECAST_HORIZON_DAYS)),
        daily_average: round_cents(daily_average),
        confidence,
        note: format!(
            "Based on a daily average of {:.2} USD over the trailing {} days",
            daily_average, FORECAST_LOOKBACK_DAYS
        ),
    }
}
