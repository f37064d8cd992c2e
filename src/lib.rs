//! # Aftersales Analytics
//!
//! A library for reconciling a small business's after-sales revenue and
//! expenses into windowed KPIs, trend labels, and anomaly reports.
//!
//! ## Core Concepts
//!
//! - **Records**: typed `Sale` / `Expense` / `ExpenseTemplate` values, handed
//!   in by the record store; the core performs no I/O of its own
//! - **Allocation**: distributing shared template expenses across branch
//!   percentage splits, and deriving cost-of-parts expenses from parts revenue
//! - **KPI Snapshot**: an on-demand aggregate over a date window — revenue,
//!   expenses, margin, and the absorption factor (revenue over fixed costs)
//! - **Detection**: trailing-window statistics over monthly snapshots,
//!   flagging outliers and labeling each metric Rising, Falling, or Flat
//!
//! ## Example
//!
//! ```rust,ignore
//! use aftersales_analytics::*;
//! use chrono::NaiveDate;
//!
//! let config = AnalysisConfig::default();
//! let window = DateWindow::new(
//!     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
//! )?;
//!
//! // Derive this window's automatic parts-cost expenses and reconcile
//! // them with what the store already holds.
//! let drafts = derive_automatic_expenses(&sales, &window, &config);
//! let expenses = apply_drafts(&stored_expenses, drafts);
//!
//! // One report: overall KPIs, per-branch KPIs, anomalies, trends.
//! let report = run_review(&sales, &expenses, &window, Some(GroupBy::Branch), &config)?;
//! println!("{}", report.to_json()?);
//! ```

pub mod aggregation;
pub mod allocation;
pub mod detection;
pub mod error;
pub mod ingestion;
pub mod report;
pub mod schema;
pub mod utils;

pub use aggregation::{
    aggregate, aggregate_grouped, bucket_series, Absorption, GroupBy, KpiSnapshot,
    RevenueBreakdown, UNCLASSIFIED,
};
pub use allocation::{allocate, apply_drafts, derive_automatic_expenses, ExpenseDraft};
pub use detection::{
    detect, forecast_next_period, portfolio_recommendations, Anomaly, AnomalyReport, Confidence,
    Forecast, Metric, Recommendation, Trend, TrendReading,
};
pub use error::{AnalyticsError, Result};
pub use ingestion::{ingest_expenses, ingest_sales, Ingested, RawExpenseRow, RawSaleRow, RejectedRow};
pub use report::{assemble, AssembledReport, ReportEntry};
pub use schema::*;
pub use utils::{round_cents, DateWindow};

use log::{debug, info};
use std::collections::BTreeMap;

pub struct ReviewProcessor;

impl ReviewProcessor {
    /// Runs the full review pipeline over one consistent snapshot of
    /// records: monthly bucket series → detection → overall and grouped
    /// aggregation → assembly.
    pub fn review(
        sales: &[Sale],
        expenses: &[Expense],
        window: &DateWindow,
        group_by: Option<GroupBy>,
        config: &AnalysisConfig,
    ) -> Result<AssembledReport> {
        config.validate()?;

        info!(
            "Reviewing {} sales and {} expenses over {}",
            sales.len(),
            expenses.len(),
            window.label()
        );

        let overall = aggregate(sales, expenses, window);
        debug!(
            "Window totals: revenue {:.2}, expense {:.2} ({} sale rows skipped, {} expense rows skipped)",
            overall.revenue, overall.expense, overall.skipped_sales, overall.skipped_expenses
        );

        let groups = match group_by {
            Some(dimension) => aggregate_grouped(sales, expenses, window, dimension),
            None => BTreeMap::new(),
        };

        let series = bucket_series(sales, expenses, window);
        let mut analysis = detect(&series, config);
        analysis.forecast = Some(forecast_next_period(sales));
        analysis
            .recommendations
            .extend(portfolio_recommendations(sales, &overall));

        Ok(assemble(overall, groups, group_by, analysis))
    }
}

pub fn run_review(
    sales: &[Sale],
    expenses: &[Expense],
    window: &DateWindow,
    group_by: Option<GroupBy>,
    config: &AnalysisConfig,
) -> Result<AssembledReport> {
    ReviewProcessor::review(sales, expenses, window, group_by, config)
}
