use crate::error::{AnalyticsError, Result};
use crate::schema::{AnalysisConfig, Expense, ExpenseCategory, ExpenseTemplate, Sale, SaleKind};
use crate::utils::{round_cents, DateWindow};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const COUNTER_PARTS_PREFIX: &str = "auto-parts";
const SERVICE_PARTS_PREFIX: &str = "auto-service-parts";

/// An expense produced by the allocation engine but not yet persisted.
/// The idempotency key doubles as the record id once materialized, which
/// is what makes recomputation replace instead of accumulate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseDraft {
    pub date: NaiveDate,
    pub branch: String,
    pub category: ExpenseCategory,
    pub amount_usd: f64,
    pub allocation_pct: f64,
    pub template_id: Option<String>,
    pub auto_derived: bool,
    pub idempotency_key: String,
}

impl ExpenseDraft {
    pub fn into_expense(self) -> Expense {
        Expense {
            id: self.idempotency_key,
            date: self.date,
            branch: self.branch,
            category: self.category,
            amount_usd: self.amount_usd,
            allocation_pct: self.allocation_pct,
            template_id: self.template_id,
            auto_derived: self.auto_derived,
        }
    }
}

/// Distributes one logical expense across branches according to the
/// template's split, or an equal split when none is configured.
///
/// The draft amounts always sum to `total_amount` exactly: each share is
/// rounded to cents and the rounding remainder is assigned in full to the
/// first branch in the ordering.
pub fn allocate(
    template: &ExpenseTemplate,
    total_amount: f64,
    branches: &[String],
    date: NaiveDate,
    config: &AnalysisConfig,
) -> Result<Vec<ExpenseDraft>> {
    if total_amount <= 0.0 {
        return Ok(Vec::new());
    }

    let shares: Vec<(String, f64)> = if template.splits.is_empty() {
        if branches.is_empty() {
            return Ok(Vec::new());
        }
        let equal = 100.0 / branches.len() as f64;
        branches.iter().map(|b| (b.clone(), equal)).collect()
    } else {
        let sum: f64 = template.splits.iter().map(|s| s.pct).sum();
        if (sum - 100.0).abs() > config.split_tolerance {
            return Err(AnalyticsError::InvalidTemplateSplit {
                template: template.name.clone(),
                sum,
            });
        }
        template
            .splits
            .iter()
            .map(|s| (s.branch.clone(), s.pct))
            .collect()
    };

    let mut drafts: Vec<ExpenseDraft> = shares
        .iter()
        .map(|(branch, pct)| ExpenseDraft {
            date,
            branch: branch.clone(),
            category: template.category,
            amount_usd: floor_cents(total_amount * pct / 100.0),
            allocation_pct: *pct,
            template_id: Some(template.id.clone()),
            auto_derived: true,
            idempotency_key: format!("tpl:{}:{}:{}", template.id, branch, date),
        })
        .collect();

    let allocated: f64 = drafts.iter().map(|d| d.amount_usd).sum();
    let remainder = round_cents(total_amount - allocated);
    if remainder != 0.0 {
        drafts[0].amount_usd = round_cents(drafts[0].amount_usd + remainder);
    }

    Ok(drafts)
}

/// Rounds a share down to the cent. Flooring keeps the remainder
/// non-negative, so the first branch only ever gains the spare cents.
fn floor_cents(amount: f64) -> f64 {
    (amount * 100.0 + 1e-9).floor() / 100.0
}

/// Derives cost-of-parts expenses from the parts revenue inside `window`,
/// one draft per branch and sales channel: parts sold over the counter
/// and parts consumed inside labor jobs. Counter sales recorded without a
/// parts sub-amount fall back to the invoice total.
pub fn derive_automatic_expenses(
    sales: &[Sale],
    window: &DateWindow,
    config: &AnalysisConfig,
) -> Vec<ExpenseDraft> {
    struct BranchParts {
        counter: f64,
        in_service: f64,
        latest: NaiveDate,
    }

    let mut by_branch: BTreeMap<String, BranchParts> = BTreeMap::new();

    for sale in sales {
        if !window.contains(sale.date) || sale.validate().is_err() {
            continue;
        }

        let entry = by_branch
            .entry(sale.branch.clone())
            .or_insert_with(|| BranchParts {
                counter: 0.0,
                in_service: 0.0,
                latest: sale.date,
            });
        entry.latest = entry.latest.max(sale.date);

        match sale.kind {
            SaleKind::Parts => {
                let parts = if sale.parts_amount > 0.0 {
                    sale.parts_amount
                } else {
                    sale.amount_usd
                };
                entry.counter += parts;
            }
            SaleKind::Labor => entry.in_service += sale.parts_amount,
            SaleKind::Vehicle | SaleKind::Other => {}
        }
    }

    let ratio = config.default_allocation_ratio;
    let mut drafts = Vec::new();

    for (branch, parts) in by_branch {
        for (prefix, revenue) in [
            (COUNTER_PARTS_PREFIX, parts.counter),
            (SERVICE_PARTS_PREFIX, parts.in_service),
        ] {
            let cost = round_cents(revenue * ratio);
            if cost <= 0.0 {
                continue;
            }
            drafts.push(ExpenseDraft {
                date: parts.latest,
                branch: branch.clone(),
                category: ExpenseCategory::PartsCost,
                amount_usd: cost,
                allocation_pct: 100.0,
                template_id: None,
                auto_derived: true,
                idempotency_key: format!("{}:{}:{}", prefix, branch, window.label()),
            });
        }
    }

    debug!(
        "Derived {} automatic parts-cost drafts for {}",
        drafts.len(),
        window.label()
    );

    drafts
}

/// Reconciles freshly derived drafts against the store's current rows.
/// Existing auto-derived rows whose id matches an incoming idempotency
/// key are replaced; manually entered rows are never touched.
pub fn apply_drafts(existing: &[Expense], drafts: Vec<ExpenseDraft>) -> Vec<Expense> {
    let incoming: Vec<&str> = drafts.iter().map(|d| d.idempotency_key.as_str()).collect();

    let mut result: Vec<Expense> = existing
        .iter()
        .filter(|e| !(e.auto_derived && incoming.contains(&e.id.as_str())))
        .cloned()
        .collect();

    let replaced = existing.len() - result.len();
    if replaced > 0 {
        debug!("Replaced {replaced} previously derived expense rows");
    }

    result.extend(drafts.into_iter().map(ExpenseDraft::into_expense));
    result
}
