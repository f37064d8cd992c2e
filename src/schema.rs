use crate::error::{AnalyticsError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SaleKind {
    #[schemars(description = "Sale of a whole machine or vehicle unit")]
    Vehicle,

    #[schemars(
        description = "Over-the-counter parts sale. The parts sub-amount drives automatic cost-of-parts expense derivation."
    )]
    Parts,

    #[schemars(
        description = "Workshop labor / service job. Parts consumed inside the job are recorded in the parts sub-amount."
    )]
    Labor,

    #[schemars(description = "Any other after-sales revenue (warranty claims, sundries)")]
    Other,
}

impl SaleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleKind::Vehicle => "vehicle",
            SaleKind::Parts => "parts",
            SaleKind::Labor => "labor",
            SaleKind::Other => "other",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "vehicle" => Some(SaleKind::Vehicle),
            "parts" => Some(SaleKind::Parts),
            "labor" | "labour" | "service" => Some(SaleKind::Labor),
            "other" => Some(SaleKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum CostBehavior {
    #[schemars(
        description = "Cost that does not move with sales volume (rent, salaries). Fixed expenses form the denominator of the absorption factor."
    )]
    Fixed,

    #[schemars(description = "Cost that scales with sales volume (parts cost, freight)")]
    Variable,
}

/// Closed set of expense categories. Every variant carries a cost behavior
/// so absorption-factor math is exhaustive; unknown category strings are
/// rejected at ingestion instead of being coerced into a default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum ExpenseCategory {
    #[schemars(description = "Wages and employer contributions for after-sales staff")]
    Salaries,

    #[schemars(description = "Premises rent and building charges")]
    Rent,

    #[schemars(description = "Electricity, water, heating, connectivity")]
    Utilities,

    #[schemars(description = "Business and workshop insurance premiums")]
    Insurance,

    #[schemars(description = "Depreciation of workshop tooling and vehicles")]
    Depreciation,

    #[schemars(
        description = "Cost of parts sold, over the counter or inside labor jobs. Automatic expense derivation writes into this category."
    )]
    PartsCost,

    #[schemars(description = "Inbound and outbound freight on parts")]
    Freight,

    #[schemars(description = "Consumables used by the workshop")]
    ShopSupplies,

    #[schemars(description = "Work outsourced to third parties")]
    Subcontracting,

    #[schemars(description = "Sales commissions on after-sales revenue")]
    Commissions,
}

impl ExpenseCategory {
    pub fn behavior(&self) -> CostBehavior {
        match self {
            ExpenseCategory::Salaries
            | ExpenseCategory::Rent
            | ExpenseCategory::Utilities
            | ExpenseCategory::Insurance
            | ExpenseCategory::Depreciation => CostBehavior::Fixed,
            ExpenseCategory::PartsCost
            | ExpenseCategory::Freight
            | ExpenseCategory::ShopSupplies
            | ExpenseCategory::Subcontracting
            | ExpenseCategory::Commissions => CostBehavior::Variable,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.behavior() == CostBehavior::Fixed
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace([' ', '-', '_'], "").as_str() {
            "salaries" | "wages" => Some(ExpenseCategory::Salaries),
            "rent" => Some(ExpenseCategory::Rent),
            "utilities" => Some(ExpenseCategory::Utilities),
            "insurance" => Some(ExpenseCategory::Insurance),
            "depreciation" => Some(ExpenseCategory::Depreciation),
            "partscost" | "costofparts" => Some(ExpenseCategory::PartsCost),
            "freight" => Some(ExpenseCategory::Freight),
            "shopsupplies" | "supplies" => Some(ExpenseCategory::ShopSupplies),
            "subcontracting" | "thirdparty" => Some(ExpenseCategory::Subcontracting),
            "commissions" => Some(ExpenseCategory::Commissions),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Sale {
    #[schemars(description = "Stable identifier assigned by the record store")]
    pub id: String,

    #[schemars(description = "Invoice date in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(description = "Branch that issued the invoice. Blank groups as 'unclassified'.")]
    pub branch: String,

    #[schemars(description = "Client name as invoiced")]
    pub client: String,

    #[schemars(description = "Revenue classification of the sale")]
    pub kind: SaleKind,

    #[schemars(description = "Invoice total in USD, the primary currency of record. Must be >= 0.")]
    pub amount_usd: f64,

    #[schemars(
        description = "Invoice total in the local currency at the stored reference rate. Reference only, never used in KPI math."
    )]
    pub amount_local: Option<f64>,

    #[schemars(
        description = "Portion of the total attributable to parts, in USD. Drives automatic cost-of-parts derivation. Must not exceed the total."
    )]
    pub parts_amount: f64,

    #[schemars(description = "Opaque handle to an attached voucher, not interpreted by the core")]
    pub attachment: Option<String>,
}

impl Sale {
    pub fn validate(&self) -> Result<()> {
        if self.amount_usd < 0.0 {
            return Err(AnalyticsError::ValidationError {
                id: self.id.clone(),
                details: format!("amount_usd {} is negative", self.amount_usd),
            });
        }
        if self.parts_amount < 0.0 {
            return Err(AnalyticsError::ValidationError {
                id: self.id.clone(),
                details: format!("parts_amount {} is negative", self.parts_amount),
            });
        }
        if self.parts_amount > self.amount_usd {
            return Err(AnalyticsError::ValidationError {
                id: self.id.clone(),
                details: format!(
                    "parts_amount {} exceeds amount_usd {}",
                    self.parts_amount, self.amount_usd
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Expense {
    #[schemars(description = "Stable identifier assigned by the record store")]
    pub id: String,

    #[schemars(description = "Accrual date in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(description = "Branch the expense is attributed to. Blank groups as 'unclassified'.")]
    pub branch: String,

    #[schemars(description = "Closed expense category, tagged fixed or variable")]
    pub category: ExpenseCategory,

    #[schemars(description = "Expense amount in USD. Must be >= 0.")]
    pub amount_usd: f64,

    #[schemars(
        description = "Share of the originating template's total allocated to this row, 0-100. Meaningful only for template-derived rows; 100 otherwise."
    )]
    pub allocation_pct: f64,

    #[schemars(description = "Identifier of the originating template, if any")]
    pub template_id: Option<String>,

    #[schemars(
        description = "True for rows derived from parts-sale revenue by the allocation engine. Auto-derived rows are replaced on recomputation, never accumulated."
    )]
    pub auto_derived: bool,
}

impl Expense {
    pub fn validate(&self) -> Result<()> {
        if self.amount_usd < 0.0 {
            return Err(AnalyticsError::ValidationError {
                id: self.id.clone(),
                details: format!("amount_usd {} is negative", self.amount_usd),
            });
        }
        if !(0.0..=100.0).contains(&self.allocation_pct) {
            return Err(AnalyticsError::ValidationError {
                id: self.id.clone(),
                details: format!("allocation_pct {} outside 0-100", self.allocation_pct),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BranchSplit {
    #[schemars(description = "Branch receiving this share of the template total")]
    pub branch: String,

    #[schemars(description = "Share of the template total, 0-100")]
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseTemplate {
    #[schemars(description = "Stable identifier assigned by the record store")]
    pub id: String,

    #[schemars(description = "Template name shown in the expense form")]
    pub name: String,

    #[schemars(description = "Category every expense drafted from this template will carry")]
    pub category: ExpenseCategory,

    #[schemars(description = "Default share suggested by the form when drafting manually, 0-100")]
    pub default_pct: f64,

    #[schemars(description = "Whether the form re-offers this template every month")]
    pub recurring: bool,

    #[schemars(
        description = "Per-branch percentage split for shared expenses. Must sum to 100 when present; an empty list means an equal split across the branches passed to allocate."
    )]
    #[serde(default)]
    pub splits: Vec<BranchSplit>,
}

/// Tuning values threaded into every entry point. Never a process-wide
/// default: callers construct one (or take `Default`) and pass it down.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisConfig {
    #[schemars(
        description = "Cost-of-parts ratio applied to parts revenue when deriving automatic expenses. 0.65 means parts cost 65% of invoiced value."
    )]
    pub default_allocation_ratio: f64,

    #[schemars(
        description = "Number of standard deviations from the trailing mean beyond which a point is anomalous"
    )]
    pub anomaly_std_dev_threshold: f64,

    #[schemars(description = "Buckets in the short moving average used for trend labeling")]
    pub trend_short_window: usize,

    #[schemars(description = "Buckets in the long moving average used for trend labeling")]
    pub trend_long_window: usize,

    #[schemars(
        description = "Relative gap between short and long moving averages below which a trend is labeled Flat"
    )]
    pub trend_tolerance: f64,

    #[schemars(description = "Tolerance when checking that template splits sum to 100")]
    pub split_tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_allocation_ratio: 0.65,
            anomaly_std_dev_threshold: 2.0,
            trend_short_window: 3,
            trend_long_window: 6,
            trend_tolerance: 0.02,
            split_tolerance: 0.01,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_allocation_ratio) {
            return Err(AnalyticsError::InvalidAllocationRatio(
                self.default_allocation_ratio,
            ));
        }
        if self.anomaly_std_dev_threshold <= 0.0 {
            return Err(AnalyticsError::InvalidAnomalyThreshold(
                self.anomaly_std_dev_threshold,
            ));
        }
        if self.trend_short_window == 0 || self.trend_short_window >= self.trend_long_window {
            return Err(AnalyticsError::InvalidTrendWindows {
                short: self.trend_short_window,
                long: self.trend_long_window,
            });
        }
        Ok(())
    }
}

/// One consistent snapshot of the record store, as handed to the core for
/// a single computation. Also the shape the form surface serializes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecordSet {
    #[schemars(description = "All sales visible to this computation")]
    pub sales: Vec<Sale>,

    #[schemars(description = "All expenses visible to this computation, manual and auto-derived")]
    pub expenses: Vec<Expense>,

    #[schemars(description = "Active expense templates")]
    #[serde(default)]
    pub templates: Vec<ExpenseTemplate>,
}

impl RecordSet {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RecordSet)
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = Self::generate_json_schema();
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
