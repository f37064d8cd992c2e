use crate::schema::{CostBehavior, Expense, Sale, SaleKind};
use crate::utils::{round_cents, DateWindow};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket for records whose grouping key is blank or inapplicable.
/// Such records are still aggregated, never dropped, so grouped totals
/// always partition the ungrouped ones.
pub const UNCLASSIFIED: &str = "unclassified";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum GroupBy {
    Branch,
    Client,
    Kind,
}

/// Revenue divided by fixed expenses, as a percentage. `Undefined` is a
/// first-class value: with no fixed expenses in the window the factor is
/// neither zero nor infinite, and consumers must decide what to render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", content = "value", rename_all = "PascalCase")]
pub enum Absorption {
    Defined(f64),
    Undefined,
}

impl Absorption {
    pub fn value(&self) -> Option<f64> {
        match self {
            Absorption::Defined(v) => Some(*v),
            Absorption::Undefined => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RevenueBreakdown {
    pub vehicle: f64,
    pub parts: f64,
    pub labor: f64,
    pub other: f64,
}

/// A read-only aggregate over one window. Computed on demand, never
/// persisted; recomputing from the same records reproduces it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct KpiSnapshot {
    pub window: DateWindow,
    pub revenue: f64,
    pub parts_revenue: f64,
    pub revenue_by_kind: RevenueBreakdown,
    pub expense: f64,
    pub fixed_expense: f64,
    pub variable_expense: f64,
    /// Revenue minus all expenses.
    pub margin: f64,
    /// Revenue minus variable expenses only.
    pub contribution_margin: f64,
    /// Total expense in the window; revenue above this line is surplus.
    pub break_even: f64,
    pub absorption: Absorption,
    pub sales_count: usize,
    pub expense_count: usize,
    pub skipped_sales: usize,
    pub skipped_expenses: usize,
}

pub fn aggregate(sales: &[Sale], expenses: &[Expense], window: &DateWindow) -> KpiSnapshot {
    let sale_refs: Vec<&Sale> = sales.iter().collect();
    let expense_refs: Vec<&Expense> = expenses.iter().collect();
    aggregate_refs(&sale_refs, &expense_refs, window)
}

fn aggregate_refs(sales: &[&Sale], expenses: &[&Expense], window: &DateWindow) -> KpiSnapshot {
    let mut revenue = 0.0;
    let mut parts_revenue = 0.0;
    let mut by_kind = RevenueBreakdown::default();
    let mut sales_count = 0;
    let mut skipped_sales = 0;

    for sale in sales {
        if !window.contains(sale.date) {
            continue;
        }
        if sale.validate().is_err() {
            skipped_sales += 1;
            continue;
        }
        sales_count += 1;
        revenue += sale.amount_usd;
        parts_revenue += sale.parts_amount;
        match sale.kind {
            SaleKind::Vehicle => by_kind.vehicle += sale.amount_usd,
            SaleKind::Parts => by_kind.parts += sale.amount_usd,
            SaleKind::Labor => by_kind.labor += sale.amount_usd,
            SaleKind::Other => by_kind.other += sale.amount_usd,
        }
    }

    let mut fixed_expense = 0.0;
    let mut variable_expense = 0.0;
    let mut expense_count = 0;
    let mut skipped_expenses = 0;

    for expense in expenses {
        if !window.contains(expense.date) {
            continue;
        }
        if expense.validate().is_err() {
            skipped_expenses += 1;
            continue;
        }
        expense_count += 1;
        match expense.category.behavior() {
            CostBehavior::Fixed => fixed_expense += expense.amount_usd,
            CostBehavior::Variable => variable_expense += expense.amount_usd,
        }
    }

    let revenue = round_cents(revenue);
    let parts_revenue = round_cents(parts_revenue);
    let fixed_expense = round_cents(fixed_expense);
    let variable_expense = round_cents(variable_expense);
    let expense = round_cents(fixed_expense + variable_expense);

    let absorption = if fixed_expense == 0.0 {
        Absorption::Undefined
    } else {
        Absorption::Defined(round_cents(revenue / fixed_expense * 100.0))
    };

    KpiSnapshot {
        window: *window,
        revenue,
        parts_revenue,
        revenue_by_kind: RevenueBreakdown {
            vehicle: round_cents(by_kind.vehicle),
            parts: round_cents(by_kind.parts),
            labor: round_cents(by_kind.labor),
            other: round_cents(by_kind.other),
        },
        expense,
        fixed_expense,
        variable_expense,
        margin: round_cents(revenue - expense),
        contribution_margin: round_cents(revenue - variable_expense),
        break_even: expense,
        absorption,
        sales_count,
        expense_count,
        skipped_sales,
        skipped_expenses,
    }
}

/// Aggregates one snapshot per group key. Keys are sorted by the map;
/// the result never depends on record insertion order.
pub fn aggregate_grouped(
    sales: &[Sale],
    expenses: &[Expense],
    window: &DateWindow,
    group_by: GroupBy,
) -> BTreeMap<String, KpiSnapshot> {
    let mut sale_groups: BTreeMap<String, Vec<&Sale>> = BTreeMap::new();
    let mut expense_groups: BTreeMap<String, Vec<&Expense>> = BTreeMap::new();

    for sale in sales {
        sale_groups
            .entry(sale_group_key(sale, group_by))
            .or_default()
            .push(sale);
    }
    for expense in expenses {
        expense_groups
            .entry(expense_group_key(expense, group_by))
            .or_default()
            .push(expense);
    }

    let mut keys: Vec<String> = sale_groups.keys().cloned().collect();
    keys.extend(expense_groups.keys().cloned());
    keys.sort();
    keys.dedup();

    let empty_sales: Vec<&Sale> = Vec::new();
    let empty_expenses: Vec<&Expense> = Vec::new();

    keys.into_iter()
        .map(|key| {
            let group_sales = sale_groups.get(&key).unwrap_or(&empty_sales);
            let group_expenses = expense_groups.get(&key).unwrap_or(&empty_expenses);
            let snapshot = aggregate_refs(group_sales, group_expenses, window);
            (key, snapshot)
        })
        .collect()
}

/// One snapshot per calendar month inside `window`, oldest first. This is
/// the series shape the anomaly detector consumes.
pub fn bucket_series(sales: &[Sale], expenses: &[Expense], window: &DateWindow) -> Vec<KpiSnapshot> {
    window
        .months()
        .iter()
        .map(|bucket| aggregate(sales, expenses, bucket))
        .collect()
}

fn sale_group_key(sale: &Sale, group_by: GroupBy) -> String {
    let key = match group_by {
        GroupBy::Branch => sale.branch.trim(),
        GroupBy::Client => sale.client.trim(),
        GroupBy::Kind => sale.kind.as_str(),
    };
    if key.is_empty() {
        UNCLASSIFIED.to_string()
    } else {
        key.to_string()
    }
}

fn expense_group_key(expense: &Expense, group_by: GroupBy) -> String {
    let key = match group_by {
        GroupBy::Branch => expense.branch.trim(),
        // Expenses carry no client or sale kind; they all land in the
        // explicit unclassified bucket so grouped totals still partition
        // the ungrouped ones.
        GroupBy::Client | GroupBy::Kind => "",
    };
    if key.is_empty() {
        UNCLASSIFIED.to_string()
    } else {
        key.to_string()
    }
}
