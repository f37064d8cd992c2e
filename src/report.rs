use crate::aggregation::{GroupBy, KpiSnapshot};
use crate::detection::AnomalyReport;
use crate::error::Result;
use crate::utils::round_cents;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub key: String,
    pub snapshot: KpiSnapshot,
}

/// The presentation-ready composition of everything the core computed:
/// the overall snapshot first, then one entry per group key in
/// lexicographic order. Pure composition, no arithmetic of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledReport {
    pub overall: KpiSnapshot,
    pub group_by: Option<GroupBy>,
    pub entries: Vec<ReportEntry>,
    pub analysis: AnomalyReport,
}

pub fn assemble(
    overall: KpiSnapshot,
    groups: BTreeMap<String, KpiSnapshot>,
    group_by: Option<GroupBy>,
    analysis: AnomalyReport,
) -> AssembledReport {
    let entries = groups
        .into_iter()
        .map(|(key, snapshot)| ReportEntry { key, snapshot })
        .collect();

    AssembledReport {
        overall,
        group_by,
        entries,
        analysis,
    }
}

impl AssembledReport {
    /// Sums revenue and expense back out of the grouped entries. The
    /// assembly loses nothing, so these match the overall snapshot.
    pub fn recompute_totals(&self) -> (f64, f64) {
        let revenue = self.entries.iter().map(|e| e.snapshot.revenue).sum();
        let expense = self.entries.iter().map(|e| e.snapshot.expense).sum();
        (round_cents(revenue), round_cents(expense))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{aggregate, aggregate_grouped};
    use crate::schema::{Sale, SaleKind};
    use crate::utils::DateWindow;
    use chrono::NaiveDate;

    fn sale(id: &str, branch: &str, amount: f64) -> Sale {
        Sale {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            branch: branch.to_string(),
            client: "ACME Farms".to_string(),
            kind: SaleKind::Parts,
            amount_usd: amount,
            amount_local: None,
            parts_amount: 0.0,
            attachment: None,
        }
    }

    #[test]
    fn test_entries_are_ordered_lexicographically() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .unwrap();
        let sales = vec![
            sale("S-1", "West", 100.0),
            sale("S-2", "East", 200.0),
            sale("S-3", "North", 300.0),
        ];

        let overall = aggregate(&sales, &[], &window);
        let groups = aggregate_grouped(&sales, &[], &window, GroupBy::Branch);
        let report = assemble(overall, groups, Some(GroupBy::Branch), AnomalyReport::default());

        let keys: Vec<&str> = report.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["East", "North", "West"]);
    }

    #[test]
    fn test_round_trip_preserves_totals() {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .unwrap();
        let sales = vec![
            sale("S-1", "West", 123.45),
            sale("S-2", "East", 678.90),
            sale("S-3", "", 42.42),
        ];

        let overall = aggregate(&sales, &[], &window);
        let groups = aggregate_grouped(&sales, &[], &window, GroupBy::Branch);
        let report = assemble(
            overall.clone(),
            groups,
            Some(GroupBy::Branch),
            AnomalyReport::default(),
        );

        let (revenue, expense) = report.recompute_totals();
        assert_eq!(revenue, overall.revenue);
        assert_eq!(expense, overall.expense);
    }
}
