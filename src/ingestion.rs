use crate::schema::{Expense, ExpenseCategory, Sale, SaleKind};
use chrono::NaiveDate;
use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A sale row as it arrives from the spreadsheet/form surface, before any
/// validation. Every field the surface may leave blank is optional here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawSaleRow {
    pub id: Option<String>,
    pub date: Option<String>,
    pub branch: Option<String>,
    pub client: Option<String>,
    pub kind: Option<String>,
    pub amount_usd: Option<f64>,
    pub amount_local: Option<f64>,
    pub parts_amount: Option<f64>,
    pub attachment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawExpenseRow {
    pub id: Option<String>,
    pub date: Option<String>,
    pub branch: Option<String>,
    pub category: Option<String>,
    pub amount_usd: Option<f64>,
    pub allocation_pct: Option<f64>,
    pub template_id: Option<String>,
    pub auto_derived: Option<bool>,
}

/// A row that failed to parse into the typed shape, with the reason it was
/// turned away. Rejected rows never reach any aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRow {
    pub row: usize,
    pub id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Ingested<T> {
    pub accepted: Vec<T>,
    pub rejected: Vec<RejectedRow>,
}

pub fn ingest_sales(rows: &[RawSaleRow]) -> Ingested<Sale> {
    let mut out = Ingested {
        accepted: Vec::with_capacity(rows.len()),
        rejected: Vec::new(),
    };

    for (idx, row) in rows.iter().enumerate() {
        match parse_sale(row) {
            Ok(sale) => out.accepted.push(sale),
            Err(reason) => out.rejected.push(RejectedRow {
                row: idx,
                id: row.id.clone(),
                reason,
            }),
        }
    }

    if !out.rejected.is_empty() {
        warn!(
            "Rejected {} of {} sale rows during ingestion",
            out.rejected.len(),
            rows.len()
        );
    }

    out
}

pub fn ingest_expenses(rows: &[RawExpenseRow]) -> Ingested<Expense> {
    let mut out = Ingested {
        accepted: Vec::with_capacity(rows.len()),
        rejected: Vec::new(),
    };

    for (idx, row) in rows.iter().enumerate() {
        match parse_expense(row) {
            Ok(expense) => out.accepted.push(expense),
            Err(reason) => out.rejected.push(RejectedRow {
                row: idx,
                id: row.id.clone(),
                reason,
            }),
        }
    }

    if !out.rejected.is_empty() {
        warn!(
            "Rejected {} of {} expense rows during ingestion",
            out.rejected.len(),
            rows.len()
        );
    }

    out
}

fn parse_sale(row: &RawSaleRow) -> std::result::Result<Sale, String> {
    let id = required_text(&row.id, "id")?;
    let date = parse_date(&row.date)?;
    let kind_label = required_text(&row.kind, "kind")?;
    let kind = SaleKind::from_label(&kind_label)
        .ok_or_else(|| format!("unknown sale kind '{kind_label}'"))?;
    let amount_usd = row.amount_usd.ok_or("missing amount_usd")?;
    let parts_amount = row.parts_amount.unwrap_or(0.0);

    let sale = Sale {
        id,
        date,
        branch: row.branch.clone().unwrap_or_default().trim().to_string(),
        client: row.client.clone().unwrap_or_default().trim().to_string(),
        kind,
        amount_usd,
        amount_local: row.amount_local,
        parts_amount,
        attachment: row.attachment.clone(),
    };

    sale.validate().map_err(|e| e.to_string())?;
    Ok(sale)
}

fn parse_expense(row: &RawExpenseRow) -> std::result::Result<Expense, String> {
    let id = required_text(&row.id, "id")?;
    let date = parse_date(&row.date)?;
    let category_label = required_text(&row.category, "category")?;
    let category = ExpenseCategory::from_label(&category_label)
        .ok_or_else(|| format!("unknown expense category '{category_label}'"))?;
    let amount_usd = row.amount_usd.ok_or("missing amount_usd")?;

    let expense = Expense {
        id,
        date,
        branch: row.branch.clone().unwrap_or_default().trim().to_string(),
        category,
        amount_usd,
        allocation_pct: row.allocation_pct.unwrap_or(100.0),
        template_id: row.template_id.clone(),
        auto_derived: row.auto_derived.unwrap_or(false),
    };

    expense.validate().map_err(|e| e.to_string())?;
    Ok(expense)
}

fn required_text(field: &Option<String>, name: &str) -> std::result::Result<String, String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(format!("missing {name}")),
    }
}

fn parse_date(field: &Option<String>) -> std::result::Result<NaiveDate, String> {
    let text = field.as_deref().map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err("missing date".to_string());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{text}', expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sale_row(id: &str, kind: &str, amount: f64) -> RawSaleRow {
        RawSaleRow {
            id: Some(id.to_string()),
            date: Some("2024-05-10".to_string()),
            branch: Some("North".to_string()),
            client: Some("ACME Farms".to_string()),
            kind: Some(kind.to_string()),
            amount_usd: Some(amount),
            amount_local: None,
            parts_amount: None,
            attachment: None,
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected_not_coerced() {
        let rows = vec![sale_row("S-1", "parts", 100.0), sale_row("S-2", "rental", 50.0)];
        let out = ingest_sales(&rows);

        assert_eq!(out.accepted.len(), 1);
        assert_eq!(out.rejected.len(), 1);
        assert!(out.rejected[0].reason.contains("rental"));
    }

    #[test]
    fn test_invariant_violations_are_rejected() {
        let mut bad = sale_row("S-3", "parts", 100.0);
        bad.parts_amount = Some(250.0);
        let out = ingest_sales(&[bad]);

        assert!(out.accepted.is_empty());
        assert!(out.rejected[0].reason.contains("exceeds"));
    }

    #[test]
    fn test_expense_category_must_be_known() {
        let row = RawExpenseRow {
            id: Some("E-1".to_string()),
            date: Some("2024-05-31".to_string()),
            branch: Some("North".to_string()),
            category: Some("entertainment".to_string()),
            amount_usd: Some(75.0),
            allocation_pct: None,
            template_id: None,
            auto_derived: None,
        };
        let out = ingest_expenses(&[row]);

        assert!(out.accepted.is_empty());
        assert_eq!(out.rejected.len(), 1);
    }

    #[test]
    fn test_bad_date_is_rejected() {
        let mut row = sale_row("S-4", "labor", 80.0);
        row.date = Some("10/05/2024".to_string());
        let out = ingest_sales(&[row]);

        assert!(out.rejected[0].reason.contains("expected YYYY-MM-DD"));
    }
}
