use aftersales_analytics::*;
use chrono::NaiveDate;

fn main() -> anyhow::Result<()> {
    println!("📊 Half-Year After-Sales Review Demo\n");
    println!("Builds six months of sales and expenses for two branches, derives");
    println!("the automatic parts-cost expenses, and runs the full review.\n");

    let config = AnalysisConfig::default();
    let window = DateWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
    )?;

    let mut sales = Vec::new();
    for month in 1..=6u32 {
        let date = NaiveDate::from_ymd_opt(2024, month, 14).unwrap();
        // Workshop revenue grows slowly; June gets a one-off fleet job.
        let labor_amount = if month == 6 { 46_000.0 } else { 11_000.0 + month as f64 * 400.0 };
        sales.push(Sale {
            id: format!("S-LAB-{month}"),
            date,
            branch: "North".to_string(),
            client: "ACME Farms".to_string(),
            kind: SaleKind::Labor,
            amount_usd: labor_amount,
            amount_local: None,
            parts_amount: labor_amount * 0.4,
            attachment: None,
        });
        sales.push(Sale {
            id: format!("S-PRT-{month}"),
            date,
            branch: "South".to_string(),
            client: "Riverbend Contractors".to_string(),
            kind: SaleKind::Parts,
            amount_usd: 6_500.0,
            amount_local: None,
            parts_amount: 6_500.0,
            attachment: None,
        });
    }

    let mut expenses = Vec::new();
    let rent = ExpenseTemplate {
        id: "T-RENT".to_string(),
        name: "Workshop rent".to_string(),
        category: ExpenseCategory::Rent,
        default_pct: 100.0,
        recurring: true,
        splits: vec![
            BranchSplit { branch: "North".to_string(), pct: 60.0 },
            BranchSplit { branch: "South".to_string(), pct: 40.0 },
        ],
    };
    let branches = vec!["North".to_string(), "South".to_string()];
    for month in 1..=6u32 {
        let date = NaiveDate::from_ymd_opt(2024, month, 1).unwrap();
        let drafts = allocate(&rent, 5_000.0, &branches, date, &config)?;
        expenses = apply_drafts(&expenses, drafts);
    }

    let auto = derive_automatic_expenses(&sales, &window, &config);
    println!("🔧 Derived {} automatic parts-cost drafts", auto.len());
    expenses = apply_drafts(&expenses, auto);

    let report = run_review(&sales, &expenses, &window, Some(GroupBy::Branch), &config)?;

    println!("\n💰 Overall window:");
    println!("  Revenue:    {:>12.2}", report.overall.revenue);
    println!("  Expenses:   {:>12.2}", report.overall.expense);
    println!("  Margin:     {:>12.2}", report.overall.margin);
    match report.overall.absorption {
        Absorption::Defined(factor) => println!("  Absorption: {factor:>11.1}%"),
        Absorption::Undefined => println!("  Absorption:   undefined (no fixed expenses)"),
    }

    println!("\n🏢 Per branch:");
    for entry in &report.entries {
        println!(
            "  {:<14} revenue {:>10.2}  margin {:>10.2}",
            entry.key, entry.snapshot.revenue, entry.snapshot.margin
        );
    }

    println!("\n🚨 Anomalies: {}", report.analysis.anomalies.len());
    for anomaly in &report.analysis.anomalies {
        println!("  - {}", anomaly.explanation);
    }

    println!("\n📈 Trends:");
    for reading in &report.analysis.trends {
        println!("  - {:?}: {:?}", reading.metric, reading.trend);
    }

    if let Some(forecast) = &report.analysis.forecast {
        println!("\n🔮 Forecast ({:?} confidence): {}", forecast.confidence, forecast.note);
    }

    for recommendation in &report.analysis.recommendations {
        println!("💡 {}", recommendation.message);
    }

    Ok(())
}
