use anyhow::bail;

use crate::cli::report::{
    format_averages, format_categories, format_flagged, format_metric, format_monthly,
    format_mortgage, format_register, format_warnings,
};
use crate::cli::{run_pipeline, InputArgs};
use crate::models::{Period, Transaction};

pub fn run(input: &InputArgs, month: Option<Period>, json: bool) -> anyhow::Result<()> {
    let result = run_pipeline(input)?;
    let summary = &result.summary;

    if let Some(period) = month {
        let Some(metric) = summary.month(period) else {
            bail!("no transactions in {period}");
        };
        if json {
            println!("{}", serde_json::to_string_pretty(metric)?);
        } else {
            println!("{}\n", format_metric(&format!("Cash flow for {period}"), metric));
            println!("{}", format_categories(metric));
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if summary.month_count == 0 {
        println!("No transactions to analyze.");
    } else {
        println!("{}\n", format_metric("Overall cash flow", &summary.overall));
        println!("{}\n", format_averages(summary));
        println!("{}\n", format_monthly(&summary.monthly));
        if let Some(mortgage) = &summary.mortgage {
            println!("{}\n", format_mortgage(mortgage));
        }
        println!("{}", format_categories(&summary.overall));
    }
    if let Some(warnings) = format_warnings(&result) {
        println!("\n{warnings}");
    }
    Ok(())
}

pub fn register(input: &InputArgs, month: Option<Period>) -> anyhow::Result<()> {
    let result = run_pipeline(input)?;
    let rows: Vec<&Transaction> = result
        .transactions
        .iter()
        .filter(|t| month.map_or(true, |p| t.period() == p))
        .collect();
    if rows.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }
    println!("{}", format_register(&rows));
    Ok(())
}

pub fn flagged(input: &InputArgs) -> anyhow::Result<()> {
    let result = run_pipeline(input)?;
    println!("{}", format_flagged(&result.low_confidence));
    Ok(())
}
