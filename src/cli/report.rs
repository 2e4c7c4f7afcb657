use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};
use rust_decimal::Decimal;

use crate::aggregator::{CashFlowSummary, MonthlyMetric, MortgageSummary};
use crate::fmt::{money, percent};
use crate::models::{SplitRole, Transaction};
use crate::pipeline::AnalysisResult;

const DESCRIPTION_WIDTH: usize = 40;

fn amount_cell(val: Decimal) -> Cell {
    Cell::new(money(val)).set_alignment(CellAlignment::Right)
}

fn net_cell(val: Decimal) -> Cell {
    let text = money(val);
    let text = if val.is_sign_negative() && !val.is_zero() {
        text.red()
    } else {
        text.green()
    };
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}\u{2026}")
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn format_metric(title: &str, m: &MonthlyMetric) -> String {
    let mut table = Table::new();
    table.set_header(vec!["", "Amount"]);
    table.add_row(vec![Cell::new("Income".green().bold()), amount_cell(m.total_income)]);
    table.add_row(vec![Cell::new("Expenses".red().bold()), amount_cell(m.total_expense)]);
    table.add_row(vec![Cell::new("Net cash flow".bold()), net_cell(m.net_cash_flow)]);
    table.add_row(vec![Cell::new("Savings rate"), Cell::new(percent(m.savings_rate))]);
    table.add_row(vec![Cell::new("Expense ratio"), Cell::new(percent(m.expense_ratio))]);
    table.add_row(vec![Cell::new("Transfers in"), amount_cell(m.transfers_in)]);
    table.add_row(vec![Cell::new("Transfers out"), amount_cell(m.transfers_out)]);
    table.add_row(vec![Cell::new("Excluded"), amount_cell(m.total_excluded)]);
    table.add_row(vec![Cell::new("Daily burn"), amount_cell(m.daily_burn_rate)]);
    if !(m.mortgage_principal.is_zero() && m.mortgage_interest.is_zero()) {
        table.add_row(vec![Cell::new("Mortgage principal"), amount_cell(m.mortgage_principal)]);
        table.add_row(vec![Cell::new("Mortgage interest"), amount_cell(m.mortgage_interest)]);
    }
    table.add_row(vec![
        Cell::new("Entries"),
        Cell::new(format!("{} ({} low confidence)", m.transaction_count, m.low_confidence_count)),
    ]);
    if let Some(r) = &m.reconciliation {
        table.add_row(vec![
            Cell::new("Balance"),
            Cell::new(format!(
                "{} \u{2192} {} (off by {})",
                money(r.opening_balance),
                money(r.closing_balance),
                money(r.discrepancy)
            )),
        ]);
    }
    format!("{}\n{table}", title.bold())
}

pub fn format_mortgage(m: &MortgageSummary) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Mortgage", "Amount"]);
    table.add_row(vec![Cell::new("Payments split"), Cell::new(m.payments_split)]);
    table.add_row(vec![Cell::new("Principal paid"), amount_cell(m.total_principal)]);
    table.add_row(vec![Cell::new("Interest paid"), amount_cell(m.total_interest)]);
    table.add_row(vec![
        Cell::new("Principal per $1 interest"),
        Cell::new(format!("{:.2}", m.principal_to_interest_ratio)),
    ]);
    table.add_row(vec![
        Cell::new("Interest share of expenses"),
        Cell::new(percent(m.interest_share_of_expenses)),
    ]);
    table.add_row(vec![
        Cell::new("Average monthly interest"),
        amount_cell(m.average_monthly_interest),
    ]);
    table.to_string()
}

pub fn format_averages(summary: &CashFlowSummary) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Monthly average", "Amount"]);
    table.add_row(vec![Cell::new("Income"), amount_cell(summary.average_monthly_income)]);
    table.add_row(vec![Cell::new("Expenses"), amount_cell(summary.average_monthly_expense)]);
    table.add_row(vec![Cell::new("Net"), net_cell(summary.average_monthly_net)]);
    format!("Across {} month(s)\n{table}", summary.month_count)
}

pub fn format_monthly(monthly: &[MonthlyMetric]) -> String {
    let mut table = Table::new();
    table.set_header(vec![
        "Month", "Income", "Expenses", "Net", "Savings", "Transfers", "Excluded", "Low conf.",
    ]);
    for m in monthly {
        table.add_row(vec![
            Cell::new(m.period.map(|p| p.to_string()).unwrap_or_default()),
            amount_cell(m.total_income),
            amount_cell(m.total_expense),
            net_cell(m.net_cash_flow),
            Cell::new(percent(m.savings_rate)),
            amount_cell(m.total_transfer),
            amount_cell(m.total_excluded),
            Cell::new(m.low_confidence_count),
        ]);
    }
    table.to_string()
}

pub fn format_categories(m: &MonthlyMetric) -> String {
    let mut table = Table::new();
    table.set_header(vec!["Category", "Amount", "Share"]);

    let sections = [
        ("INCOME".green().bold(), &m.income_by_category, m.total_income),
        ("EXPENSES".red().bold(), &m.expense_by_category, m.total_expense),
    ];
    for (label, by_category, total) in sections {
        if by_category.is_empty() {
            continue;
        }
        table.add_row(vec![Cell::new(label), Cell::new(""), Cell::new("")]);
        let mut items: Vec<_> = by_category.iter().collect();
        items.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (name, amount) in items {
            let share = if total.is_zero() {
                Decimal::ZERO
            } else {
                *amount / total
            };
            table.add_row(vec![
                Cell::new(format!("  {name}")),
                amount_cell(*amount),
                Cell::new(percent(share)),
            ]);
        }
    }
    table.to_string()
}

pub fn format_warnings(result: &AnalysisResult) -> Option<String> {
    let mut lines = Vec::new();
    for d in &result.dropped_rows {
        lines.push(format!("row {}: dropped ({})", d.row, d.reason));
    }
    for r in &result.rejected_mortgage_records {
        lines.push(r.to_string());
    }
    for m in &result.mortgage_mismatches {
        lines.push(format!("mortgage payment not split: {m}"));
    }
    for d in &result.validation.duplicates {
        lines.push(format!(
            "row {}: possible duplicate of row {} ({} {})",
            d.row,
            d.first_row,
            d.date,
            money(d.amount)
        ));
    }
    for b in &result.validation.balance_breaks {
        lines.push(format!(
            "row {}: balance {} but expected {}",
            b.row,
            money(b.actual),
            money(b.expected)
        ));
    }
    for a in &result.validation.anomalies {
        lines.push(format!(
            "row {}: unusual {} expense {} (threshold {})",
            a.row,
            a.category,
            money(a.amount),
            money(a.threshold)
        ));
    }
    for g in &result.validation.date_gaps {
        lines.push(format!("no activity from {} to {} ({} days)", g.from, g.to, g.days));
    }
    for d in &result.validation.balance_discrepancies {
        lines.push(format!(
            "{}: balance moved {} but rows add up to {}",
            d.period,
            money(d.reconciliation.actual_change),
            money(d.reconciliation.calculated_change)
        ));
    }
    if result.validation.zero_amount_rows > 0 {
        lines.push(format!("{} row(s) with a zero amount", result.validation.zero_amount_rows));
    }
    if result.validation.empty_description_rows > 0 {
        lines.push(format!(
            "{} row(s) with an empty description",
            result.validation.empty_description_rows
        ));
    }
    if lines.is_empty() {
        return None;
    }
    let body: Vec<String> = lines.iter().map(|l| format!("  {l}")).collect();
    Some(format!("{}\n{}", "Warnings".yellow().bold(), body.join("\n")))
}

// ---------------------------------------------------------------------------
// Transaction lists
// ---------------------------------------------------------------------------

pub fn format_register(txns: &[&Transaction]) -> String {
    let mut table = Table::new();
    table.set_header(vec![
        "Row", "Date", "Description", "Amount", "Flow", "Basis", "Category", "Conf.", "Method",
    ]);
    for t in txns {
        let flow = t.flow_type.map(|f| f.to_string()).unwrap_or_default();
        let category = match t.split_role {
            SplitRole::None => t.category_name().to_string(),
            _ => format!("{} (split)", t.category_name()),
        };
        table.add_row(vec![
            Cell::new(t.source_row_id),
            Cell::new(t.date),
            Cell::new(truncate(&t.description, DESCRIPTION_WIDTH)),
            amount_cell(t.amount),
            Cell::new(flow),
            Cell::new(t.flow_basis.map(|b| b.to_string()).unwrap_or_default()),
            Cell::new(category),
            Cell::new(format!("{:.2}", t.confidence)),
            Cell::new(t.match_method.map(|m| m.to_string()).unwrap_or_default()),
        ]);
    }
    table.to_string()
}

pub fn format_flagged(txns: &[Transaction]) -> String {
    if txns.is_empty() {
        return "No low-confidence transactions.".to_string();
    }
    let mut table = Table::new();
    table.set_header(vec!["Row", "Date", "Description", "Amount", "Flow", "Category", "Conf."]);
    for t in txns {
        table.add_row(vec![
            Cell::new(t.source_row_id),
            Cell::new(t.date),
            Cell::new(truncate(&t.description, DESCRIPTION_WIDTH)),
            amount_cell(t.amount),
            Cell::new(t.flow_type.map(|f| f.to_string()).unwrap_or_default()),
            Cell::new(t.category_name()),
            Cell::new(format!("{:.2}", t.confidence).yellow()),
        ]);
    }
    format!("{} transaction(s) need review\n{table}", txns.len())
}
