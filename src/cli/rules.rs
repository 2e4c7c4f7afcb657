use std::path::Path;

use anyhow::Context;
use comfy_table::{Cell, Table};

use crate::patterns::PatternTable;
use crate::settings::load_settings;

pub fn list(config: Option<&Path>) -> anyhow::Result<()> {
    let settings = load_settings(config).context("loading settings")?;
    let table = PatternTable::from_settings(&settings)?;
    println!("{}", format_rules(&table));
    Ok(())
}

pub fn format_rules(patterns: &PatternTable) -> String {
    let mut out = Vec::new();

    if !patterns.custom_rules().is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Contains", "Category", "Flow", "Conf."]);
        for r in patterns.custom_rules() {
            table.add_row(vec![
                Cell::new(&r.needle),
                Cell::new(r.category.as_deref().unwrap_or("-")),
                Cell::new(r.flow_type.map(|f| f.to_string()).unwrap_or_else(|| "-".to_string())),
                Cell::new(format!("{:.2}", r.confidence)),
            ]);
        }
        out.push(format!("Custom rules (checked first)\n{table}"));
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Tier", "Flow", "Category", "Pattern", "Conf."]);
    for (i, r) in patterns.rules().iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(r.tier),
            Cell::new(r.flow),
            Cell::new(&r.category),
            Cell::new(&r.pattern),
            Cell::new(format!("{:.2}", r.base_confidence)),
        ]);
    }
    out.push(format!("Pattern rules\n{table}"));

    if !patterns.aliases().is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Alias", "Rewritten to"]);
        for (raw, canonical) in patterns.aliases() {
            table.add_row(vec![Cell::new(raw), Cell::new(canonical)]);
        }
        out.push(format!("Merchant aliases\n{table}"));
    }

    out.join("\n\n")
}
