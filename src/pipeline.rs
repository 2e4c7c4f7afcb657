use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::{Aggregator, CashFlowSummary};
use crate::categorizer::Categorizer;
use crate::classifier::FlowClassifier;
use crate::error::Result;
use crate::importer::{ImportBatch, MortgageImport};
use crate::models::{DroppedRow, Transaction};
use crate::mortgage::{InvalidMortgageRecord, MortgageDataMismatch, MortgageLedger, MortgageSplitter};
use crate::patterns::PatternTable;
use crate::settings::Settings;
use crate::validator::{ValidationReport, Validator};

/// Everything one run produces. Warnings are data here, not log lines.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub transactions: Vec<Transaction>,
    pub summary: CashFlowSummary,
    pub low_confidence: Vec<Transaction>,
    pub mortgage_mismatches: Vec<MortgageDataMismatch>,
    pub rejected_mortgage_records: Vec<InvalidMortgageRecord>,
    pub dropped_rows: Vec<DroppedRow>,
    pub validation: ValidationReport,
}

pub struct Pipeline {
    table: PatternTable,
    settings: Settings,
}

impl Pipeline {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            table: PatternTable::from_settings(settings)?,
            settings: settings.clone(),
        })
    }

    /// classify → categorize → split → validate → aggregate. Mortgage payments
    /// are only split when a ledger is supplied.
    pub fn run(&self, batch: ImportBatch, mortgage: Option<MortgageImport>) -> Result<AnalysisResult> {
        let ImportBatch {
            mut transactions,
            dropped: mut dropped_rows,
        } = batch;
        info!(transactions = transactions.len(), "running analysis");

        FlowClassifier::new(&self.table).classify_all(&mut transactions);
        Categorizer::new(&self.table, self.settings.fuzzy_match_threshold)
            .categorize_all(&mut transactions)?;

        let mut mortgage_mismatches = Vec::new();
        let mut rejected_mortgage_records = Vec::new();
        if let Some(import) = mortgage {
            let mut ledger = MortgageLedger::new(import.records, &import.rejected);
            let outcome = MortgageSplitter::new(&self.table).apply(transactions, &mut ledger);
            info!(
                split = outcome.split_count,
                mismatches = outcome.mismatches.len(),
                "split mortgage payments"
            );
            let unclaimed = ledger.unclaimed().count();
            if unclaimed > 0 {
                warn!(unclaimed, "mortgage records with no matching bank payment");
            }
            transactions = outcome.transactions;
            mortgage_mismatches = outcome.mismatches;
            rejected_mortgage_records = import.rejected;
            dropped_rows.extend(import.dropped);
        }

        let validation = Validator::new(self.settings.anomaly_sensitivity).validate(&transactions);
        if !validation.is_clean() {
            warn!(warnings = validation.warning_count(), "data-quality warnings");
        }
        let summary = Aggregator::new(self.settings.confidence_threshold).aggregate(&transactions)?;

        let low_confidence: Vec<Transaction> = transactions
            .iter()
            .filter(|t| t.is_low_confidence(self.settings.confidence_threshold))
            .cloned()
            .collect();
        if !low_confidence.is_empty() {
            info!(count = low_confidence.len(), "low-confidence categorizations");
        }

        Ok(AnalysisResult {
            transactions,
            summary,
            low_confidence,
            mortgage_mismatches,
            rejected_mortgage_records,
            dropped_rows,
            validation,
        })
    }
}
