//! Splits a bank mortgage payment into its principal part (a wealth transfer,
//! EXCLUDED) and its interest part (a true expense), using the servicer's
//! monthly ledger.

use std::collections::{HashMap, HashSet};
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Categorization, FlowBasis, FlowType, MatchMethod, Period, SplitRole, Transaction};
use crate::patterns::{PatternTable, MORTGAGE_INTEREST, MORTGAGE_PRINCIPAL};

pub const MORTGAGE_TOLERANCE: Decimal = dec!(0.01);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MortgageRecord {
    pub period: Period,
    pub total_payment: Decimal,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("mortgage record for {period} rejected: {reason}")]
pub struct InvalidMortgageRecord {
    pub period: Period,
    pub reason: String,
}

impl MortgageRecord {
    pub fn new(
        period: Period,
        total_payment: Decimal,
        principal_amount: Decimal,
        interest_amount: Decimal,
    ) -> Result<Self, InvalidMortgageRecord> {
        let reject = |reason: String| InvalidMortgageRecord { period, reason };
        if total_payment.is_sign_negative()
            || principal_amount.is_sign_negative()
            || interest_amount.is_sign_negative()
        {
            return Err(reject("amounts must be non-negative".to_string()));
        }
        let parts = principal_amount + interest_amount;
        if (parts - total_payment).abs() > MORTGAGE_TOLERANCE {
            return Err(reject(format!(
                "principal {principal_amount} + interest {interest_amount} = {parts}, \
                 but total is {total_payment}"
            )));
        }
        Ok(Self {
            period,
            total_payment,
            principal_amount,
            interest_amount,
        })
    }

    /// The record can back a payment of `amount`: totals agree within the
    /// tolerance and the interest fits inside the payment.
    fn fits(&self, amount: Decimal) -> bool {
        (self.total_payment - amount.abs()).abs() <= MORTGAGE_TOLERANCE
            && self.interest_amount <= amount.abs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    NoRecordForPeriod,
    RecordRejected,
    AmountMismatch,
    NotEligible,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoRecordForPeriod => "no mortgage record for this month",
            Self::RecordRejected => "the mortgage record for this month was rejected",
            Self::AmountMismatch => "payment does not match any unclaimed record total",
            Self::NotEligible => "not an EXCLUDED mortgage payment",
        };
        f.write_str(s)
    }
}

/// A mortgage payment that stays a single EXCLUDED entry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("row {row} on {period} ({amount}): {reason}")]
pub struct MortgageDataMismatch {
    pub row: usize,
    pub period: Period,
    pub amount: Decimal,
    pub reason: MismatchReason,
}

impl MortgageDataMismatch {
    fn new(txn: &Transaction, reason: MismatchReason) -> Self {
        Self {
            row: txn.source_row_id,
            period: txn.period(),
            amount: txn.amount,
            reason,
        }
    }
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    record: MortgageRecord,
    claimed: bool,
}

/// Mortgage records keyed by month. A record backs at most one bank payment.
#[derive(Debug, Clone, Default)]
pub struct MortgageLedger {
    entries: HashMap<Period, Vec<LedgerEntry>>,
    rejected: HashSet<Period>,
}

impl MortgageLedger {
    pub fn new(records: Vec<MortgageRecord>, rejected: &[InvalidMortgageRecord]) -> Self {
        let mut entries: HashMap<Period, Vec<LedgerEntry>> = HashMap::new();
        for record in records {
            entries.entry(record.period).or_default().push(LedgerEntry {
                record,
                claimed: false,
            });
        }
        Self {
            entries,
            rejected: rejected.iter().map(|r| r.period).collect(),
        }
    }

    /// Claim the first unclaimed record of the transaction's month whose total
    /// matches the payment.
    pub fn claim(&mut self, txn: &Transaction) -> Result<MortgageRecord, MismatchReason> {
        let period = txn.period();
        let Some(entries) = self.entries.get_mut(&period) else {
            return Err(if self.rejected.contains(&period) {
                MismatchReason::RecordRejected
            } else {
                MismatchReason::NoRecordForPeriod
            });
        };
        let entry = entries
            .iter_mut()
            .find(|e| !e.claimed && e.record.fits(txn.amount))
            .ok_or(MismatchReason::AmountMismatch)?;
        entry.claimed = true;
        Ok(entry.record.clone())
    }

    pub fn unclaimed(&self) -> impl Iterator<Item = &MortgageRecord> {
        self.entries
            .values()
            .flatten()
            .filter(|e| !e.claimed)
            .map(|e| &e.record)
    }
}

/// Replace an EXCLUDED mortgage payment with its principal and interest parts.
/// Any rounding difference in the record lands on the principal, so the two
/// parts always add back to the original amount.
pub fn split(
    txn: &Transaction,
    record: &MortgageRecord,
) -> Result<(Transaction, Transaction), MortgageDataMismatch> {
    if txn.flow_type != Some(FlowType::Excluded) {
        return Err(MortgageDataMismatch::new(txn, MismatchReason::NotEligible));
    }
    if record.period != txn.period() {
        return Err(MortgageDataMismatch::new(txn, MismatchReason::NoRecordForPeriod));
    }
    if !record.fits(txn.amount) {
        return Err(MortgageDataMismatch::new(txn, MismatchReason::AmountMismatch));
    }

    let sign = if txn.amount.is_sign_negative() {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ONE
    };
    let interest = record.interest_amount;
    let principal = txn.abs_amount() - interest;

    let part = |amount: Decimal, flow: FlowType, category: &str, role: SplitRole| {
        let mut entry = Transaction::new(
            txn.source_row_id,
            txn.date,
            txn.description.clone(),
            sign * amount,
            None,
        );
        entry.assign_flow(flow, FlowBasis::MortgageSplit);
        entry.assign_category(Categorization {
            category: category.to_string(),
            confidence: 1.0,
            method: MatchMethod::MortgageSplit,
        });
        entry.is_mortgage_split = true;
        entry.split_role = role;
        entry
    };

    let principal_entry = part(principal, FlowType::Excluded, MORTGAGE_PRINCIPAL, SplitRole::Principal);
    let mut interest_entry = part(interest, FlowType::Expense, MORTGAGE_INTEREST, SplitRole::Interest);
    // The pair replaces one bank row; the running balance sits on the last part.
    interest_entry.balance = txn.balance;
    Ok((principal_entry, interest_entry))
}

#[derive(Debug, Default)]
pub struct SplitOutcome {
    pub transactions: Vec<Transaction>,
    pub mismatches: Vec<MortgageDataMismatch>,
    pub split_count: usize,
}

pub struct MortgageSplitter<'a> {
    table: &'a PatternTable,
}

impl<'a> MortgageSplitter<'a> {
    pub fn new(table: &'a PatternTable) -> Self {
        Self { table }
    }

    pub fn is_eligible(&self, txn: &Transaction) -> bool {
        txn.flow_type == Some(FlowType::Excluded)
            && !txn.is_mortgage_split
            && self.table.is_mortgage_payment(&txn.description)
    }

    /// Split every eligible payment against the ledger. Everything else,
    /// including payments that cannot be matched, passes through unchanged.
    pub fn apply(&self, txns: Vec<Transaction>, ledger: &mut MortgageLedger) -> SplitOutcome {
        let mut out = SplitOutcome {
            transactions: Vec::with_capacity(txns.len()),
            ..Default::default()
        };
        for txn in txns {
            if !self.is_eligible(&txn) {
                out.transactions.push(txn);
                continue;
            }
            let result = ledger
                .claim(&txn)
                .map_err(|reason| MortgageDataMismatch::new(&txn, reason))
                .and_then(|record| split(&txn, &record));
            match result {
                Ok((principal, interest)) => {
                    debug!(
                        row = txn.source_row_id,
                        principal = %principal.amount,
                        interest = %interest.amount,
                        "split mortgage payment"
                    );
                    out.transactions.push(principal);
                    out.transactions.push(interest);
                    out.split_count += 1;
                }
                Err(mismatch) => {
                    warn!("{mismatch}");
                    out.mismatches.push(mismatch);
                    out.transactions.push(txn);
                }
            }
        }
        out
    }
}
