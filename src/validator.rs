use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::info;

use crate::balance::{bank_rows, reconcile_by_month, BalanceReconciliation, BankRow};
use crate::models::{FlowType, Period, SplitRole, Transaction, NO_DESCRIPTION};

const BALANCE_TOLERANCE: Decimal = dec!(0.01);
const DUPLICATE_KEY_CHARS: usize = 20;
const MIN_ANOMALY_SAMPLE: usize = 3;
const MAX_DATE_GAP_DAYS: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duplicate {
    pub first_row: usize,
    pub row: usize,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceBreak {
    pub row: usize,
    pub date: NaiveDate,
    pub expected: Decimal,
    pub actual: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub row: usize,
    pub date: NaiveDate,
    pub category: String,
    pub amount: Decimal,
    pub threshold: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateGap {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: i64,
}

/// A month whose reported balance moved far from what its rows add up to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDiscrepancy {
    pub period: Period,
    pub reconciliation: BalanceReconciliation,
}

/// Data-quality warnings. Nothing here stops a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub duplicates: Vec<Duplicate>,
    pub balance_breaks: Vec<BalanceBreak>,
    pub anomalies: Vec<Anomaly>,
    pub date_gaps: Vec<DateGap>,
    pub balance_discrepancies: Vec<BalanceDiscrepancy>,
    pub zero_amount_rows: usize,
    pub empty_description_rows: usize,
}

impl ValidationReport {
    pub fn warning_count(&self) -> usize {
        self.duplicates.len()
            + self.balance_breaks.len()
            + self.anomalies.len()
            + self.date_gaps.len()
            + self.balance_discrepancies.len()
            + self.zero_amount_rows
            + self.empty_description_rows
    }

    pub fn is_clean(&self) -> bool {
        self.warning_count() == 0
    }
}

pub struct Validator {
    anomaly_sensitivity: f64,
}

impl Validator {
    pub fn new(anomaly_sensitivity: f64) -> Self {
        Self {
            anomaly_sensitivity,
        }
    }

    pub fn validate(&self, txns: &[Transaction]) -> ValidationReport {
        let rows = bank_rows(txns);
        let report = ValidationReport {
            duplicates: find_duplicates(txns),
            balance_breaks: find_balance_breaks(&rows),
            anomalies: self.find_anomalies(txns),
            date_gaps: find_date_gaps(&rows),
            balance_discrepancies: find_balance_discrepancies(&rows),
            zero_amount_rows: rows.iter().filter(|r| r.amount.is_zero()).count(),
            // Principal parts share their bank row with an interest part.
            empty_description_rows: txns
                .iter()
                .filter(|t| t.split_role != SplitRole::Principal)
                .filter(|t| t.description == NO_DESCRIPTION || t.description.trim().is_empty())
                .count(),
        };
        info!(
            duplicates = report.duplicates.len(),
            balance_breaks = report.balance_breaks.len(),
            anomalies = report.anomalies.len(),
            date_gaps = report.date_gaps.len(),
            balance_discrepancies = report.balance_discrepancies.len(),
            "validated"
        );
        report
    }

    fn find_anomalies(&self, txns: &[Transaction]) -> Vec<Anomaly> {
        let mut by_category: BTreeMap<&str, Vec<&Transaction>> = BTreeMap::new();
        for txn in txns
            .iter()
            .filter(|t| t.flow_type == Some(FlowType::Expense))
        {
            by_category.entry(txn.category_name()).or_default().push(txn);
        }

        let mut anomalies = Vec::new();
        for (category, group) in by_category {
            if group.len() < MIN_ANOMALY_SAMPLE {
                continue;
            }
            let values: Vec<f64> = group
                .iter()
                .filter_map(|t| t.abs_amount().to_f64())
                .collect();
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let cutoff = mean + self.anomaly_sensitivity * variance.sqrt();
            let Some(threshold) = Decimal::from_f64(cutoff) else {
                continue;
            };
            let threshold = threshold.round_dp(2);
            for txn in group {
                if txn.abs_amount() > threshold {
                    anomalies.push(Anomaly {
                        row: txn.source_row_id,
                        date: txn.date,
                        category: category.to_string(),
                        amount: txn.abs_amount(),
                        threshold,
                    });
                }
            }
        }
        anomalies
    }
}

fn find_duplicates(txns: &[Transaction]) -> Vec<Duplicate> {
    let mut seen: HashMap<(NaiveDate, Decimal, String), usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for txn in txns.iter().filter(|t| !t.is_mortgage_split) {
        let prefix: String = txn.description.chars().take(DUPLICATE_KEY_CHARS).collect();
        let key = (txn.date, txn.amount, prefix);
        if let Some(&first_row) = seen.get(&key) {
            duplicates.push(Duplicate {
                first_row,
                row: txn.source_row_id,
                date: txn.date,
                amount: txn.amount,
                description: txn.description.clone(),
            });
        } else {
            seen.insert(key, txn.source_row_id);
        }
    }
    duplicates
}

/// Check each reported balance against the previous one plus the amounts in
/// between. Rows without a balance just carry their amount forward.
fn find_balance_breaks(rows: &[BankRow]) -> Vec<BalanceBreak> {
    let mut breaks = Vec::new();
    let mut running: Option<Decimal> = None;
    let mut pending = Decimal::ZERO;
    for row in rows {
        pending += row.amount;
        let Some(actual) = row.balance else {
            continue;
        };
        if let Some(prev) = running {
            let expected = prev + pending;
            if (expected - actual).abs() > BALANCE_TOLERANCE {
                breaks.push(BalanceBreak {
                    row: row.row,
                    date: row.date,
                    expected,
                    actual,
                });
            }
        }
        running = Some(actual);
        pending = Decimal::ZERO;
    }
    breaks
}

/// Stretches of more than five days with no activity, which usually mean
/// an export is missing rows.
fn find_date_gaps(rows: &[BankRow]) -> Vec<DateGap> {
    let mut dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
    dates.sort_unstable();
    dates.dedup();
    dates
        .windows(2)
        .filter_map(|pair| {
            let days = (pair[1] - pair[0]).num_days();
            (days > MAX_DATE_GAP_DAYS).then_some(DateGap {
                from: pair[0],
                to: pair[1],
                days,
            })
        })
        .collect()
}

fn find_balance_discrepancies(rows: &[BankRow]) -> Vec<BalanceDiscrepancy> {
    reconcile_by_month(rows)
        .into_iter()
        .filter(|(_, r)| r.is_large())
        .map(|(period, reconciliation)| BalanceDiscrepancy {
            period,
            reconciliation,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Categorization, FlowBasis, MatchMethod};
    use crate::mortgage::{split, MortgageRecord};

    fn row(id: usize, day: u32, desc: &str, amount: Decimal, balance: Option<Decimal>) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2025, 5, day).unwrap();
        Transaction::new(id, date, desc, amount, balance)
    }

    fn expense(id: usize, amount: Decimal, category: &str) -> Transaction {
        let mut t = row(id, 1 + (id as u32 % 28), category, amount, None);
        t.assign_flow(FlowType::Expense, FlowBasis::NegativeAmount);
        t.assign_category(Categorization {
            category: category.to_string(),
            confidence: 0.9,
            method: MatchMethod::Pattern,
        });
        t
    }

    #[test]
    fn test_duplicates_use_description_prefix() {
        let txns = vec![
            row(1, 3, "AMAZON MKTPL US*2K4LP0 SEATTLE", dec!(-19.99), None),
            row(2, 3, "AMAZON MKTPL US*2K4LP0 OTHER", dec!(-19.99), None),
            row(3, 3, "AMAZON MKTPL US*2K4LP0 SEATTLE", dec!(-29.99), None),
        ];
        let dups = find_duplicates(&txns);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].first_row, 1);
        assert_eq!(dups[0].row, 2);
    }

    fn breaks(txns: &[Transaction]) -> Vec<BalanceBreak> {
        find_balance_breaks(&bank_rows(txns))
    }

    #[test]
    fn test_balance_continuity() {
        let txns = vec![
            row(1, 1, "A", dec!(100), Some(dec!(1100))),
            row(2, 2, "B", dec!(-50), Some(dec!(1050))),
            row(3, 3, "C", dec!(-25), Some(dec!(1000))),
        ];
        let found = breaks(&txns);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].row, 3);
        assert_eq!(found[0].expected, dec!(1025));
    }

    #[test]
    fn test_balance_newest_first_is_reversed() {
        let txns = vec![
            row(1, 3, "C", dec!(-25), Some(dec!(1025))),
            row(2, 2, "B", dec!(-50), Some(dec!(1050))),
            row(3, 1, "A", dec!(100), Some(dec!(1100))),
        ];
        assert!(breaks(&txns).is_empty());
    }

    #[test]
    fn test_balance_carries_rows_without_balance() {
        let txns = vec![
            row(1, 1, "A", dec!(0), Some(dec!(3000))),
            row(2, 2, "B", dec!(-800), None),
            row(3, 3, "C", dec!(-1600), Some(dec!(600))),
        ];
        assert!(breaks(&txns).is_empty());
    }

    fn mortgage_split(id: usize, day: u32, balance: Decimal) -> [Transaction; 2] {
        let mut payment = row(id, day, "MORTGAGE PAYMENT", dec!(-2400), Some(balance));
        payment.assign_flow(FlowType::Excluded, FlowBasis::ExcludedPattern);
        let period = payment.period();
        let record = MortgageRecord::new(period, dec!(2400), dec!(800), dec!(1600)).unwrap();
        let (principal, interest) = split(&payment, &record).unwrap();
        [principal, interest]
    }

    #[test]
    fn test_split_payment_in_newest_first_export_keeps_balance() {
        let mut txns = vec![row(1, 3, "SAFEWAY", dec!(-100), Some(dec!(5300)))];
        txns.extend(mortgage_split(2, 2, dec!(5400)));
        txns.push(row(3, 1, "DIRECT DEP", dec!(5000), Some(dec!(7800))));
        let report = Validator::new(2.5).validate(&txns);
        assert!(report.balance_breaks.is_empty());
        assert!(report.balance_discrepancies.is_empty());
    }

    #[test]
    fn test_split_payment_in_oldest_first_export_keeps_balance() {
        let mut txns = vec![row(1, 1, "DIRECT DEP", dec!(5000), Some(dec!(7800)))];
        txns.extend(mortgage_split(2, 2, dec!(5400)));
        txns.push(row(3, 3, "SAFEWAY", dec!(-100), Some(dec!(5300))));
        assert!(breaks(&txns).is_empty());
    }

    #[test]
    fn test_date_gaps_over_five_days() {
        let txns = vec![
            row(1, 1, "A", dec!(-1), None),
            row(2, 6, "B", dec!(-1), None),
            row(3, 13, "C", dec!(-1), None),
            row(4, 13, "D", dec!(-1), None),
        ];
        let gaps = Validator::new(2.5).validate(&txns).date_gaps;
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].from, NaiveDate::from_ymd_opt(2025, 5, 6).unwrap());
        assert_eq!(gaps[0].days, 7);
    }

    #[test]
    fn test_data_quality_counts() {
        let txns = vec![
            row(1, 1, "ADJUSTMENT", dec!(0), None),
            row(2, 2, NO_DESCRIPTION, dec!(-5), None),
            row(3, 3, "COFFEE", dec!(-5), None),
        ];
        let report = Validator::new(2.5).validate(&txns);
        assert_eq!(report.zero_amount_rows, 1);
        assert_eq!(report.empty_description_rows, 1);
        assert_eq!(report.warning_count(), 2);
    }

    #[test]
    fn test_large_monthly_discrepancy_is_reported() {
        let txns = vec![
            row(1, 1, "A", dec!(-50), Some(dec!(950))),
            row(2, 2, "B", dec!(-50), Some(dec!(700))),
            row(3, 3, "C", dec!(-50), Some(dec!(650))),
        ];
        let report = Validator::new(2.5).validate(&txns);
        assert_eq!(report.balance_breaks.len(), 1);
        assert_eq!(report.balance_discrepancies.len(), 1);
        let d = &report.balance_discrepancies[0];
        assert_eq!(d.period.to_string(), "2025-05");
        assert_eq!(d.reconciliation.discrepancy, dec!(200));
    }

    #[test]
    fn test_anomaly_flags_outlier_only() {
        let mut txns: Vec<Transaction> = (1..=10).map(|i| expense(i, dec!(-50), "Groceries")).collect();
        txns.push(expense(11, dec!(-900), "Groceries"));
        txns.push(expense(12, dec!(-5000), "Travel"));
        let report = Validator::new(2.5).validate(&txns);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].row, 11);
        assert_eq!(report.anomalies[0].category, "Groceries");
    }

    #[test]
    fn test_small_category_is_not_tested() {
        let txns = vec![expense(1, dec!(-5), "Dining"), expense(2, dec!(-500), "Dining")];
        assert!(Validator::new(0.1).validate(&txns).anomalies.is_empty());
    }

    #[test]
    fn test_clean_report() {
        let report = Validator::new(2.5).validate(&[]);
        assert!(report.is_clean());
    }
}
