//! Reported-balance checks. Split mortgage parts are folded back into the
//! bank row they came from before any balance is compared.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::models::{Period, Transaction};

/// Per-month discrepancies at or below this are treated as noise in the
/// bank's balance column.
pub const RECONCILIATION_TOLERANCE: Decimal = dec!(100.00);

/// One source row, with any split parts summed back together.
#[derive(Debug, Clone, PartialEq)]
pub struct BankRow {
    pub row: usize,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub balance: Option<Decimal>,
}

/// Bank rows, oldest first. A newest-first export (first date later than the
/// last) is reversed a whole bank row at a time.
pub fn bank_rows(txns: &[Transaction]) -> Vec<BankRow> {
    let mut rows: Vec<BankRow> = Vec::with_capacity(txns.len());
    for txn in txns {
        match rows.last_mut() {
            Some(last) if last.row == txn.source_row_id => {
                last.amount += txn.amount;
                last.balance = txn.balance.or(last.balance);
            }
            _ => rows.push(BankRow {
                row: txn.source_row_id,
                date: txn.date,
                amount: txn.amount,
                balance: txn.balance,
            }),
        }
    }
    if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
        if first.date > last.date {
            rows.reverse();
        }
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReconciliation {
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub calculated_change: Decimal,
    pub actual_change: Decimal,
    pub discrepancy: Decimal,
}

impl BalanceReconciliation {
    pub fn is_large(&self) -> bool {
        self.discrepancy > RECONCILIATION_TOLERANCE
    }
}

/// Compare the summed amounts with the change in reported balance, from the
/// first row that reports a balance to the last. `None` when no row does.
pub fn reconcile(rows: &[BankRow]) -> Option<BalanceReconciliation> {
    let start = rows.iter().position(|r| r.balance.is_some())?;
    let end = rows.iter().rposition(|r| r.balance.is_some())?;
    let opening_balance = rows[start].balance? - rows[start].amount;
    let closing_balance = rows[end].balance?;
    let calculated_change: Decimal = rows[start..=end].iter().map(|r| r.amount).sum();
    let actual_change = closing_balance - opening_balance;
    Some(BalanceReconciliation {
        opening_balance,
        closing_balance,
        calculated_change,
        actual_change,
        discrepancy: (calculated_change - actual_change).abs(),
    })
}

pub fn reconcile_by_month(rows: &[BankRow]) -> BTreeMap<Period, BalanceReconciliation> {
    let mut months: BTreeMap<Period, Vec<BankRow>> = BTreeMap::new();
    for row in rows {
        months.entry(Period::of(row.date)).or_default().push(row.clone());
    }
    months
        .into_iter()
        .filter_map(|(period, rows)| reconcile(&rows).map(|r| (period, r)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SplitRole;

    fn txn(id: usize, day: u32, amount: Decimal, balance: Option<Decimal>) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2025, 4, day).unwrap();
        Transaction::new(id, date, "ROW", amount, balance)
    }

    fn split_pair(id: usize, day: u32, balance: Decimal) -> [Transaction; 2] {
        let mut principal = txn(id, day, dec!(-800), None);
        principal.split_role = SplitRole::Principal;
        let mut interest = txn(id, day, dec!(-1600), Some(balance));
        interest.split_role = SplitRole::Interest;
        [principal, interest]
    }

    #[test]
    fn test_split_parts_fold_into_one_row() {
        let mut txns = vec![txn(1, 1, dec!(5000), Some(dec!(7800)))];
        txns.extend(split_pair(2, 2, dec!(5400)));
        let rows = bank_rows(&txns);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].amount, dec!(-2400));
        assert_eq!(rows[1].balance, Some(dec!(5400)));
    }

    #[test]
    fn test_newest_first_reverses_whole_rows() {
        let mut txns = vec![txn(1, 3, dec!(-100), Some(dec!(5300)))];
        txns.extend(split_pair(2, 2, dec!(5400)));
        txns.push(txn(3, 1, dec!(5000), Some(dec!(7800))));
        let rows = bank_rows(&txns);
        let ids: Vec<usize> = rows.iter().map(|r| r.row).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(rows[1].amount, dec!(-2400));
    }

    #[test]
    fn test_reconcile_matching_balance() {
        let rows = bank_rows(&[
            txn(1, 1, dec!(5000), Some(dec!(7800))),
            txn(2, 2, dec!(-2400), Some(dec!(5400))),
            txn(3, 3, dec!(-100), None),
        ]);
        let r = reconcile(&rows).unwrap();
        assert_eq!(r.opening_balance, dec!(2800));
        assert_eq!(r.closing_balance, dec!(5400));
        assert_eq!(r.calculated_change, dec!(2600));
        assert_eq!(r.discrepancy, Decimal::ZERO);
        assert!(!r.is_large());
    }

    #[test]
    fn test_reconcile_flags_large_discrepancy() {
        let rows = bank_rows(&[
            txn(1, 1, dec!(-50), Some(dec!(950))),
            txn(2, 2, dec!(-50), Some(dec!(700))),
        ]);
        let r = reconcile(&rows).unwrap();
        assert_eq!(r.discrepancy, dec!(200));
        assert!(r.is_large());
    }

    #[test]
    fn test_reconcile_without_balances() {
        let rows = bank_rows(&[txn(1, 1, dec!(-50), None)]);
        assert_eq!(reconcile(&rows), None);
        assert!(reconcile_by_month(&rows).is_empty());
    }

    #[test]
    fn test_reconcile_by_month_keys() {
        let may = NaiveDate::from_ymd_opt(2025, 5, 2).unwrap();
        let rows = bank_rows(&[
            txn(1, 30, dec!(-50), Some(dec!(950))),
            Transaction::new(2, may, "ROW", dec!(-50), Some(dec!(900))),
        ]);
        let months = reconcile_by_month(&rows);
        assert_eq!(months.len(), 2);
        assert_eq!(months[&Period::of(may)].opening_balance, dec!(950));
    }
}
