use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::balance::{bank_rows, reconcile, reconcile_by_month, BalanceReconciliation};
use crate::error::{FlowbookError, Result};
use crate::models::{FlowType, Period, SplitRole, Transaction};

/// Cash-flow figures for one month, or for the whole batch when `period` is
/// `None`. Income and expense totals are absolute values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonthlyMetric {
    pub period: Option<Period>,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub total_transfer: Decimal,
    pub transfers_in: Decimal,
    pub transfers_out: Decimal,
    pub total_excluded: Decimal,
    pub net_cash_flow: Decimal,
    pub savings_rate: Decimal,
    pub expense_ratio: Decimal,
    pub income_by_category: BTreeMap<String, Decimal>,
    pub expense_by_category: BTreeMap<String, Decimal>,
    pub low_confidence_count: usize,
    pub transaction_count: usize,
    pub largest_income: Decimal,
    pub largest_expense: Decimal,
    pub mortgage_principal: Decimal,
    pub mortgage_interest: Decimal,
    /// Expenses spread over the calendar days covered.
    pub daily_burn_rate: Decimal,
    /// `None` when the export has no balance column.
    pub reconciliation: Option<BalanceReconciliation>,
}

/// Totals over every split mortgage payment in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MortgageSummary {
    pub payments_split: usize,
    pub total_principal: Decimal,
    pub total_interest: Decimal,
    pub principal_to_interest_ratio: Decimal,
    pub interest_share_of_expenses: Decimal,
    pub average_monthly_interest: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CashFlowSummary {
    pub monthly: Vec<MonthlyMetric>,
    pub overall: MonthlyMetric,
    pub month_count: usize,
    pub average_monthly_income: Decimal,
    pub average_monthly_expense: Decimal,
    pub average_monthly_net: Decimal,
    pub mortgage: Option<MortgageSummary>,
}

impl CashFlowSummary {
    pub fn month(&self, period: Period) -> Option<&MonthlyMetric> {
        self.monthly.iter().find(|m| m.period == Some(period))
    }
}

/// Running sums for one group. Merging two accumulators gives the same result
/// as absorbing both groups' transactions into one.
#[derive(Debug, Clone, Default)]
struct MetricAccumulator {
    income: Decimal,
    expense: Decimal,
    transfers_in: Decimal,
    transfers_out: Decimal,
    excluded: Decimal,
    income_by_category: BTreeMap<String, Decimal>,
    expense_by_category: BTreeMap<String, Decimal>,
    low_confidence: usize,
    count: usize,
    largest_income: Decimal,
    largest_expense: Decimal,
    mortgage_principal: Decimal,
    mortgage_interest: Decimal,
    mortgage_payments: usize,
}

impl MetricAccumulator {
    fn absorb(&mut self, txn: &Transaction, flow: FlowType, threshold: f64) {
        let amount = txn.abs_amount();
        self.count += 1;
        if txn.is_low_confidence(threshold) {
            self.low_confidence += 1;
        }
        match flow {
            FlowType::Income => {
                self.income += amount;
                *self
                    .income_by_category
                    .entry(txn.category_name().to_string())
                    .or_default() += amount;
                self.largest_income = self.largest_income.max(amount);
            }
            FlowType::Expense => {
                self.expense += amount;
                *self
                    .expense_by_category
                    .entry(txn.category_name().to_string())
                    .or_default() += amount;
                self.largest_expense = self.largest_expense.max(amount);
            }
            FlowType::InternalTransfer => {
                if txn.amount.is_sign_positive() {
                    self.transfers_in += amount;
                } else {
                    self.transfers_out += amount;
                }
            }
            FlowType::Excluded => self.excluded += amount,
        }
        match txn.split_role {
            SplitRole::Principal => self.mortgage_principal += amount,
            SplitRole::Interest => {
                self.mortgage_interest += amount;
                self.mortgage_payments += 1;
            }
            SplitRole::None => {}
        }
    }

    fn merge(&mut self, other: &Self) {
        self.income += other.income;
        self.expense += other.expense;
        self.transfers_in += other.transfers_in;
        self.transfers_out += other.transfers_out;
        self.excluded += other.excluded;
        for (cat, amt) in &other.income_by_category {
            *self.income_by_category.entry(cat.clone()).or_default() += *amt;
        }
        for (cat, amt) in &other.expense_by_category {
            *self.expense_by_category.entry(cat.clone()).or_default() += *amt;
        }
        self.low_confidence += other.low_confidence;
        self.count += other.count;
        self.largest_income = self.largest_income.max(other.largest_income);
        self.largest_expense = self.largest_expense.max(other.largest_expense);
        self.mortgage_principal += other.mortgage_principal;
        self.mortgage_interest += other.mortgage_interest;
        self.mortgage_payments += other.mortgage_payments;
    }

    fn finish(&self, period: Option<Period>, days: u32) -> MonthlyMetric {
        let net = self.income - self.expense;
        MonthlyMetric {
            period,
            total_income: self.income,
            total_expense: self.expense,
            total_transfer: self.transfers_in + self.transfers_out,
            transfers_in: self.transfers_in,
            transfers_out: self.transfers_out,
            total_excluded: self.excluded,
            net_cash_flow: net,
            savings_rate: ratio(net, self.income),
            expense_ratio: ratio(self.expense, self.income),
            income_by_category: self.income_by_category.clone(),
            expense_by_category: self.expense_by_category.clone(),
            low_confidence_count: self.low_confidence,
            transaction_count: self.count,
            largest_income: self.largest_income,
            largest_expense: self.largest_expense,
            mortgage_principal: self.mortgage_principal,
            mortgage_interest: self.mortgage_interest,
            daily_burn_rate: ratio(self.expense, Decimal::from(days)),
            reconciliation: None,
        }
    }

    fn mortgage_summary(&self, month_count: usize) -> Option<MortgageSummary> {
        if self.mortgage_payments == 0 {
            return None;
        }
        Some(MortgageSummary {
            payments_split: self.mortgage_payments,
            total_principal: self.mortgage_principal,
            total_interest: self.mortgage_interest,
            principal_to_interest_ratio: ratio(self.mortgage_principal, self.mortgage_interest),
            interest_share_of_expenses: ratio(self.mortgage_interest, self.expense),
            average_monthly_interest: ratio(self.mortgage_interest, Decimal::from(month_count)),
        })
    }
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
}

pub struct Aggregator {
    confidence_threshold: f64,
}

impl Aggregator {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn aggregate(&self, txns: &[Transaction]) -> Result<CashFlowSummary> {
        let mut groups: BTreeMap<Period, MetricAccumulator> = BTreeMap::new();
        for txn in txns {
            let flow = txn
                .flow_type
                .ok_or(FlowbookError::NotClassified(txn.source_row_id))?;
            groups
                .entry(txn.period())
                .or_default()
                .absorb(txn, flow, self.confidence_threshold);
        }

        let mut total = MetricAccumulator::default();
        for acc in groups.values() {
            total.merge(acc);
        }

        let rows = bank_rows(txns);
        let mut reconciliations = reconcile_by_month(&rows);
        let month_count = groups.len();
        let days: u32 = groups.keys().map(Period::days).sum();
        let mut overall = total.finish(None, days);
        overall.reconciliation = reconcile(&rows);
        let average = |value: Decimal| ratio(value, Decimal::from(month_count));

        let summary = CashFlowSummary {
            monthly: groups
                .iter()
                .map(|(period, acc)| {
                    let mut metric = acc.finish(Some(*period), period.days());
                    metric.reconciliation = reconciliations.remove(period);
                    metric
                })
                .collect(),
            month_count,
            average_monthly_income: average(overall.total_income),
            average_monthly_expense: average(overall.total_expense),
            average_monthly_net: average(overall.net_cash_flow),
            mortgage: total.mortgage_summary(month_count),
            overall,
        };
        info!(
            months = summary.month_count,
            income = %summary.overall.total_income,
            expense = %summary.overall.total_expense,
            "aggregated cash flow"
        );
        Ok(summary)
    }
}
