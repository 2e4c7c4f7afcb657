use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::FlowbookError;

/// Cash-flow role of a transaction. Only INCOME and EXPENSE enter net cash flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowType {
    Income,
    Expense,
    InternalTransfer,
    Excluded,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
            Self::InternalTransfer => "INTERNAL_TRANSFER",
            Self::Excluded => "EXCLUDED",
        }
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitRole {
    Principal,
    Interest,
    #[default]
    None,
}

/// Which classifier step decided the flow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowBasis {
    ZeroAmount,
    CustomRule,
    ExcludedPattern,
    TransferPattern,
    PositiveAmount,
    NegativeAmount,
    MortgageSplit,
}

impl fmt::Display for FlowBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ZeroAmount => "zero amount",
            Self::CustomRule => "custom rule",
            Self::ExcludedPattern => "excluded pattern",
            Self::TransferPattern => "transfer pattern",
            Self::PositiveAmount => "credit",
            Self::NegativeAmount => "debit",
            Self::MortgageSplit => "mortgage split",
        };
        f.write_str(s)
    }
}

/// How the categorizer arrived at a category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchMethod {
    CustomRule,
    Pattern,
    Alias,
    Fuzzy { score: f64 },
    Uncategorized,
    MortgageSplit,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomRule => f.write_str("custom"),
            Self::Pattern => f.write_str("pattern"),
            Self::Alias => f.write_str("alias"),
            Self::Fuzzy { score } => write!(f, "fuzzy({score:.0})"),
            Self::Uncategorized => f.write_str("none"),
            Self::MortgageSplit => f.write_str("split"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Categorization {
    pub category: String,
    pub confidence: f64,
    pub method: MatchMethod,
}

/// A calendar month, the grouping key for metrics and the mortgage ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Number of days in the month.
    pub fn days(&self) -> u32 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        match (
            NaiveDate::from_ymd_opt(self.year, self.month, 1),
            NaiveDate::from_ymd_opt(next_year, next_month, 1),
        ) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 30,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = FlowbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FlowbookError::Other(format!("invalid month '{s}' (expected YYYY-MM)"));
        let (y, m) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Period::new(year, month).ok_or_else(invalid)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Stands in for a blank description column.
pub const NO_DESCRIPTION: &str = "(no description)";

/// One bank row moving through the pipeline. Derived fields start empty and
/// are filled exactly once by the stage that owns them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub balance: Option<Decimal>,
    pub source_row_id: usize,
    pub flow_type: Option<FlowType>,
    pub flow_basis: Option<FlowBasis>,
    pub category: Option<String>,
    pub confidence: f64,
    pub match_method: Option<MatchMethod>,
    pub is_mortgage_split: bool,
    pub split_role: SplitRole,
}

impl Transaction {
    pub fn new(
        source_row_id: usize,
        date: NaiveDate,
        description: impl Into<String>,
        amount: Decimal,
        balance: Option<Decimal>,
    ) -> Self {
        Self {
            date,
            description: description.into(),
            amount,
            balance,
            source_row_id,
            flow_type: None,
            flow_basis: None,
            category: None,
            confidence: 0.0,
            match_method: None,
            is_mortgage_split: false,
            split_role: SplitRole::None,
        }
    }

    pub fn period(&self) -> Period {
        Period::of(self.date)
    }

    pub fn abs_amount(&self) -> Decimal {
        self.amount.abs()
    }

    pub fn assign_flow(&mut self, flow_type: FlowType, basis: FlowBasis) {
        debug_assert!(self.flow_type.is_none(), "flow type assigned twice");
        self.flow_type = Some(flow_type);
        self.flow_basis = Some(basis);
    }

    pub fn assign_category(&mut self, result: Categorization) {
        debug_assert!(self.category.is_none(), "category assigned twice");
        self.category = Some(result.category);
        self.confidence = result.confidence;
        self.match_method = Some(result.method);
    }

    pub fn is_low_confidence(&self, threshold: f64) -> bool {
        self.confidence < threshold
    }

    pub fn category_name(&self) -> &str {
        self.category.as_deref().unwrap_or(crate::patterns::UNCATEGORIZED)
    }
}

/// A source row the importer could not turn into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse_and_display() {
        let p: Period = "2025-03".parse().unwrap();
        assert_eq!(p, Period { year: 2025, month: 3 });
        assert_eq!(p.to_string(), "2025-03");
        assert!("2025-13".parse::<Period>().is_err());
        assert!("March".parse::<Period>().is_err());
    }

    #[test]
    fn test_period_ordering_is_chronological() {
        let a = Period::new(2024, 12).unwrap();
        let b = Period::new(2025, 1).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_period_days() {
        assert_eq!(Period::new(2024, 12).unwrap().days(), 31);
        assert_eq!(Period::new(2024, 2).unwrap().days(), 29);
        assert_eq!(Period::new(2025, 2).unwrap().days(), 28);
        assert_eq!(Period::new(2025, 4).unwrap().days(), 30);
    }

    #[test]
    fn test_flow_type_serializes_screaming_case() {
        let json = serde_json::to_string(&FlowType::InternalTransfer).unwrap();
        assert_eq!(json, "\"INTERNAL_TRANSFER\"");
        let back: FlowType = serde_json::from_str("\"EXCLUDED\"").unwrap();
        assert_eq!(back, FlowType::Excluded);
    }

    #[test]
    fn test_new_transaction_is_unclassified() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let t = Transaction::new(1, date, "COFFEE", Decimal::new(-450, 2), None);
        assert!(t.flow_type.is_none());
        assert!(t.category.is_none());
        assert_eq!(t.split_role, SplitRole::None);
        assert_eq!(t.period().to_string(), "2025-01");
    }
}
