use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{FlowbookError, Result};
use crate::models::{DroppedRow, Period, Transaction, NO_DESCRIPTION};
use crate::mortgage::{InvalidMortgageRecord, MortgageRecord};

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%Y-%m-%d",
    "%m-%d-%Y",
    "%Y/%m/%d",
    "%m/%d/%y",
    "%b %d, %Y",
];

const DATE_HEADERS: &[&str] = &["posting date", "date", "transaction date", "post date", "posted date"];
const DESCRIPTION_HEADERS: &[&str] = &["description", "payee", "merchant", "details", "memo"];
const AMOUNT_HEADERS: &[&str] = &["amount", "transaction amount"];
const BALANCE_HEADERS: &[&str] = &["balance", "running balance", "running bal."];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a bank-formatted amount: `$1,234.56`, `"-45.00"`, `(12.00)`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        return Decimal::from_str(inner.trim()).ok().map(|d| -d);
    }
    Decimal::from_str(s.trim_start_matches('+')).ok()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim().trim_matches('"');
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Read a file as UTF-8, replacing invalid bytes so Latin-1 exports load.
fn read_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
}

fn find_column(headers: &[String], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| headers.iter().position(|h| h == name))
}

fn normalized_headers(rdr: &mut csv::Reader<&[u8]>) -> Result<Vec<String>> {
    Ok(rdr
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect())
}

fn field<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Bank transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ImportBatch {
    pub transactions: Vec<Transaction>,
    pub dropped: Vec<DroppedRow>,
}

enum AmountColumns {
    Single(usize),
    DebitCredit {
        debit: Option<usize>,
        credit: Option<usize>,
    },
}

impl AmountColumns {
    fn read(&self, record: &csv::StringRecord) -> std::result::Result<Decimal, String> {
        match self {
            Self::Single(idx) => {
                let raw = field(record, Some(*idx));
                parse_amount(raw).ok_or_else(|| format!("invalid amount '{raw}'"))
            }
            Self::DebitCredit { debit, credit } => {
                let debit_raw = field(record, *debit);
                let credit_raw = field(record, *credit);
                let debit_amt = parse_amount(debit_raw);
                let credit_amt = parse_amount(credit_raw);
                if debit_amt.is_none() && credit_amt.is_none() {
                    return Err(format!(
                        "invalid amount (debit '{debit_raw}', credit '{credit_raw}')"
                    ));
                }
                Ok(credit_amt.unwrap_or_default().abs() - debit_amt.unwrap_or_default().abs())
            }
        }
    }
}

/// Load a bank CSV export. Source rows are numbered as in a spreadsheet, the
/// header being row 1.
pub fn import_transactions(path: &Path) -> Result<ImportBatch> {
    let content = read_lossy(path)?;
    let batch = parse_transactions(&content)?;
    info!(
        path = %path.display(),
        rows = batch.transactions.len(),
        dropped = batch.dropped.len(),
        "imported transactions"
    );
    Ok(batch)
}

pub fn parse_transactions(content: &str) -> Result<ImportBatch> {
    let mut rdr = reader(content);
    let headers = normalized_headers(&mut rdr)?;

    let date_col = find_column(&headers, DATE_HEADERS)
        .ok_or_else(|| FlowbookError::MissingColumn(format!("date (one of: {})", DATE_HEADERS.join(", "))))?;
    let desc_col = find_column(&headers, DESCRIPTION_HEADERS).ok_or_else(|| {
        FlowbookError::MissingColumn(format!("description (one of: {})", DESCRIPTION_HEADERS.join(", ")))
    })?;
    let amount_cols = match find_column(&headers, AMOUNT_HEADERS) {
        Some(idx) => AmountColumns::Single(idx),
        None => {
            let debit = find_column(&headers, &["debit", "withdrawal", "withdrawals"]);
            let credit = find_column(&headers, &["credit", "deposit", "deposits"]);
            if debit.is_none() && credit.is_none() {
                return Err(FlowbookError::MissingColumn(
                    "amount (or debit/credit)".to_string(),
                ));
            }
            AmountColumns::DebitCredit { debit, credit }
        }
    };
    let balance_col = find_column(&headers, BALANCE_HEADERS);

    let mut batch = ImportBatch::default();
    for (i, result) in rdr.records().enumerate() {
        let row = i + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                batch.dropped.push(DroppedRow {
                    row,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if record.iter().all(str::is_empty) {
            continue;
        }

        let date_raw = field(&record, Some(date_col));
        let Some(date) = parse_date(date_raw) else {
            batch.dropped.push(DroppedRow {
                row,
                reason: format!("invalid date '{date_raw}'"),
            });
            continue;
        };
        let amount = match amount_cols.read(&record) {
            Ok(a) => a,
            Err(reason) => {
                batch.dropped.push(DroppedRow { row, reason });
                continue;
            }
        };
        let description = match field(&record, Some(desc_col)) {
            "" => NO_DESCRIPTION,
            d => d,
        };
        let balance = parse_amount(field(&record, balance_col));

        batch
            .transactions
            .push(Transaction::new(row, date, description, amount, balance));
    }

    for d in &batch.dropped {
        warn!(row = d.row, reason = %d.reason, "dropped row");
    }
    Ok(batch)
}

// ---------------------------------------------------------------------------
// Mortgage ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MortgageImport {
    pub records: Vec<MortgageRecord>,
    pub rejected: Vec<InvalidMortgageRecord>,
    pub dropped: Vec<DroppedRow>,
}

enum MortgageLayout {
    Explicit {
        total: Option<usize>,
        principal: usize,
        interest: usize,
    },
    Details {
        amount: Option<usize>,
        details: usize,
        principal_re: Regex,
        interest_re: Regex,
    },
}

/// Load a mortgage servicer export: either explicit principal/interest
/// columns, or a `Details` column like `Principal$800.00 Interest$1,600.00`.
pub fn import_mortgage(path: &Path) -> Result<MortgageImport> {
    let content = read_lossy(path)?;
    let import = parse_mortgage(&content)?;
    info!(
        path = %path.display(),
        records = import.records.len(),
        rejected = import.rejected.len(),
        dropped = import.dropped.len(),
        "imported mortgage ledger"
    );
    Ok(import)
}

pub fn parse_mortgage(content: &str) -> Result<MortgageImport> {
    let mut rdr = reader(content);
    let headers = normalized_headers(&mut rdr)?;

    let period_col = find_column(&headers, &["period", "month", "date", "payment date"])
        .ok_or_else(|| FlowbookError::MissingColumn("period or date".to_string()))?;
    let total_col = find_column(&headers, &["total", "total payment", "payment", "amount"]);
    let layout = match (
        find_column(&headers, &["principal", "principal amount"]),
        find_column(&headers, &["interest", "interest amount"]),
        find_column(&headers, &["details"]),
    ) {
        (Some(principal), Some(interest), _) => MortgageLayout::Explicit {
            total: total_col,
            principal,
            interest,
        },
        (_, _, Some(details)) => MortgageLayout::Details {
            amount: total_col,
            details,
            principal_re: Regex::new(r"Principal\$?([\d,]+\.?\d*)")?,
            interest_re: Regex::new(r"Interest\$?([\d,]+\.?\d*)")?,
        },
        _ => {
            return Err(FlowbookError::MissingColumn(
                "principal and interest (or details)".to_string(),
            ))
        }
    };

    let mut import = MortgageImport::default();
    for (i, result) in rdr.records().enumerate() {
        let row = i + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                import.dropped.push(DroppedRow {
                    row,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if record.iter().all(str::is_empty) {
            continue;
        }

        let period_raw = field(&record, Some(period_col));
        let period = period_raw
            .parse::<Period>()
            .ok()
            .or_else(|| parse_date(period_raw).map(Period::of));
        let Some(period) = period else {
            import.dropped.push(DroppedRow {
                row,
                reason: format!("invalid period '{period_raw}'"),
            });
            continue;
        };

        let parts = match &layout {
            MortgageLayout::Explicit {
                total,
                principal,
                interest,
            } => {
                let principal = parse_amount(field(&record, Some(*principal)));
                let interest = parse_amount(field(&record, Some(*interest)));
                let total = parse_amount(field(&record, *total));
                principal.zip(interest).map(|(p, i)| (total, p, i))
            }
            MortgageLayout::Details {
                amount,
                details,
                principal_re,
                interest_re,
            } => {
                let text = field(&record, Some(*details));
                let capture = |re: &Regex| {
                    re.captures(text)
                        .and_then(|c| c.get(1))
                        .and_then(|m| parse_amount(m.as_str()))
                };
                let total = parse_amount(field(&record, *amount));
                capture(principal_re)
                    .zip(capture(interest_re))
                    .map(|(p, i)| (total, p, i))
            }
        };
        // Servicer exports mix payments with escrow and loan events; only rows
        // carrying both parts are monthly payments.
        let Some((total, principal, interest)) = parts else {
            import.dropped.push(DroppedRow {
                row,
                reason: "no principal/interest breakdown".to_string(),
            });
            continue;
        };
        let total = total.map(|t| t.abs()).unwrap_or(principal + interest);

        match MortgageRecord::new(period, total, principal.abs(), interest.abs()) {
            Ok(r) => import.records.push(r),
            Err(e) => {
                warn!("{e}");
                import.rejected.push(e);
            }
        }
    }
    Ok(import)
}
