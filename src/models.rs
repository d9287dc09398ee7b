use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Non-negative monetary magnitude plus an ISO currency code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    pub currency: String,
}

impl Money {
    pub fn new(amount: f64, currency: &str) -> Self {
        Self {
            amount: amount.abs(),
            currency: currency.trim().to_uppercase(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

/// Normalized record every handler produces, regardless of the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub amount: Money,
    pub category: String,
    pub date: NaiveDate,
    pub is_expense: bool,
    pub note: String,
    pub source: String,
    pub title: String,
}

impl Transaction {
    /// Builds a record with a fresh id. Blank `source` is replaced so a
    /// record always names the handler that produced it.
    pub fn new(
        amount: Money,
        category: String,
        date: NaiveDate,
        is_expense: bool,
        note: String,
        source: &str,
        title: String,
    ) -> Self {
        let source = if source.trim().is_empty() {
            "Unknown".to_string()
        } else {
            source.to_string()
        };
        Self {
            id: ulid::Ulid::new().to_string(),
            amount,
            category,
            date,
            is_expense,
            note,
            source,
            title,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Csv,
    Spreadsheet,
    Unknown,
}

impl FileType {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") | Some("txt") => Self::Csv,
            Some("xlsx") | Some("xlsm") | Some("xls") | Some("xlsb") | Some("ods") => {
                Self::Spreadsheet
            }
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Csv => "csv",
            Self::Spreadsheet => "spreadsheet",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One event of an import run: zero or more `Progress`, then exactly one
/// `Success` or `Error`.
#[derive(Debug)]
pub enum ImportResult {
    Progress {
        current: u32,
        total: u32,
        message: String,
    },
    Success {
        imported_count: usize,
        skipped_count: usize,
        bank_name: String,
        message: String,
    },
    Error {
        message: String,
        cause: Option<ImportError>,
    },
}

impl ImportResult {
    pub fn progress(current: u32, total: u32, message: impl Into<String>) -> Self {
        Self::Progress {
            current,
            total,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            cause: None,
        }
    }

    pub fn error_with_cause(message: impl Into<String>, cause: ImportError) -> Self {
        Self::Error {
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

impl fmt::Display for ImportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progress {
                current,
                total,
                message,
            } => write!(f, "[{current}/{total}] {message}"),
            Self::Success {
                imported_count,
                skipped_count,
                bank_name,
                message,
            } => {
                write!(
                    f,
                    "{bank_name}: {imported_count} imported, {skipped_count} skipped"
                )?;
                if !message.is_empty() {
                    write!(f, " ({message})")?;
                }
                Ok(())
            }
            Self::Error { message, cause } => match cause {
                Some(c) => write!(f, "{message}: {c}"),
                None => f.write_str(message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_is_never_negative() {
        let m = Money::new(-350.5, "rub");
        assert_eq!(m.amount, 350.5);
        assert_eq!(m.currency, "RUB");
    }

    #[test]
    fn test_blank_source_is_replaced() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let t = Transaction::new(
            Money::new(1.0, "USD"),
            "Food".into(),
            date,
            true,
            String::new(),
            "  ",
            "Coffee".into(),
        );
        assert_eq!(t.source, "Unknown");
        assert!(!t.id.is_empty());
    }

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_path(Path::new("a/stmt.CSV")), FileType::Csv);
        assert_eq!(FileType::from_path(Path::new("alfa.xlsx")), FileType::Spreadsheet);
        assert_eq!(FileType::from_path(Path::new("statement.pdf")), FileType::Unknown);
        assert_eq!(FileType::from_path(Path::new("noext")), FileType::Unknown);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!ImportResult::progress(0, 100, "x").is_terminal());
        assert!(ImportResult::error("bad").is_terminal());
    }
}
