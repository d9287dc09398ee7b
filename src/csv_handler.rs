use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::categorizer::Categorizer;
use crate::error::{ImportError, Result};
use crate::handler::{matches_file_name, FormatHandler};
use crate::mapping::{ColumnMapping, ExpenseRule};
use crate::models::{FileType, Money, Transaction};
use crate::parsing::{currency_code, detect_delimiter, looks_like_date, parse_amount, parse_date, split_fields};
use crate::source::LineSource;

// ---------------------------------------------------------------------------
// Row parser shared by the CSV and spreadsheet handlers
// ---------------------------------------------------------------------------

/// Turns already-split fields into a record according to a mapping.
#[derive(Debug, Clone)]
pub struct RowParser {
    bank_name: String,
    mapping: ColumnMapping,
    categorizer: Categorizer,
}

impl RowParser {
    pub fn new(bank_name: &str, mapping: ColumnMapping, categorizer: Categorizer) -> Self {
        Self {
            bank_name: bank_name.to_string(),
            mapping,
            categorizer,
        }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn parse_fields(&self, fields: &[String], line: &str) -> Result<Option<Transaction>> {
        let m = &self.mapping;
        let field = |idx: usize| fields.get(idx).map(String::as_str).filter(|v| !v.is_empty());

        let populated = m.key_columns().filter(|i| field(*i).is_some()).count();
        if populated < m.expected_min_column_count {
            debug!(
                bank = %self.bank_name,
                populated,
                expected = m.expected_min_column_count,
                "not enough populated columns"
            );
            return Ok(None);
        }

        if let Some(status) = &m.status {
            let value = fields.get(status.column).map(String::as_str);
            if !status.accepts(value) {
                debug!(bank = %self.bank_name, status = ?value, "status not in whitelist");
                return Ok(None);
            }
        }

        let date_raw = self
            .locate_date(fields)
            .ok_or_else(|| ImportError::line(line, "no date-like column"))?;
        let date = parse_date(date_raw, &m.date_formats)
            .ok_or_else(|| ImportError::line(line, format!("unparseable date {date_raw:?}")))?;

        let amount_raw = field(m.amount_column)
            .ok_or_else(|| ImportError::line(line, format!("amount column {} is empty", m.amount_column)))?;
        let amount = parse_amount(amount_raw, &m.amount)
            .ok_or_else(|| ImportError::line(line, format!("unparseable amount {amount_raw:?}")))?;

        let is_expense = match &m.expense {
            ExpenseRule::AmountSign => amount < 0.0,
            ExpenseRule::Column { index, true_value } => match field(*index) {
                Some(v) => v.to_lowercase() == true_value.trim().to_lowercase(),
                None => amount < 0.0,
            },
        };

        let currency = currency_code(m.currency_column.and_then(field), &m.default_currency);
        let title = m
            .description_column
            .and_then(field)
            .unwrap_or("No description")
            .to_string();
        let category = match m.category_column.and_then(field) {
            Some(c) => c.to_string(),
            None => self.categorizer.detect(&title, is_expense),
        };
        let note = match m.note_column.and_then(field) {
            Some(n) => n.to_string(),
            None => format!("Imported from {}", self.bank_name),
        };

        Ok(Some(Transaction::new(
            Money::new(amount, &currency),
            category,
            date,
            is_expense,
            note,
            &self.bank_name,
            title,
        )))
    }

    /// The configured date column, or the first column that looks like a
    /// date when the configured one doesn't.
    fn locate_date<'a>(&self, fields: &'a [String]) -> Option<&'a str> {
        let m = &self.mapping;
        if let Some(v) = fields.get(m.date_column) {
            if looks_like_date(v) || parse_date(v, &m.date_formats).is_some() {
                return Some(v.as_str());
            }
        }
        let found = fields.iter().position(|v| looks_like_date(v))?;
        debug!(
            bank = %self.bank_name,
            configured = m.date_column,
            found,
            "date found outside configured column"
        );
        Some(fields[found].as_str())
    }
}

// ---------------------------------------------------------------------------
// Generic CSV handler
// ---------------------------------------------------------------------------

/// Content check used when the file name gives no hint.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ContentSniff {
    #[default]
    None,
    /// First line contains a comma, semicolon or tab.
    Delimiters,
    /// First line contains every marker (case-insensitive).
    HeaderMarkers(Vec<String>),
}

impl ContentSniff {
    pub fn matches(&self, first_line: &str) -> bool {
        match self {
            Self::None => false,
            Self::Delimiters => first_line.contains([',', ';', '\t']),
            Self::HeaderMarkers(markers) => {
                let line = first_line.to_lowercase();
                !markers.is_empty() && markers.iter().all(|m| line.contains(&m.to_lowercase()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CsvProfile {
    pub key: String,
    pub bank_name: String,
    pub keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
    pub sniff: ContentSniff,
    pub mapping: ColumnMapping,
}

impl CsvProfile {
    pub fn generic(mapping: ColumnMapping) -> Self {
        Self {
            key: "generic_csv".to_string(),
            bank_name: "Generic CSV".to_string(),
            keywords: [".csv", "export", "transactions"].map(String::from).to_vec(),
            negative_keywords: Vec::new(),
            sniff: ContentSniff::Delimiters,
            mapping,
        }
    }
}

pub struct GenericCsvHandler {
    profile: CsvProfile,
    parser: RowParser,
}

impl GenericCsvHandler {
    pub fn new(profile: CsvProfile, categorizer: Categorizer) -> Self {
        let parser = RowParser::new(&profile.bank_name, profile.mapping.clone(), categorizer);
        Self { profile, parser }
    }

    fn delimiter(&self) -> char {
        self.profile.mapping.delimiter
    }
}

impl Default for GenericCsvHandler {
    fn default() -> Self {
        Self::new(CsvProfile::generic(ColumnMapping::default()), Categorizer::default())
    }
}

impl FormatHandler for GenericCsvHandler {
    fn key(&self) -> &str {
        &self.profile.key
    }

    fn bank_name(&self) -> &str {
        &self.profile.bank_name
    }

    fn file_type(&self) -> FileType {
        FileType::Csv
    }

    fn file_name_keywords(&self) -> &[String] {
        &self.profile.keywords
    }

    fn negative_keywords(&self) -> &[String] {
        &self.profile.negative_keywords
    }

    fn can_handle(&self, file_name: &str, path: &Path, file_type: FileType) -> bool {
        if matches_file_name(self, file_name, file_type) {
            return true;
        }
        if self.profile.sniff == ContentSniff::None
            || !matches!(file_type, FileType::Csv | FileType::Unknown)
        {
            return false;
        }
        let first_line = File::open(path).ok().and_then(|f| {
            let mut line = String::new();
            BufReader::new(f).read_line(&mut line).ok().map(|_| line)
        });
        match first_line {
            Some(line) if self.profile.sniff.matches(&line) => {
                debug!(bank = %self.profile.bank_name, file_name, "matched by content");
                true
            }
            _ => false,
        }
    }

    fn is_valid_format(&self, source: &mut LineSource) -> bool {
        let first = match source.peek_line() {
            Ok(Some(line)) => line.to_string(),
            Ok(None) => {
                warn!(bank = %self.profile.bank_name, "file is empty");
                return false;
            }
            Err(e) => {
                warn!(bank = %self.profile.bank_name, error = %e, "cannot read first line");
                return false;
            }
        };
        let delimiter = detect_delimiter(&first, self.delimiter());
        let columns = split_fields(&first, delimiter).len();
        let valid = columns >= self.profile.mapping.expected_min_column_count;
        debug!(
            bank = %self.profile.bank_name,
            first_line = %first,
            %delimiter,
            columns,
            valid,
            "format check"
        );
        valid
    }

    fn skip_headers(&self, source: &mut LineSource) -> Result<()> {
        for _ in 0..self.profile.mapping.header_lines {
            match source.next_line()? {
                Some(header) => debug!(bank = %self.profile.bank_name, %header, "header skipped"),
                None => break,
            }
        }
        Ok(())
    }

    fn should_skip_line(&self, line: &str) -> bool {
        line.chars()
            .all(|c| c.is_whitespace() || matches!(c, ',' | ';' | '"') || c == self.delimiter())
    }

    fn parse_line(&self, line: &str) -> Result<Option<Transaction>> {
        let delimiter = detect_delimiter(line, self.delimiter());
        let fields = split_fields(line, delimiter);
        trace!(bank = %self.profile.bank_name, %delimiter, columns = fields.len(), "split line");
        self.parser.parse_fields(&fields, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn handler(mapping: ColumnMapping) -> GenericCsvHandler {
        GenericCsvHandler::new(CsvProfile::generic(mapping), Categorizer::default())
    }

    #[test]
    fn test_round_trip_sample() {
        let h = GenericCsvHandler::default();
        let t = h.parse_line("2024-05-01,Coffee shop,-350.50,RUB").unwrap().unwrap();
        assert_eq!(t.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(t.title, "Coffee shop");
        assert_eq!(t.amount.amount, 350.50);
        assert_eq!(t.amount.currency, "RUB");
        assert!(t.is_expense);
        assert_eq!(t.source, "Generic CSV");
        assert_eq!(t.note, "Imported from Generic CSV");
    }

    #[test]
    fn test_positive_amount_is_income() {
        let h = GenericCsvHandler::default();
        let t = h.parse_line("2024-05-02,Salary,1000,USD").unwrap().unwrap();
        assert!(!t.is_expense);
        assert_eq!(t.category, "Salary");
    }

    #[test]
    fn test_status_filter_rejects_pending() {
        let mapping = ColumnMapping::builder()
            .status_filter(4, &["POSTED"], true)
            .build()
            .unwrap();
        let h = handler(mapping);
        assert!(h
            .parse_line("2024-05-01,Coffee shop,-350.50,RUB,PENDING")
            .unwrap()
            .is_none());
        assert!(h
            .parse_line("2024-05-01,Coffee shop,-350.50,RUB,posted")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_delimiter_fallback() {
        let h = GenericCsvHandler::default();
        let t = h.parse_line("2024-05-01;Coffee shop;-350.50;RUB").unwrap().unwrap();
        assert_eq!(t.title, "Coffee shop");
        assert_eq!(t.amount.amount, 350.50);
    }

    #[test]
    fn test_date_found_in_other_column() {
        let h = GenericCsvHandler::default();
        // Leading id column shifts everything by one.
        let t = h.parse_line("17,2024-05-01,-99.90,EUR").unwrap().unwrap();
        assert_eq!(t.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_too_few_populated_columns_is_not_a_transaction() {
        let h = GenericCsvHandler::default();
        assert!(h.parse_line("2024-05-01,,").unwrap().is_none());
    }

    #[test]
    fn test_bad_amount_is_an_error() {
        let h = GenericCsvHandler::default();
        let err = h.parse_line("2024-05-01,Coffee,abc,RUB").unwrap_err();
        assert!(matches!(err, ImportError::Line { .. }));
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let h = GenericCsvHandler::default();
        assert!(h.parse_line("yesterday,Coffee,-1.00,RUB").is_err());
    }

    #[test]
    fn test_expense_from_indicator_column() {
        let mapping = ColumnMapping::builder()
            .expense_from_column(4, "Расход")
            .build()
            .unwrap();
        let h = handler(mapping);
        let t = h.parse_line("2024-05-01,Магазин,350.50,RUB,расход").unwrap().unwrap();
        assert!(t.is_expense);
        let t = h.parse_line("2024-05-01,Возврат,350.50,RUB,Доход").unwrap().unwrap();
        assert!(!t.is_expense);
        // Blank indicator falls back to the sign.
        let t = h.parse_line("2024-05-01,Магазин,-10,RUB,").unwrap().unwrap();
        assert!(t.is_expense);
    }

    #[test]
    fn test_default_currency_when_column_missing() {
        let mapping = ColumnMapping::builder().default_currency("eur").build().unwrap();
        let h = handler(mapping);
        let t = h.parse_line("2024-05-01,Coffee,-3.5").unwrap().unwrap();
        assert_eq!(t.amount.currency, "EUR");
    }

    #[test]
    fn test_parsing_is_repeatable() {
        let h = GenericCsvHandler::default();
        let line = "2024-05-01,Coffee shop,-350.50,RUB";
        let a = h.parse_line(line).unwrap().unwrap();
        let b = h.parse_line(line).unwrap().unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(Transaction { id: String::new(), ..a }, Transaction { id: String::new(), ..b });
    }

    #[test]
    fn test_should_skip_line() {
        let h = GenericCsvHandler::default();
        assert!(h.should_skip_line(""));
        assert!(h.should_skip_line("   "));
        assert!(h.should_skip_line(",,,"));
        assert!(!h.should_skip_line("2024-05-01,x,1,RUB"));
    }

    #[test]
    fn test_format_check_peeks_only() {
        let h = GenericCsvHandler::default();
        let mut src = LineSource::from_text("Date,Description,Amount,Currency\n2024-05-01,x,1,RUB\n".into());
        assert!(h.is_valid_format(&mut src));
        h.skip_headers(&mut src).unwrap();
        assert_eq!(src.next_line().unwrap().as_deref(), Some("2024-05-01,x,1,RUB"));

        let mut empty = LineSource::from_text(String::new());
        assert!(!h.is_valid_format(&mut empty));
        let mut prose = LineSource::from_text("just some words\n".into());
        assert!(!h.is_valid_format(&mut prose));
    }

    #[test]
    fn test_header_marker_sniff() {
        let sniff = ContentSniff::HeaderMarkers(vec!["Дата операции".into(), "Статус".into()]);
        assert!(sniff.matches("\"Дата операции\";\"Дата платежа\";\"Статус\""));
        assert!(!sniff.matches("Date;Status"));
        assert!(ContentSniff::Delimiters.matches("a;b"));
        assert!(!ContentSniff::None.matches("a;b"));
    }
}
