//! Spreadsheet workbooks adapted into the same line stream the CSV handler
//! reads: one tab-joined synthetic line per data row.

use std::fmt::Write as _;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::categorizer::Categorizer;
use crate::csv_handler::RowParser;
use crate::engine::ProgressCallback;
use crate::error::{ImportError, Result};
use crate::handler::{matches_file_name, FormatHandler};
use crate::mapping::ColumnMapping;
use crate::models::{FileType, Transaction};
use crate::parsing::excel_serial_to_date;
use crate::source::LineSource;

/// Cells of a synthetic line are joined with this.
pub const INTERNAL_DELIMITER: char = '\t';

const SCAN_PROGRESS_EVERY: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl SheetSelector {
    /// Picks a sheet name. An index past the end clamps to the last sheet.
    pub fn resolve(&self, names: &[String]) -> Result<String> {
        let last = names
            .len()
            .checked_sub(1)
            .ok_or_else(|| ImportError::Spreadsheet("workbook has no sheets".into()))?;
        match self {
            Self::Index(i) => {
                if *i > last {
                    warn!(requested = i, available = names.len(), "sheet index out of range, clamping");
                }
                Ok(names[(*i).min(last)].clone())
            }
            Self::Name(name) => names
                .iter()
                .find(|n| *n == name)
                .cloned()
                .ok_or_else(|| ImportError::Spreadsheet(format!("no sheet named {name:?}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Cell formatting
// ---------------------------------------------------------------------------

/// Renders any cell type as display text, consistently for one mapping.
#[derive(Debug, Clone)]
pub struct CellFormatter {
    decimal_separator: char,
    date_format: String,
}

impl CellFormatter {
    pub fn new(decimal_separator: char, date_format: &str) -> Self {
        Self {
            decimal_separator,
            date_format: date_format.to_string(),
        }
    }

    pub fn for_mapping(mapping: &ColumnMapping) -> Self {
        let date_format = mapping
            .date_formats
            .first()
            .map(String::as_str)
            .unwrap_or("%Y-%m-%d");
        Self::new(mapping.amount.decimal_separator, date_format)
    }

    pub fn format(&self, cell: &Data) -> String {
        let text = match cell {
            Data::Empty | Data::Error(_) => String::new(),
            Data::String(s) => s.trim().to_string(),
            Data::Int(i) => i.to_string(),
            Data::Float(f) => self.format_number(*f),
            Data::Bool(true) => "TRUE".to_string(),
            Data::Bool(false) => "FALSE".to_string(),
            Data::DateTime(dt) => match serial_to_datetime(dt.as_f64()) {
                Some(ts) => self.format_datetime(ts),
                None => self.format_number(dt.as_f64()),
            },
            Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        };
        // Tabs and newlines would break the synthetic line.
        if text.contains(['\t', '\n', '\r']) {
            text.replace(['\t', '\n', '\r'], " ")
        } else {
            text
        }
    }

    fn format_number(&self, value: f64) -> String {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            return format!("{}", value as i64);
        }
        let text = value.to_string();
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }

    fn format_datetime(&self, ts: NaiveDateTime) -> String {
        let mut out = String::new();
        if write!(out, "{}", ts.format(&self.date_format)).is_err() {
            out = ts.date().format("%Y-%m-%d").to_string();
        }
        out
    }
}

fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let day = excel_serial_to_date(serial)?;
    let secs = (serial.fract() * 86_400.0).round() as i64;
    day.and_hms_opt(0, 0, 0)?
        .checked_add_signed(chrono::Duration::seconds(secs))
}

// ---------------------------------------------------------------------------
// Header detection
// ---------------------------------------------------------------------------

/// Locates the header row by keyword for layouts whose preamble length
/// varies between exports.
#[derive(Debug, Clone)]
pub struct HeaderDetection {
    pub scan_rows: usize,
    pub date_keywords: Vec<String>,
    pub amount_keywords: Vec<String>,
    pub description_keywords: Vec<String>,
    pub category_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedHeader {
    /// Absolute row index of the header.
    pub row: usize,
    pub date: usize,
    pub description: Option<usize>,
    pub amount: usize,
    pub category: Option<usize>,
}

impl DetectedHeader {
    /// Columns in the order date, description, amount, category.
    pub fn projection(&self) -> Vec<Option<usize>> {
        vec![Some(self.date), self.description, Some(self.amount), self.category]
    }
}

impl HeaderDetection {
    pub fn detect(&self, range: &Range<Data>) -> Option<DetectedHeader> {
        let (start_row, start_col) = range.start()?;
        let (start_row, start_col) = (start_row as usize, start_col as usize);
        for (i, row) in range.rows().take(self.scan_rows).enumerate() {
            let cells: Vec<String> = row
                .iter()
                .map(|c| match c {
                    Data::String(s) => s.trim().to_lowercase(),
                    _ => String::new(),
                })
                .collect();
            let find = |keywords: &[String]| {
                cells
                    .iter()
                    .position(|c| !c.is_empty() && keywords.iter().any(|k| c.contains(k.as_str())))
                    .map(|pos| pos + start_col)
            };
            let (Some(date), Some(amount)) = (find(&self.date_keywords), find(&self.amount_keywords))
            else {
                continue;
            };
            let header = DetectedHeader {
                row: start_row + i,
                date,
                description: find(&self.description_keywords),
                amount,
                category: find(&self.category_keywords),
            };
            debug!(?header, "header row detected");
            return Some(header);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Converts the data rows of a sheet into synthetic lines. `columns` lists,
/// per output position, the absolute sheet column to read (or `None` for an
/// always-blank cell). Rows above `header_rows` are dropped.
pub fn extract_lines(
    range: &Range<Data>,
    columns: &[Option<usize>],
    header_rows: usize,
    skip_empty_rows: bool,
    formatter: &CellFormatter,
    progress: &mut dyn ProgressCallback,
) -> Vec<String> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let (start_row, start_col) = (start_row as usize, start_col as usize);
    let total = range.height();
    let mut lines = Vec::with_capacity(total);
    let mut dropped = 0usize;

    for (i, row) in range.rows().enumerate() {
        if i > 0 && i % SCAN_PROGRESS_EVERY == 0 {
            progress.on_scan(i, total);
        }
        if start_row + i < header_rows {
            continue;
        }
        let cells: Vec<String> = columns
            .iter()
            .map(|col| {
                col.and_then(|c| c.checked_sub(start_col))
                    .and_then(|c| row.get(c))
                    .map(|cell| formatter.format(cell))
                    .unwrap_or_default()
            })
            .collect();
        if skip_empty_rows && cells.iter().all(String::is_empty) {
            dropped += 1;
            continue;
        }
        lines.push(cells.join(&INTERNAL_DELIMITER.to_string()));
    }
    progress.on_scan(total, total);
    debug!(rows = total, lines = lines.len(), dropped, "sheet extracted");
    lines
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SpreadsheetProfile {
    pub key: String,
    pub bank_name: String,
    pub keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
    /// Accept any spreadsheet when no keyword matches.
    pub accept_any: bool,
    pub sheet: SheetSelector,
    pub header_rows: usize,
    pub skip_empty_rows: bool,
    pub header_detection: Option<HeaderDetection>,
    pub mapping: ColumnMapping,
}

impl SpreadsheetProfile {
    pub fn generic(mapping: ColumnMapping) -> Self {
        Self {
            key: "generic_spreadsheet".to_string(),
            bank_name: "Generic spreadsheet".to_string(),
            keywords: ["statement", "export", "transactions"].map(String::from).to_vec(),
            negative_keywords: Vec::new(),
            accept_any: true,
            sheet: SheetSelector::default(),
            header_rows: mapping.header_lines,
            skip_empty_rows: true,
            header_detection: None,
            mapping,
        }
    }
}

pub struct SpreadsheetHandler {
    profile: SpreadsheetProfile,
    parser: RowParser,
    formatter: CellFormatter,
}

impl SpreadsheetHandler {
    pub fn new(profile: SpreadsheetProfile, categorizer: Categorizer) -> Self {
        let parser = RowParser::new(&profile.bank_name, profile.mapping.clone(), categorizer);
        let formatter = CellFormatter::for_mapping(&profile.mapping);
        Self {
            profile,
            parser,
            formatter,
        }
    }

    /// Column projection and header row count for this sheet.
    fn layout(&self, range: &Range<Data>) -> (Vec<Option<usize>>, usize) {
        if let Some(detection) = &self.profile.header_detection {
            match detection.detect(range) {
                Some(header) => return (header.projection(), header.row + 1),
                None => warn!(
                    bank = %self.profile.bank_name,
                    scanned = detection.scan_rows,
                    "no header row found, using configured layout"
                ),
            }
        }
        let identity = (0..=self.profile.mapping.max_column_index()).map(Some).collect();
        (identity, self.profile.header_rows)
    }

    pub fn extract(&self, range: &Range<Data>, progress: &mut dyn ProgressCallback) -> Vec<String> {
        let (columns, header_rows) = self.layout(range);
        extract_lines(
            range,
            &columns,
            header_rows,
            self.profile.skip_empty_rows,
            &self.formatter,
            progress,
        )
    }

    fn fields(line: &str) -> Vec<String> {
        line.split(INTERNAL_DELIMITER).map(|f| f.trim().to_string()).collect()
    }
}

impl FormatHandler for SpreadsheetHandler {
    fn key(&self) -> &str {
        &self.profile.key
    }

    fn bank_name(&self) -> &str {
        &self.profile.bank_name
    }

    fn file_type(&self) -> FileType {
        FileType::Spreadsheet
    }

    fn file_name_keywords(&self) -> &[String] {
        &self.profile.keywords
    }

    fn negative_keywords(&self) -> &[String] {
        &self.profile.negative_keywords
    }

    fn can_handle(&self, file_name: &str, _path: &Path, file_type: FileType) -> bool {
        matches_file_name(self, file_name, file_type)
            || (self.profile.accept_any && file_type == FileType::Spreadsheet)
    }

    fn open_source(&self, path: &Path, progress: &mut dyn ProgressCallback) -> Result<LineSource> {
        let mut workbook = open_workbook_auto(path)?;
        let names = workbook.sheet_names();
        let sheet = self.profile.sheet.resolve(&names)?;
        let range = workbook.worksheet_range(&sheet)?;
        info!(bank = %self.profile.bank_name, %sheet, rows = range.height(), "reading sheet");
        let lines = self.extract(&range, progress);
        Ok(LineSource::from_text(lines.join("\n")))
    }

    fn is_valid_format(&self, source: &mut LineSource) -> bool {
        let mapping = self.parser.mapping();
        // The sheet is already materialized, so every extracted line is checked.
        let total = source.estimated_lines().unwrap_or(usize::MAX);
        let lines = match source.peek_lines(total) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(bank = %self.profile.bank_name, error = %e, "cannot read extracted lines");
                return false;
            }
        };
        let valid = lines.iter().any(|line| {
            let fields = Self::fields(line);
            let populated = mapping
                .key_columns()
                .filter(|i| fields.get(*i).is_some_and(|f| !f.is_empty()))
                .count();
            populated >= mapping.expected_min_column_count
        });
        debug!(bank = %self.profile.bank_name, peeked = lines.len(), valid, "format check");
        valid
    }

    fn skip_headers(&self, _source: &mut LineSource) -> Result<()> {
        debug!(bank = %self.profile.bank_name, "header rows already removed during extraction");
        Ok(())
    }

    fn parse_line(&self, line: &str) -> Result<Option<Transaction>> {
        self.parser.parse_fields(&Self::fields(line), line)
    }
}
