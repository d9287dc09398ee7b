//! Declarative column mapping that parameterizes the generic handlers, so a
//! new bank layout is a configuration value rather than new code.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::parsing::FALLBACK_DATE_FORMATS;

/// How the engine decides between expense and income.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExpenseRule {
    /// Negative amounts are expenses.
    AmountSign,
    /// The indicator column equals `true_value` (case-insensitive). Blank or
    /// missing indicators fall back to the amount sign.
    Column { index: usize, true_value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountRules {
    pub decimal_separator: char,
    pub grouping_separator: Option<char>,
    pub currency_symbols: Vec<String>,
    /// Characters matching this pattern are removed. Without it, everything
    /// but digits and separators is removed.
    pub custom_cleanup_pattern: Option<String>,
    #[serde(skip)]
    pub(crate) compiled: OnceLock<Option<Regex>>,
}

impl Default for AmountRules {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: None,
            currency_symbols: Vec::new(),
            custom_cleanup_pattern: None,
            compiled: OnceLock::new(),
        }
    }
}

impl AmountRules {
    pub fn cleanup_regex(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| {
                self.custom_cleanup_pattern
                    .as_deref()
                    .and_then(|p| Regex::new(p).ok())
            })
            .as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusFilter {
    pub column: usize,
    pub valid_values: Vec<String>,
    #[serde(default = "default_true")]
    pub skip_if_invalid: bool,
}

impl StatusFilter {
    pub fn accepts(&self, status: Option<&str>) -> bool {
        if !self.skip_if_invalid {
            return true;
        }
        let Some(status) = status else {
            return false;
        };
        let status = status.trim().to_lowercase();
        self.valid_values
            .iter()
            .any(|v| v.trim().to_lowercase() == status)
    }
}

fn default_true() -> bool {
    true
}

/// Validated, immutable mapping. Build one with [`ColumnMapping::builder`]
/// or deserialize it from a format profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "MappingBuilder")]
pub struct ColumnMapping {
    pub(crate) delimiter: char,
    pub(crate) header_lines: usize,
    pub(crate) date_column: usize,
    pub(crate) description_column: Option<usize>,
    pub(crate) amount_column: usize,
    pub(crate) currency_column: Option<usize>,
    pub(crate) category_column: Option<usize>,
    pub(crate) note_column: Option<usize>,
    pub(crate) date_formats: Vec<String>,
    pub(crate) amount: AmountRules,
    pub(crate) expense: ExpenseRule,
    pub(crate) default_currency: String,
    pub(crate) expected_min_column_count: usize,
    pub(crate) status: Option<StatusFilter>,
}

impl ColumnMapping {
    pub fn builder() -> MappingBuilder {
        MappingBuilder::default()
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn header_lines(&self) -> usize {
        self.header_lines
    }

    pub fn default_currency(&self) -> &str {
        &self.default_currency
    }

    /// Key columns whose populated values count toward
    /// `expected_min_column_count`.
    pub(crate) fn key_columns(&self) -> impl Iterator<Item = usize> + '_ {
        [Some(self.date_column), self.description_column, Some(self.amount_column)]
            .into_iter()
            .flatten()
    }

    /// Highest column index any part of the mapping reads.
    pub fn max_column_index(&self) -> usize {
        let expense = match &self.expense {
            ExpenseRule::Column { index, .. } => Some(*index),
            ExpenseRule::AmountSign => None,
        };
        [
            Some(self.date_column),
            self.description_column,
            Some(self.amount_column),
            self.currency_column,
            self.category_column,
            self.note_column,
            expense,
            self.status.as_ref().map(|s| s.column),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            delimiter: ',',
            header_lines: 1,
            date_column: 0,
            description_column: Some(1),
            amount_column: 2,
            currency_column: Some(3),
            category_column: None,
            note_column: None,
            date_formats: default_date_formats(),
            amount: AmountRules::default(),
            expense: ExpenseRule::AmountSign,
            default_currency: "USD".to_string(),
            expected_min_column_count: 3,
            status: None,
        }
    }
}

fn default_date_formats() -> Vec<String> {
    std::iter::once("%Y-%m-%d")
        .chain(FALLBACK_DATE_FORMATS.iter().copied())
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingBuilder {
    pub delimiter: char,
    pub header_lines: usize,
    pub date_column: usize,
    pub description_column: Option<usize>,
    pub amount_column: Option<usize>,
    pub currency_column: Option<usize>,
    pub category_column: Option<usize>,
    pub note_column: Option<usize>,
    pub primary_date_format: String,
    pub fallback_date_formats: Vec<String>,
    pub amount: AmountRules,
    pub expense: ExpenseRule,
    pub default_currency: String,
    pub expected_min_column_count: usize,
    pub status: Option<StatusFilter>,
}

impl Default for MappingBuilder {
    fn default() -> Self {
        let d = ColumnMapping::default();
        Self {
            delimiter: d.delimiter,
            header_lines: d.header_lines,
            date_column: d.date_column,
            description_column: d.description_column,
            amount_column: Some(d.amount_column),
            currency_column: d.currency_column,
            category_column: d.category_column,
            note_column: d.note_column,
            primary_date_format: "%Y-%m-%d".to_string(),
            fallback_date_formats: FALLBACK_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
            amount: d.amount,
            expense: d.expense,
            default_currency: d.default_currency,
            expected_min_column_count: d.expected_min_column_count,
            status: d.status,
        }
    }
}

impl MappingBuilder {
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn header_lines(mut self, n: usize) -> Self {
        self.header_lines = n;
        self
    }

    pub fn date_column(mut self, index: usize) -> Self {
        self.date_column = index;
        self
    }

    pub fn description_column(mut self, index: Option<usize>) -> Self {
        self.description_column = index;
        self
    }

    pub fn amount_column(mut self, index: Option<usize>) -> Self {
        self.amount_column = index;
        self
    }

    pub fn currency_column(mut self, index: Option<usize>) -> Self {
        self.currency_column = index;
        self
    }

    pub fn category_column(mut self, index: Option<usize>) -> Self {
        self.category_column = index;
        self
    }

    pub fn note_column(mut self, index: Option<usize>) -> Self {
        self.note_column = index;
        self
    }

    pub fn primary_date_format(mut self, fmt: &str) -> Self {
        self.primary_date_format = fmt.to_string();
        self
    }

    pub fn fallback_date_formats(mut self, formats: &[&str]) -> Self {
        self.fallback_date_formats = formats.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn decimal_separator(mut self, sep: char) -> Self {
        self.amount.decimal_separator = sep;
        self
    }

    pub fn grouping_separator(mut self, sep: Option<char>) -> Self {
        self.amount.grouping_separator = sep;
        self
    }

    pub fn currency_symbols(mut self, symbols: &[&str]) -> Self {
        self.amount.currency_symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn cleanup_pattern(mut self, pattern: Option<&str>) -> Self {
        self.amount.custom_cleanup_pattern = pattern.map(String::from);
        self.amount.compiled = OnceLock::new();
        self
    }

    pub fn expense_from_sign(mut self) -> Self {
        self.expense = ExpenseRule::AmountSign;
        self
    }

    pub fn expense_from_column(mut self, index: usize, true_value: &str) -> Self {
        self.expense = ExpenseRule::Column {
            index,
            true_value: true_value.to_string(),
        };
        self
    }

    pub fn default_currency(mut self, code: &str) -> Self {
        self.default_currency = code.to_string();
        self
    }

    pub fn expected_min_column_count(mut self, n: usize) -> Self {
        self.expected_min_column_count = n;
        self
    }

    pub fn status_filter(mut self, column: usize, valid_values: &[&str], skip_if_invalid: bool) -> Self {
        self.status = Some(StatusFilter {
            column,
            valid_values: valid_values.iter().map(|s| s.to_string()).collect(),
            skip_if_invalid,
        });
        self
    }

    pub fn build(self) -> Result<ColumnMapping> {
        let amount_column = self
            .amount_column
            .ok_or_else(|| ImportError::Config("amount column must be set".into()))?;
        if !(1..=3).contains(&self.expected_min_column_count) {
            return Err(ImportError::Config(format!(
                "expected_min_column_count must be between 1 and 3, got {}",
                self.expected_min_column_count
            )));
        }
        if let Some(status) = &self.status {
            if status.valid_values.is_empty() {
                return Err(ImportError::Config(format!(
                    "status column {} has no valid values",
                    status.column
                )));
            }
        }
        if let ExpenseRule::Column { true_value, .. } = &self.expense {
            if true_value.trim().is_empty() {
                return Err(ImportError::Config(
                    "expense indicator column needs a non-empty true value".into(),
                ));
            }
        }
        if let Some(pattern) = &self.amount.custom_cleanup_pattern {
            Regex::new(pattern)
                .map_err(|e| ImportError::Config(format!("bad cleanup pattern {pattern:?}: {e}")))?;
        }
        if self.amount.decimal_separator.is_ascii_digit()
            || self.amount.grouping_separator == Some(self.amount.decimal_separator)
        {
            return Err(ImportError::Config(
                "decimal and grouping separators must differ and not be digits".into(),
            ));
        }
        let mut date_formats = Vec::with_capacity(self.fallback_date_formats.len() + 1);
        for fmt in std::iter::once(self.primary_date_format).chain(self.fallback_date_formats) {
            if !fmt.trim().is_empty() && !date_formats.contains(&fmt) {
                date_formats.push(fmt);
            }
        }
        if date_formats.is_empty() {
            return Err(ImportError::Config("no date formats configured".into()));
        }
        let default_currency = self.default_currency.trim().to_uppercase();
        if default_currency.is_empty() {
            return Err(ImportError::Config("default currency must be set".into()));
        }

        Ok(ColumnMapping {
            delimiter: self.delimiter,
            header_lines: self.header_lines,
            date_column: self.date_column,
            description_column: self.description_column,
            amount_column,
            currency_column: self.currency_column,
            category_column: self.category_column,
            note_column: self.note_column,
            date_formats,
            amount: self.amount,
            expense: self.expense,
            default_currency,
            expected_min_column_count: self.expected_min_column_count,
            status: self.status,
        })
    }
}

impl TryFrom<MappingBuilder> for ColumnMapping {
    type Error = ImportError;

    fn try_from(builder: MappingBuilder) -> Result<Self> {
        builder.build()
    }
}
