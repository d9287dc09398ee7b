use chrono::{NaiveDate, NaiveDateTime};

use crate::mapping::AmountRules;

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Formats tried after the configured primary format, in order.
pub const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d_%H-%M-%S",
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%d.%m.%Y %H:%M:%S",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m.%d.%Y",
];

/// First format that parses wins. Time components are dropped, and text
/// after a complete date (a time of day, say) is tolerated.
pub fn parse_date<S: AsRef<str>>(raw: &str, formats: &[S]) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|fmt| parse_date_with(raw, fmt.as_ref()))
}

fn parse_date_with(raw: &str, fmt: &str) -> Option<NaiveDate> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
        return Some(dt.date());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
        return Some(d);
    }
    match NaiveDate::parse_and_remainder(raw, fmt) {
        Ok((d, rest)) if rest.starts_with(|c: char| c.is_whitespace() || c == 'T') => Some(d),
        _ => None,
    }
}

/// Cheap check used to recover from a misconfigured date column: a date has
/// a separator, at least four digits, and is not just a number.
pub fn looks_like_date(value: &str) -> bool {
    let value = value.trim();
    let has_separator = value.contains(['-', '/', '.']);
    let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
    has_separator && digits >= 4 && !is_plain_number(value)
}

fn is_plain_number(value: &str) -> bool {
    let compact: String = value.chars().filter(|c| *c != ',' && *c != ' ').collect();
    !compact.is_empty() && compact.parse::<f64>().is_ok()
}

/// Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug).
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::try_days(serial.trunc() as i64)?)
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Strips currency symbols, grouping separators and noise, normalizes the
/// decimal separator to `.`, and keeps the sign of the raw value.
pub fn clean_amount(raw: &str, rules: &AmountRules) -> String {
    let mut s = raw.trim().to_string();

    let parenthesised = s.starts_with('(') && s.ends_with(')');
    let negative = parenthesised || s.contains('-') || s.contains('\u{2212}');

    for symbol in &rules.currency_symbols {
        if !symbol.is_empty() {
            s = s.replace(symbol.as_str(), "");
        }
    }
    if let Some(sep) = rules.grouping_separator {
        s = s.replace(sep, "");
    }
    s = match rules.cleanup_regex() {
        Some(re) => re.replace_all(&s, "").into_owned(),
        None => s
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
            .collect(),
    };
    s.retain(|c| !c.is_whitespace() && c != '-');

    let mut s = normalize_separators(&s, rules.decimal_separator, rules.grouping_separator);
    if negative && !s.is_empty() {
        s.insert(0, '-');
    }
    s
}

fn normalize_separators(s: &str, decimal: char, grouping: Option<char>) -> String {
    if grouping.is_some() || !matches!(decimal, '.' | ',') {
        return s.replace(decimal, ".");
    }
    let other = if decimal == '.' { ',' } else { '.' };
    match (s.rfind(decimal), s.rfind(other)) {
        (Some(d), Some(o)) if o > d => {
            // Separators are swapped relative to the configuration.
            s.replace(decimal, "").replace(other, ".")
        }
        (Some(_), Some(_)) => s.replace(other, "").replace(decimal, "."),
        (Some(_), None) => s.replace(decimal, "."),
        (None, Some(o)) => {
            let tail = &s[o + other.len_utf8()..];
            let single = s.matches(other).count() == 1;
            if single && (1..=2).contains(&tail.len()) {
                s.replace(other, ".")
            } else {
                s.replace(other, "")
            }
        }
        (None, None) => s.to_string(),
    }
}

/// Cleans and parses an amount. `None` when nothing numeric is left.
pub fn parse_amount(raw: &str, rules: &AmountRules) -> Option<f64> {
    let cleaned = clean_amount(raw, rules);
    let value = cleaned.parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

/// ISO code from a currency cell, accepting common symbols. Anything
/// unrecognized yields `default`.
pub fn currency_code(raw: Option<&str>, default: &str) -> String {
    let raw = raw.map(str::trim).unwrap_or_default();
    let code = match raw.to_lowercase().as_str() {
        "₽" | "руб" | "руб." | "р." | "rur" => "RUB",
        "$" => "USD",
        "€" => "EUR",
        "£" => "GBP",
        "¥" => "CNY",
        _ => "",
    };
    if !code.is_empty() {
        return code.to_string();
    }
    if raw.len() == 3 && raw.chars().all(|c| c.is_ascii_alphabetic()) {
        return raw.to_ascii_uppercase();
    }
    default.to_string()
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Probe order: configured delimiter, comma, semicolon, tab, then the
/// configured one again as the default.
pub fn detect_delimiter(line: &str, configured: char) -> char {
    [configured, ',', ';', '\t']
        .into_iter()
        .find(|d| line.contains(*d))
        .unwrap_or(configured)
}

/// Splits one line into trimmed, unquoted fields. Quoted fields may contain
/// the delimiter (`"2,000.00"`).
pub fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    if delimiter.is_ascii() {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter as u8)
            .from_reader(line.as_bytes());
        if let Some(Ok(record)) = rdr.records().next() {
            return record.iter().map(unquote).collect();
        }
    }
    line.split(delimiter).map(unquote).collect()
}

fn unquote(field: &str) -> String {
    let f = field.trim();
    f.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(f)
        .trim()
        .to_string()
}
