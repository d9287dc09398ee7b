//! Bank-specific handlers. Each is a configured generic handler: a column
//! mapping plus the keywords that recognize the bank's exports.

use crate::categorizer::Categorizer;
use crate::csv_handler::{ContentSniff, CsvProfile, GenericCsvHandler};
use crate::error::Result;
use crate::mapping::ColumnMapping;
#[cfg(feature = "spreadsheet")]
use crate::spreadsheet::{HeaderDetection, SheetSelector, SpreadsheetHandler, SpreadsheetProfile};

const RUB_SYMBOLS: &[&str] = &["₽", "руб.", "руб", "RUB"];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Tinkoff (CSV)
// ---------------------------------------------------------------------------

/// `Дата операции;Дата платежа;Номер карты;Статус;Сумма операции;Валюта
/// операции;...;Категория;MCC;Описание;...`
pub fn tinkoff_mapping() -> Result<ColumnMapping> {
    ColumnMapping::builder()
        .delimiter(';')
        .header_lines(1)
        .date_column(0)
        .primary_date_format("%d.%m.%Y %H:%M:%S")
        .status_filter(3, &["OK"], true)
        .amount_column(Some(4))
        .currency_column(Some(5))
        .category_column(Some(9))
        .description_column(Some(11))
        .decimal_separator(',')
        .grouping_separator(Some(' '))
        .currency_symbols(RUB_SYMBOLS)
        .default_currency("RUB")
        .build()
}

pub fn tinkoff(categorizer: Categorizer) -> Result<GenericCsvHandler> {
    let profile = CsvProfile {
        key: "tinkoff".to_string(),
        bank_name: "Tinkoff".to_string(),
        keywords: strings(&["tinkoff", "тинькофф", "tbank", "т-банк"]),
        negative_keywords: strings(&["sber", "сбер", "alfa", "альфа", "ozon", "озон"]),
        sniff: ContentSniff::HeaderMarkers(strings(&["Дата операции", "Статус", "Сумма операции"])),
        mapping: tinkoff_mapping()?,
    };
    Ok(GenericCsvHandler::new(profile, categorizer))
}

// ---------------------------------------------------------------------------
// Alfa-Bank (spreadsheet)
// ---------------------------------------------------------------------------

/// Header rows are located by keyword, so the mapping addresses the
/// projected columns: date, description, amount, category.
#[cfg(feature = "spreadsheet")]
pub fn alfa_mapping() -> Result<ColumnMapping> {
    ColumnMapping::builder()
        .date_column(0)
        .description_column(Some(1))
        .amount_column(Some(2))
        .category_column(Some(3))
        .currency_column(None)
        .primary_date_format("%d.%m.%Y")
        .decimal_separator(',')
        .grouping_separator(Some(' '))
        .currency_symbols(RUB_SYMBOLS)
        .default_currency("RUB")
        .build()
}

#[cfg(feature = "spreadsheet")]
pub fn alfa(categorizer: Categorizer) -> Result<SpreadsheetHandler> {
    let mapping = alfa_mapping()?;
    let profile = SpreadsheetProfile {
        key: "alfabank".to_string(),
        bank_name: "Alfa-Bank".to_string(),
        keywords: strings(&["alfabank", "альфабанк", "альфа-банк", "alfa"]),
        negative_keywords: strings(&[
            "sberbank", "сбербанк", "сбер", "sber", "тинькофф", "tinkoff", "ozon", "озон",
        ]),
        accept_any: false,
        sheet: SheetSelector::Index(0),
        header_rows: 1,
        skip_empty_rows: true,
        header_detection: Some(HeaderDetection {
            scan_rows: 30,
            date_keywords: strings(&["дата", "date"]),
            amount_keywords: strings(&["сумма", "amount"]),
            description_keywords: strings(&["описание", "примечание", "назначение", "description"]),
            category_keywords: strings(&["категория", "category"]),
        }),
        mapping,
    };
    Ok(SpreadsheetHandler::new(profile, categorizer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FormatHandler;
    use crate::models::FileType;
    use chrono::NaiveDate;
    use std::path::Path;

    const TINKOFF_HEADER: &str = "\"Дата операции\";\"Дата платежа\";\"Номер карты\";\"Статус\";\"Сумма операции\";\"Валюта операции\";\"Сумма платежа\";\"Валюта платежа\";\"Кэшбэк\";\"Категория\";\"MCC\";\"Описание\"";

    #[test]
    fn test_tinkoff_line() {
        let h = tinkoff(Categorizer::default()).unwrap();
        let line = "\"01.05.2024 12:30:00\";\"02.05.2024\";\"*1234\";\"OK\";\"-1 250,50\";\"RUB\";\"-1 250,50\";\"RUB\";\"\";\"Супермаркеты\";\"5411\";\"Пятерочка\"";
        let t = h.parse_line(line).unwrap().unwrap();
        assert_eq!(t.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(t.amount.amount, 1250.50);
        assert_eq!(t.amount.currency, "RUB");
        assert_eq!(t.category, "Супермаркеты");
        assert_eq!(t.title, "Пятерочка");
        assert_eq!(t.source, "Tinkoff");
        assert!(t.is_expense);
    }

    #[test]
    fn test_tinkoff_failed_status_is_skipped() {
        let h = tinkoff(Categorizer::default()).unwrap();
        let line = "\"01.05.2024 12:30:00\";\"\";\"*1234\";\"FAILED\";\"-100,00\";\"RUB\";\"\";\"\";\"\";\"\";\"\";\"Кафе\"";
        assert!(h.parse_line(line).unwrap().is_none());
    }

    #[test]
    fn test_tinkoff_selection() {
        let h = tinkoff(Categorizer::default()).unwrap();
        let path = Path::new("tinkoff_may.csv");
        assert!(h.can_handle("tinkoff_may.csv", path, FileType::Csv));
        assert!(!h.can_handle("tinkoff_may.xlsx", path, FileType::Spreadsheet));
    }

    #[test]
    fn test_tinkoff_sniffs_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operations.csv");
        std::fs::write(&path, format!("{TINKOFF_HEADER}\n")).unwrap();
        let h = tinkoff(Categorizer::default()).unwrap();
        assert!(h.can_handle("operations.csv", &path, FileType::Csv));

        let other = dir.path().join("other.csv");
        std::fs::write(&other, "Date,Description,Amount\n").unwrap();
        assert!(!h.can_handle("other.csv", &other, FileType::Csv));
    }

    #[cfg(feature = "spreadsheet")]
    #[test]
    fn test_alfa_rejects_other_banks() {
        let h = alfa(Categorizer::default()).unwrap();
        let path = Path::new("x.xlsx");
        assert!(h.can_handle("alfabank_statement.xlsx", path, FileType::Spreadsheet));
        assert!(h.can_handle("Альфа-Банк выписка.xlsx", path, FileType::Spreadsheet));
        assert!(!h.can_handle("sberbank_statement.xlsx", path, FileType::Spreadsheet));
        assert!(!h.can_handle("Выписка.xlsx", path, FileType::Spreadsheet));
        assert!(!h.can_handle("book1.xlsx", path, FileType::Spreadsheet));
        assert!(!h.can_handle("alfabank.csv", path, FileType::Csv));
    }

    #[cfg(feature = "spreadsheet")]
    #[test]
    fn test_alfa_projected_line() {
        let h = alfa(Categorizer::default()).unwrap();
        let t = h
            .parse_line("01.05.2024\tОплата в кафе\t-2 500,00\tРестораны")
            .unwrap()
            .unwrap();
        assert_eq!(t.amount.amount, 2500.0);
        assert_eq!(t.amount.currency, "RUB");
        assert_eq!(t.category, "Рестораны");
        assert_eq!(t.source, "Alfa-Bank");
        assert!(t.is_expense);
    }
}
