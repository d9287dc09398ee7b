use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use finimport::settings::Settings;
use finimport::{
    FormatSelector, ImportResult, Importer, MemoryStore, NoProgress, PersistenceGateway,
    SqliteStore, Transaction,
};

fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn selector() -> FormatSelector {
    FormatSelector::with_defaults(&Settings::default()).unwrap()
}

fn import_into(store: Arc<dyn PersistenceGateway>, path: &Path) -> Vec<ImportResult> {
    let handler = selector().select(path).expect("a handler for the file");
    Importer::new(handler, store).import(path, NoProgress).collect()
}

fn success_counts(events: &[ImportResult]) -> (usize, usize) {
    match events.last() {
        Some(ImportResult::Success {
            imported_count,
            skipped_count,
            ..
        }) => (*imported_count, *skipped_count),
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn csv_round_trip_into_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "export.csv",
        b"Date,Description,Amount,Currency\n2024-05-01,Coffee shop,-350.50,RUB\n",
    );
    let store = Arc::new(SqliteStore::open(&dir.path().join("test.db")).unwrap());
    let events = import_into(store.clone(), &path);

    assert_eq!(success_counts(&events), (1, 0));
    assert_eq!(store.count_all().unwrap(), 1);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[test]
fn tinkoff_export_with_bom_and_crlf() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = "\u{feff}\"Дата операции\";\"Дата платежа\";\"Номер карты\";\"Статус\";\"Сумма операции\";\"Валюта операции\";\"Сумма платежа\";\"Валюта платежа\";\"Кэшбэк\";\"Категория\";\"MCC\";\"Описание\"\r\n".to_string();
    body.push_str("\"01.05.2024 12:30:00\";\"02.05.2024\";\"*1234\";\"OK\";\"-1 250,50\";\"RUB\";\"-1 250,50\";\"RUB\";\"\";\"Супермаркеты\";\"5411\";\"Пятерочка\"\r\n");
    body.push_str("\"02.05.2024 09:00:00\";\"02.05.2024\";\"*1234\";\"FAILED\";\"-99,00\";\"RUB\";\"-99,00\";\"RUB\";\"\";\"Кафе\";\"5814\";\"Кофейня\"\r\n");
    body.push_str("\"03.05.2024 10:15:00\";\"03.05.2024\";\"*1234\";\"OK\";\"50 000,00\";\"RUB\";\"50 000,00\";\"RUB\";\"\";\"\";\"\";\"Зарплата\"\r\n");
    let path = write(dir.path(), "tinkoff_may.csv", body.as_bytes());

    let store = Arc::new(MemoryStore::new());
    let events = import_into(store.clone(), &path);
    assert_eq!(success_counts(&events), (2, 1));

    let records = store.records().unwrap();
    assert_eq!(records[0].title, "Пятерочка");
    assert_eq!(records[0].amount.amount, 1250.5);
    assert!(records[0].is_expense);
    assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
    assert_eq!(records[1].amount.amount, 50000.0);
    assert!(!records[1].is_expense);
    assert_eq!(records[1].category, "Salary");
    assert!(records.iter().all(|r| r.source == "Tinkoff"));
}

#[test]
fn semicolon_file_through_generic_handler() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "transactions.csv",
        b"Date;Description;Amount;Currency\n2024-05-01;Coffee shop;-350.50;RUB\n2024-05-02;Book;-12.00;EUR\n",
    );
    let store = Arc::new(MemoryStore::new());
    let events = import_into(store.clone(), &path);
    assert_eq!(success_counts(&events), (2, 0));
    assert_eq!(store.records().unwrap()[1].amount.currency, "EUR");
}

#[test]
fn imported_plus_skipped_covers_every_data_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::from("Date,Description,Amount,Currency\n");
    let mut data_lines = 0;
    for i in 0..40 {
        if i % 7 == 0 {
            body.push('\n');
            continue;
        }
        if i % 5 == 0 {
            body.push_str(&format!("2024-05-01,Broken {i},n/a,RUB\n"));
        } else {
            body.push_str(&format!("2024-05-01,Item {i},-{i}.25,RUB\n"));
        }
        data_lines += 1;
    }
    let path = write(dir.path(), "export.csv", body.as_bytes());
    let events = import_into(Arc::new(MemoryStore::new()), &path);
    let (imported, skipped) = success_counts(&events);
    assert_eq!(imported + skipped, data_lines);
    assert!(skipped > 0);
}

#[test]
fn progress_never_goes_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::from("Date,Description,Amount,Currency\n");
    for i in 0..250 {
        body.push_str(&format!("2024-05-01,Item {i},-1.00,RUB\n"));
    }
    let path = write(dir.path(), "export.csv", body.as_bytes());
    let events = import_into(Arc::new(MemoryStore::new()), &path);

    let mut last = 0;
    for event in &events[..events.len() - 1] {
        match event {
            ImportResult::Progress { current, .. } => {
                assert!(*current >= last);
                last = *current;
            }
            other => panic!("terminal event before the end: {other:?}"),
        }
    }
    assert!(events.last().unwrap().is_terminal());
}

#[test]
fn format_mismatch_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "export.csv", b"just a note\nanother line\n");
    let store = Arc::new(MemoryStore::new());
    let events = import_into(store.clone(), &path);
    assert!(matches!(events.last(), Some(ImportResult::Error { .. })));
    assert_eq!(store.count_all().unwrap(), 0);
}

#[test]
fn reimport_yields_the_same_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "export.csv",
        b"Date,Description,Amount,Currency\n2024-05-01,Coffee shop,-350.50,RUB\n2024-05-03,Refund,(20.00),USD\n",
    );
    let first = Arc::new(MemoryStore::new());
    let second = Arc::new(MemoryStore::new());
    import_into(first.clone(), &path);
    import_into(second.clone(), &path);

    let strip = |records: Vec<Transaction>| -> Vec<Transaction> {
        records
            .into_iter()
            .map(|r| Transaction { id: String::new(), ..r })
            .collect()
    };
    let a = strip(first.records().unwrap());
    assert_eq!(a, strip(second.records().unwrap()));
    assert!(a[1].is_expense);
    assert_eq!(a[1].amount.amount, 20.0);
}

#[test]
fn cancelled_stream_still_terminates_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::from("Date,Description,Amount,Currency\n");
    for i in 0..5000 {
        body.push_str(&format!("2024-05-01,Item {i},-1.00,RUB\n"));
    }
    let path = write(dir.path(), "export.csv", body.as_bytes());
    let store = Arc::new(MemoryStore::new());
    let handler = selector().select(&path).unwrap();
    let stream = Importer::new(handler, store.clone()).import(&path, NoProgress);
    stream.cancel();
    let events: Vec<_> = stream.collect();

    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    match events.last().unwrap() {
        ImportResult::Error { message, .. } => assert!(message.starts_with("import cancelled")),
        ImportResult::Success { imported_count, .. } => assert_eq!(*imported_count, 5000),
        other => panic!("unexpected terminal event: {other:?}"),
    }
    assert!(store.count_all().unwrap() <= 5000);
}
