//! Persistence gateways: where accepted records end up.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection};

use crate::error::{ImportError, Result};
use crate::models::Transaction;

/// Storage the engine writes to, one record per call. Implementations
/// synchronize internally and may be shared between concurrent runs.
pub trait PersistenceGateway: Send + Sync {
    /// Stores one record and returns its id.
    fn add_record(&self, record: &Transaction) -> Result<String>;

    fn count_all(&self) -> Result<usize>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| ImportError::Other("store lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    date TEXT NOT NULL,
    title TEXT NOT NULL,
    amount REAL NOT NULL,
    currency TEXT NOT NULL,
    is_expense INTEGER NOT NULL,
    category TEXT NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = get_connection(db_path)?;
        init_db(&conn)?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Per-source totals, most recent first.
    pub fn summary(&self) -> Result<Vec<(String, usize)>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT source, count(*) FROM transactions GROUP BY source ORDER BY max(created_at) DESC, source",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl PersistenceGateway for SqliteStore {
    fn add_record(&self, record: &Transaction) -> Result<String> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO transactions (id, date, title, amount, currency, is_expense, category, note, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.date.to_string(),
                record.title,
                record.amount.amount,
                record.amount.currency,
                record.is_expense,
                record.category,
                record.note,
                record.source,
            ],
        )?;
        Ok(record.id.clone())
    }

    fn count_all(&self) -> Result<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps records in a vector.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Transaction>>,
    #[cfg(test)]
    attempts: Mutex<usize>,
    #[cfg(test)]
    fail_every: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every n-th add.
    #[cfg(test)]
    pub(crate) fn failing_every(n: usize) -> Self {
        Self {
            fail_every: Some(n.max(1)),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Result<Vec<Transaction>> {
        Ok(lock(&self.records)?.clone())
    }

    #[cfg(test)]
    fn reject_injected(&self, record: &Transaction) -> Result<()> {
        let attempt = {
            let mut attempts = lock(&self.attempts)?;
            *attempts += 1;
            *attempts
        };
        if self.fail_every.is_some_and(|n| attempt % n == 0) {
            return Err(ImportError::Other(format!("rejected record {}", record.id)));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn reject_injected(&self, _record: &Transaction) -> Result<()> {
        Ok(())
    }
}

impl PersistenceGateway for MemoryStore {
    fn add_record(&self, record: &Transaction) -> Result<String> {
        self.reject_injected(record)?;
        lock(&self.records)?.push(record.clone());
        Ok(record.id.clone())
    }

    fn count_all(&self) -> Result<usize> {
        Ok(lock(&self.records)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;
    use chrono::NaiveDate;

    fn sample(title: &str, source: &str) -> Transaction {
        Transaction::new(
            Money::new(-350.5, "RUB"),
            "Restaurants".into(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            true,
            String::new(),
            source,
            title.into(),
        )
    }

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, store) = test_store();
        let conn = lock(&store.conn).unwrap();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_add_and_count() {
        let (_dir, store) = test_store();
        let t = sample("Coffee", "Generic CSV");
        let id = store.add_record(&t).unwrap();
        assert_eq!(id, t.id);
        store.add_record(&sample("Tea", "Tinkoff")).unwrap();
        assert_eq!(store.count_all().unwrap(), 2);

        let (date, amount, expense): (String, f64, bool) = lock(&store.conn)
            .unwrap()
            .query_row(
                "SELECT date, amount, is_expense FROM transactions WHERE id = ?1",
                [&t.id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(date, "2024-05-01");
        assert_eq!(amount, 350.5);
        assert!(expense);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let (_dir, store) = test_store();
        let t = sample("Coffee", "Generic CSV");
        store.add_record(&t).unwrap();
        assert!(matches!(store.add_record(&t), Err(ImportError::Db(_))));
        assert_eq!(store.count_all().unwrap(), 1);
    }

    #[test]
    fn test_summary_groups_by_source() {
        let (_dir, store) = test_store();
        store.add_record(&sample("a", "Tinkoff")).unwrap();
        store.add_record(&sample("b", "Tinkoff")).unwrap();
        store.add_record(&sample("c", "Alfa-Bank")).unwrap();
        let mut summary = store.summary().unwrap();
        summary.sort();
        assert_eq!(
            summary,
            vec![("Alfa-Bank".to_string(), 1), ("Tinkoff".to_string(), 2)]
        );
    }

    #[test]
    fn test_memory_store_failure_injection() {
        let store = MemoryStore::failing_every(3);
        for i in 0..6 {
            let _ = store.add_record(&sample(&format!("t{i}"), "x"));
        }
        assert_eq!(store.count_all().unwrap(), 4);
    }
}
