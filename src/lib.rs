//! Bank statement import: format detection, line-by-line parsing into
//! normalized transactions, progress reporting, and persistence.

pub mod banks;
pub mod categorizer;
pub mod csv_handler;
pub mod engine;
pub mod error;
pub mod handler;
pub mod mapping;
pub mod models;
pub mod parsing;
pub mod selector;
pub mod settings;
pub mod source;
#[cfg(feature = "spreadsheet")]
pub mod spreadsheet;
pub mod store;

pub use engine::{CancelToken, ImportStream, Importer, NoProgress, ProgressCallback};
pub use error::{ImportError, Result};
pub use handler::FormatHandler;
pub use mapping::ColumnMapping;
pub use models::{FileType, ImportResult, Money, Transaction};
pub use selector::FormatSelector;
pub use store::{MemoryStore, PersistenceGateway, SqliteStore};
