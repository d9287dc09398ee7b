use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Invalid column mapping: {0}")]
    Config(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("No handler for file: {0}")]
    NoHandler(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Line {line}: {reason}")]
    Line { line: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl ImportError {
    pub fn line(line: &str, reason: impl Into<String>) -> Self {
        Self::Line {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "spreadsheet")]
impl From<calamine::Error> for ImportError {
    fn from(e: calamine::Error) -> Self {
        Self::Spreadsheet(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
