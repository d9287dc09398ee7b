//! The contract every statement format implements.

use std::path::Path;

use crate::engine::ProgressCallback;
use crate::error::Result;
use crate::models::{FileType, Transaction};
use crate::source::LineSource;

/// Bank- or format-specific knowledge: recognition, header skipping, and
/// per-line parsing. Implementations hold configuration only and may be
/// shared between concurrent runs.
pub trait FormatHandler: Send + Sync {
    /// Stable lookup key, e.g. `generic_csv`.
    fn key(&self) -> &str;

    /// Used as the record `source` and in messages.
    fn bank_name(&self) -> &str;

    fn file_type(&self) -> FileType;

    fn file_name_keywords(&self) -> &[String];

    /// File names mentioning any of these belong to another bank.
    fn negative_keywords(&self) -> &[String] {
        &[]
    }

    fn can_handle(&self, file_name: &str, _path: &Path, file_type: FileType) -> bool {
        matches_file_name(self, file_name, file_type)
    }

    /// Turns the file into the line stream the rest of the contract reads.
    fn open_source(&self, path: &Path, _progress: &mut dyn ProgressCallback) -> Result<LineSource> {
        Ok(LineSource::open(path)?)
    }

    /// Must only peek: lines inspected here are still available afterwards.
    fn is_valid_format(&self, source: &mut LineSource) -> bool;

    fn skip_headers(&self, source: &mut LineSource) -> Result<()>;

    fn should_skip_line(&self, line: &str) -> bool {
        line.trim().is_empty()
    }

    /// `Ok(None)` when the line is not a transaction; `Err` when it is
    /// malformed. Either way the engine skips it and carries on.
    fn parse_line(&self, line: &str) -> Result<Option<Transaction>>;
}

/// Default selection heuristic: right file type, a keyword in the file
/// name, and no keyword of another bank.
pub fn matches_file_name<H: FormatHandler + ?Sized>(
    handler: &H,
    file_name: &str,
    file_type: FileType,
) -> bool {
    if file_type != handler.file_type() {
        return false;
    }
    let name = file_name.to_lowercase();
    if handler
        .negative_keywords()
        .iter()
        .any(|k| name.contains(&k.to_lowercase()))
    {
        tracing::debug!(bank = handler.bank_name(), file_name, "file names another bank");
        return false;
    }
    handler
        .file_name_keywords()
        .iter()
        .any(|k| name.contains(&k.to_lowercase()))
}
