//! Handler registry. Probed in registration order, so specific handlers are
//! registered before the generic fallbacks.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::banks;
use crate::categorizer::Categorizer;
use crate::csv_handler::{ContentSniff, CsvProfile, GenericCsvHandler};
use crate::error::{ImportError, Result};
use crate::handler::FormatHandler;
use crate::mapping::ColumnMapping;
use crate::models::FileType;
use crate::settings::{FormatProfile, Settings};
#[cfg(feature = "spreadsheet")]
use crate::spreadsheet::{SpreadsheetHandler, SpreadsheetProfile};

#[derive(Default)]
pub struct FormatSelector {
    handlers: Vec<Arc<dyn FormatHandler>>,
}

impl FormatSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in bank handlers, then the user's profiles, then the generic
    /// CSV and spreadsheet handlers.
    pub fn with_defaults(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let categorizer = settings.categorizer();
        let mut selector = Self::new();

        selector.register(Arc::new(banks::tinkoff(categorizer.clone())?));
        #[cfg(feature = "spreadsheet")]
        selector.register(Arc::new(banks::alfa(categorizer.clone())?));

        for profile in &settings.profiles {
            selector.register(profile_handler(profile, categorizer.clone())?);
        }

        let generic = ColumnMapping::builder()
            .default_currency(&settings.default_currency)
            .build()?;
        selector.register(Arc::new(GenericCsvHandler::new(
            CsvProfile::generic(generic.clone()),
            categorizer.clone(),
        )));
        #[cfg(feature = "spreadsheet")]
        selector.register(Arc::new(SpreadsheetHandler::new(
            SpreadsheetProfile::generic(generic),
            categorizer,
        )));
        Ok(selector)
    }

    pub fn register(&mut self, handler: Arc<dyn FormatHandler>) {
        debug!(
            key = handler.key(),
            bank = handler.bank_name(),
            file_type = %handler.file_type(),
            position = self.handlers.len(),
            "handler registered"
        );
        self.handlers.push(handler);
    }

    pub fn handlers(&self) -> &[Arc<dyn FormatHandler>] {
        &self.handlers
    }

    /// First handler that accepts the file.
    pub fn select(&self, path: &Path) -> Option<Arc<dyn FormatHandler>> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_type = FileType::from_path(path);
        let found = self
            .handlers
            .iter()
            .find(|h| h.can_handle(&file_name, path, file_type))
            .cloned();
        match &found {
            Some(h) => info!(file_name = %file_name, %file_type, key = h.key(), bank = h.bank_name(), "handler selected"),
            None => info!(file_name = %file_name, %file_type, "no handler accepts file"),
        }
        found
    }

    pub fn by_key(&self, key: &str) -> Result<Arc<dyn FormatHandler>> {
        self.handlers
            .iter()
            .find(|h| h.key() == key)
            .cloned()
            .ok_or_else(|| ImportError::UnknownFormat(key.to_string()))
    }

    /// An explicit key wins over detection.
    pub fn resolve(&self, path: &Path, key: Option<&str>) -> Result<Arc<dyn FormatHandler>> {
        match key {
            Some(key) => {
                let handler = self.by_key(key)?;
                info!(key, file = %path.display(), "format chosen explicitly");
                Ok(handler)
            }
            None => self
                .select(path)
                .ok_or_else(|| ImportError::NoHandler(path.display().to_string())),
        }
    }
}

/// Handler for a user-defined profile. The mapping is validated here.
pub fn profile_handler(profile: &FormatProfile, categorizer: Categorizer) -> Result<Arc<dyn FormatHandler>> {
    let mapping = profile.mapping.clone().build().map_err(|e| {
        ImportError::Settings(format!("profile {:?}: {e}", profile.key))
    })?;
    match profile.file_type {
        FileType::Csv => {
            let sniff = if profile.header_markers.is_empty() {
                ContentSniff::None
            } else {
                ContentSniff::HeaderMarkers(profile.header_markers.clone())
            };
            Ok(Arc::new(GenericCsvHandler::new(
                CsvProfile {
                    key: profile.key.clone(),
                    bank_name: profile.bank_name.clone(),
                    keywords: profile.keywords.clone(),
                    negative_keywords: profile.negative_keywords.clone(),
                    sniff,
                    mapping,
                },
                categorizer,
            )))
        }
        #[cfg(feature = "spreadsheet")]
        FileType::Spreadsheet => Ok(Arc::new(SpreadsheetHandler::new(
            SpreadsheetProfile {
                key: profile.key.clone(),
                bank_name: profile.bank_name.clone(),
                keywords: profile.keywords.clone(),
                negative_keywords: profile.negative_keywords.clone(),
                accept_any: false,
                sheet: profile.sheet.clone(),
                header_rows: mapping.header_lines(),
                skip_empty_rows: true,
                header_detection: None,
                mapping,
            },
            categorizer,
        ))),
        other => Err(ImportError::Settings(format!(
            "profile {:?}: unsupported file type {other}",
            profile.key
        ))),
    }
}
