use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::categorizer::{CategoryRule, Categorizer};
use crate::error::{ImportError, Result};
use crate::mapping::MappingBuilder;
use crate::models::FileType;
#[cfg(feature = "spreadsheet")]
use crate::spreadsheet::SheetSelector;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir_string")]
    pub data_dir: String,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// `tracing` filter directive, e.g. `finimport=debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub profiles: Vec<FormatProfile>,
    /// Replaces the built-in category rules when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_rules: Option<Vec<CategoryRule>>,
}

/// A user-defined statement layout, registered as its own handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatProfile {
    pub key: String,
    pub bank_name: String,
    #[serde(default = "default_file_type")]
    pub file_type: FileType,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub negative_keywords: Vec<String>,
    /// CSV only: header cells that identify the layout when the file name
    /// doesn't.
    #[serde(default)]
    pub header_markers: Vec<String>,
    #[cfg(feature = "spreadsheet")]
    #[serde(default)]
    pub sheet: SheetSelector,
    #[serde(default)]
    pub mapping: MappingBuilder,
}

fn default_currency() -> String {
    "RUB".to_string()
}

fn default_file_type() -> FileType {
    FileType::Csv
}

fn default_data_dir_string() -> String {
    default_data_dir().to_string_lossy().to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir_string(),
            default_currency: default_currency(),
            log_filter: None,
            profiles: Vec::new(),
            category_rules: None,
        }
    }
}

impl Settings {
    pub fn categorizer(&self) -> Categorizer {
        match &self.category_rules {
            Some(rules) => Categorizer::new(rules.clone()),
            None => Categorizer::default(),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.data_dir)).join("finimport.db")
    }

    /// Rejects profiles that could never be registered.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for profile in &self.profiles {
            if profile.key.trim().is_empty() {
                return Err(ImportError::Settings("profile with empty key".into()));
            }
            if !seen.insert(profile.key.as_str()) {
                return Err(ImportError::Settings(format!("duplicate profile key {:?}", profile.key)));
            }
            if profile.file_type == FileType::Unknown {
                return Err(ImportError::Settings(format!(
                    "profile {:?} must be csv or spreadsheet",
                    profile.key
                )));
            }
        }
        Ok(())
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("finimport")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("finimport")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Missing file gives defaults. An unreadable or malformed file also gives
/// defaults, with a warning.
pub fn load_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
    match parsed {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            Settings::default()
        }
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ImportError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
