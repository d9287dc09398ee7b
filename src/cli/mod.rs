pub mod count;
pub mod formats;
pub mod import;
pub mod init;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use finimport::settings::{shellexpand_path, Settings};
use finimport::SqliteStore;

#[derive(Parser)]
#[command(name = "finimport", about = "Import bank statement exports (CSV, XLSX) into a local database.")]
pub struct Cli {
    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and create the database.
    Init {
        /// Path for finimport data (default: ~/Documents/finimport)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a statement file.
    Import {
        /// Path to a CSV or spreadsheet export
        file: String,
        /// Format key, skipping detection (see `finimport formats`)
        #[arg(long)]
        format: Option<String>,
        /// Database file (default: <data_dir>/finimport.db)
        #[arg(long)]
        db: Option<String>,
    },
    /// List the registered statement formats in detection order.
    Formats,
    /// Show how many transactions are stored, per source.
    Count {
        /// Database file (default: <data_dir>/finimport.db)
        #[arg(long)]
        db: Option<String>,
    },
}

pub(crate) fn open_store(settings: &Settings, db: Option<&str>) -> Result<SqliteStore> {
    let path = match db {
        Some(p) => PathBuf::from(shellexpand_path(p)),
        None => settings.db_path(),
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    SqliteStore::open(&path).with_context(|| format!("opening database {}", path.display()))
}
