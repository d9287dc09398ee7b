use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use finimport::settings::load_settings;
use finimport::{FormatSelector, ImportResult, Importer, NoProgress};

use super::open_store;

pub fn run(file: &str, format: Option<&str>, db: Option<&str>) -> Result<()> {
    let settings = load_settings();
    let file_path = PathBuf::from(file);
    let selector = FormatSelector::with_defaults(&settings).context("loading statement formats")?;
    let handler = selector.resolve(&file_path, format)?;
    let store = Arc::new(open_store(&settings, db)?);

    let importer = Importer::new(handler, store);
    println!(
        "Importing {} as {}",
        file_path.display(),
        importer.handler().bank_name().bold()
    );

    for event in importer.import(&file_path, NoProgress) {
        match event {
            ImportResult::Progress { current, total, message } => {
                eprintln!("[{current:>3}/{total}] {message}");
            }
            ImportResult::Success {
                imported_count,
                skipped_count,
                bank_name,
                message,
            } => {
                println!(
                    "{} {imported_count} imported, {skipped_count} skipped ({bank_name})",
                    "Done:".green().bold()
                );
                if !message.is_empty() {
                    println!("{} {message}", "Warning:".yellow().bold());
                }
                return Ok(());
            }
            ImportResult::Error { message, cause } => match cause {
                Some(cause) => return Err(anyhow::Error::new(cause).context(message)),
                None => bail!(message),
            },
        }
    }
    bail!("import stopped without a result")
}
