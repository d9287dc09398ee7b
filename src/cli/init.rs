use std::path::PathBuf;

use anyhow::Result;

use finimport::settings::{load_settings, save_settings, settings_path, shellexpand_path};
use finimport::SqliteStore;

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings();
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }
    save_settings(&settings)?;

    let resolved = PathBuf::from(shellexpand_path(&settings.data_dir));
    std::fs::create_dir_all(&resolved)?;
    SqliteStore::open(&settings.db_path())?;

    println!("Initialized finimport at {}", resolved.display());
    println!("Settings: {}", settings_path().display());
    Ok(())
}
