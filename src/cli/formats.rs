use anyhow::Result;
use comfy_table::Table;

use finimport::settings::load_settings;
use finimport::FormatSelector;

pub fn run() -> Result<()> {
    let selector = FormatSelector::with_defaults(&load_settings())?;
    let mut table = Table::new();
    table.set_header(vec!["Key", "Bank", "Type", "File name keywords"]);
    for handler in selector.handlers() {
        table.add_row(vec![
            handler.key().to_string(),
            handler.bank_name().to_string(),
            handler.file_type().to_string(),
            handler.file_name_keywords().join(", "),
        ]);
    }
    println!("{table}");
    Ok(())
}
