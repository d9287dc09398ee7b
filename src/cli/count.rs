use anyhow::Result;
use comfy_table::{Cell, Table};
use colored::Colorize;

use finimport::settings::load_settings;
use finimport::PersistenceGateway;

use super::open_store;

pub fn run(db: Option<&str>) -> Result<()> {
    let settings = load_settings();
    let store = open_store(&settings, db)?;

    let mut table = Table::new();
    table.set_header(vec!["Source", "Transactions"]);
    for (source, count) in store.summary()? {
        table.add_row(vec![Cell::new(source), Cell::new(count)]);
    }
    table.add_row(vec![Cell::new("Total".bold()), Cell::new(store.count_all()?)]);
    println!("{table}");
    Ok(())
}
