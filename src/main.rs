mod cli;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};
use finimport::settings::load_settings;

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "finimport=debug".to_string()
    } else {
        load_settings()
            .log_filter
            .unwrap_or_else(|| "finimport=info".to_string())
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { file, format, db } => cli::import::run(&file, format.as_deref(), db.as_deref()),
        Commands::Formats => cli::formats::run(),
        Commands::Count { db } => cli::count::run(db.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}
