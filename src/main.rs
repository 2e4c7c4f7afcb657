mod aggregator;
mod balance;
mod categorizer;
mod classifier;
mod cli;
mod error;
mod fmt;
mod importer;
mod models;
mod mortgage;
mod patterns;
mod pipeline;
mod settings;
mod validator;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Analyze { input, month, json } => cli::analyze::run(&input, month, json),
        Commands::Register { input, month } => cli::analyze::register(&input, month),
        Commands::Flagged { input } => cli::analyze::flagged(&input),
        Commands::Rules { config } => cli::rules::list(config.as_deref()),
        Commands::Init { path, force } => cli::init::run(path, force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
