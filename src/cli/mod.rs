pub mod analyze;
pub mod init;
pub mod report;
pub mod rules;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::importer::{import_mortgage, import_transactions};
use crate::models::Period;
use crate::pipeline::{AnalysisResult, Pipeline};
use crate::settings::load_settings;

#[derive(Parser)]
#[command(
    name = "flowbook",
    version,
    about = "Cash-flow analysis for bank exports, with mortgage principal/interest splitting."
)]
pub struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Bank transaction CSV export
    pub transactions: PathBuf,
    /// Mortgage servicer CSV with the monthly principal/interest breakdown
    #[arg(long)]
    pub mortgage: Option<PathBuf>,
    /// Settings file (default: ~/.config/flowbook/settings.json)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis and print the cash-flow summary.
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        /// Only report this month: YYYY-MM
        #[arg(long)]
        month: Option<Period>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every processed entry with its flow type and category.
    Register {
        #[command(flatten)]
        input: InputArgs,
        /// Only list this month: YYYY-MM
        #[arg(long)]
        month: Option<Period>,
    },
    /// List low-confidence categorizations for manual review.
    Flagged {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Show the effective pattern table, custom rules and aliases.
    Rules {
        /// Settings file (default: ~/.config/flowbook/settings.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write a settings file with default values.
    Init {
        /// Where to write it (default: ~/.config/flowbook/settings.json)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Load settings and inputs, then run the pipeline.
pub(crate) fn run_pipeline(input: &InputArgs) -> anyhow::Result<AnalysisResult> {
    let settings = load_settings(input.config.as_deref()).context("loading settings")?;
    let batch = import_transactions(&input.transactions)
        .with_context(|| format!("reading {}", input.transactions.display()))?;
    let mortgage = input
        .mortgage
        .as_deref()
        .map(|path| {
            import_mortgage(path).with_context(|| format!("reading {}", path.display()))
        })
        .transpose()?;
    let pipeline = Pipeline::new(&settings).context("building pattern table")?;
    Ok(pipeline.run(batch, mortgage)?)
}
