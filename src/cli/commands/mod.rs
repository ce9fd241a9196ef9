//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod extract;
mod init;
mod run;
mod search;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "casewatch")]
#[command(about = "Fraud-case summary extraction and search")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file and CASEWATCH_DATA_DIR)
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory, database and a default config file
    Init,

    /// Fetch every configured source once, extract, tag and store the records
    Run {
        /// Keep records in memory instead of the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Find stored records tagged with any of the given keywords
    Search {
        /// Keywords to look up (e.g. 投資 LINE)
        #[arg(required = true)]
        keywords: Vec<String>,
        /// Maximum number of records to show
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Run the extraction cascade on a saved HTML file and print the records as JSON
    Extract {
        /// Saved page markup
        file: PathBuf,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
    };
    let (settings, config) = load_settings_with_options(options)?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings, &config).await,
        Commands::Run { dry_run } => run::cmd_run(&settings, &config, dry_run).await,
        Commands::Search { keywords, limit } => {
            search::cmd_search(&settings, &config, &keywords, limit).await
        }
        Commands::Extract { file } => extract::cmd_extract(&config, &file).await,
    }
}
