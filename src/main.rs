//! ml-harvester - Mercado Livre listing harvester CLI
//!
//! Searches the marketplace in a headless browser and classifies what it finds.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ml_harvester::commands::{ClassifyCommand, SearchCommand};
use ml_harvester::config::{Config, OutputFormat};
use ml_harvester::marketplace::MaxPages;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ml-harvester",
    version,
    about = "Mercado Livre listing harvester",
    long_about = "Harvests enteral-feeding product listings from Mercado Livre and classifies them by product type."
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (defaults to the configured one)
    #[arg(short, long, global = true)]
    format: Option<OutputFormat>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search listings for one or more terms
    #[command(alias = "s")]
    Search {
        /// Search terms (defaults to the configured terms)
        terms: Vec<String>,

        /// Result pages per term: a number or "all"
        #[arg(short, long)]
        max_pages: Option<MaxPages>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// Delay between result pages in milliseconds
        #[arg(long, env = "HARVESTER_DELAY")]
        delay: Option<u64>,

        /// Classify and store the listings
        #[arg(long)]
        save: bool,
    },

    /// Classify a listing title
    #[command(alias = "c")]
    Classify {
        /// Listing title
        title: String,

        /// Escalate low-confidence results to the inference model
        #[arg(long)]
        ai: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Load config with layered overrides
    let mut config = Config::load(cli.config.as_deref())?.with_env();

    // Apply CLI overrides
    if let Some(format) = cli.format {
        config.format = format;
    }

    match cli.command {
        Commands::Search { terms, max_pages, headed, delay, save } => {
            if let Some(pages) = max_pages {
                config.max_pages = pages;
            }
            if headed {
                config.headless = false;
            }
            if let Some(delay) = delay {
                config.delay_ms = delay;
            }

            let cmd = SearchCommand::new(config);
            let output = cmd.execute(&terms, save).await?;
            println!("{}", output);
        }

        Commands::Classify { title, ai } => {
            if ai {
                config.classifier.enable_ai = true;
            }

            let cmd = ClassifyCommand::new(config);
            let output = cmd.execute(&title).await?;
            println!("{}", output);
        }
    }

    Ok(())
}
