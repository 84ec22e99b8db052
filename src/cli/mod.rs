use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod output;

// CLI argument definitions for the bulletin ingestion management tool

#[derive(Parser)]
#[command(name = "bulletin-ops")]
#[command(about = "Visa Bulletin ingestion and analytics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the store and create the schema
    Init {
        /// Storage DSN (e.g. sqlite:visa-bulletins.db)
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Backfill bulletins over a fiscal-year range
    Collect {
        /// First fiscal year to collect
        #[arg(long)]
        start_year: i32,

        /// Last fiscal year to collect (inclusive)
        #[arg(long)]
        end_year: i32,

        /// Fetch worker count override
        #[arg(long)]
        workers: Option<usize>,

        /// Re-ingest months that are already stored
        #[arg(long)]
        force: bool,

        /// Probe candidate URLs before downloading
        #[arg(long)]
        verify: bool,
    },

    /// Fetch the current bulletin from the index page
    Fetch,

    /// Re-run normalization over retained raw HTML
    Validate {
        /// Rewrite months whose stored entries drifted from a fresh parse
        #[arg(long)]
        fix: bool,
    },

    /// Trend statistics for one series
    Analyze {
        /// Visa category (e.g. EB2, F2A)
        #[arg(long)]
        category: String,

        /// Chargeability country (e.g. INDIA, WORLDWIDE)
        #[arg(long)]
        country: String,

        /// Chart: final | filing
        #[arg(long, default_value = "final")]
        chart: String,

        /// Window in months (full history when omitted)
        #[arg(long)]
        window: Option<u32>,
    },

    /// Train a model on one series and store a forecast
    Forecast {
        /// Visa category (e.g. EB2, F2A)
        #[arg(long)]
        category: String,

        /// Chargeability country (e.g. INDIA, WORLDWIDE)
        #[arg(long)]
        country: String,

        /// Chart: final | filing
        #[arg(long, default_value = "final")]
        chart: String,

        /// Target year
        #[arg(long)]
        target_year: i32,

        /// Target month (1-12)
        #[arg(long)]
        target_month: u32,

        /// Model variant: tree | logistic
        #[arg(long, default_value = "tree")]
        model: String,

        /// Save the trained model artifact here
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Repository totals
    Stats,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
