use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Top-level CLI parser for the `seiva` binary.
#[derive(Debug, Parser)]
#[command(name = "seiva", version, about = "Seiva - multi-version SEI scraper")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scrape configured institutions and report per-institution outcomes
    Scrape(ScrapeArgs),
    /// Download one document's content by its portal reference
    Document(DocumentArgs),
    /// List the SEI versions this build supports
    Versions,
    /// Validate the configuration and the credential environment
    ConfigCheck,
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Institution id to scrape; repeatable. Default: all configured.
    #[arg(short, long = "institution")]
    pub institutions: Vec<String>,

    /// Portal status label filter (e.g. "open")
    #[arg(long)]
    pub status: Option<String>,

    /// Restrict to processes held by one organizational unit
    #[arg(long)]
    pub unit: Option<String>,

    /// Only processes updated since this date (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Override the configured pagination safety bound
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Print the batch result as JSON instead of a summary table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DocumentArgs {
    /// Institution id the document belongs to
    #[arg(short, long)]
    pub institution: String,

    /// Portal content reference (the href from a process detail)
    #[arg(long)]
    pub content_ref: String,

    /// Write the bytes to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
