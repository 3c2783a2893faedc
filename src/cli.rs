//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Most flags override `config.json` values.

use crate::models::{OutputMode, SortMode};
use clap::Parser;
use std::path::PathBuf;

/// Pinscout - find popular Pinterest pins
///
/// Drives a browser through Pinterest search results, checks each pin's
/// like count and keeps the popular ones: images on disk, rows in an
/// Excel workbook and/or a Google Sheet.
///
/// For personal study only. Respect Pinterest's terms and the authors' rights.
///
/// Examples:
///   pinscout
///   pinscout --config my_config.json
///   pinscout --keyword "brutalist architecture" --min-likes 1000 --max-results 20
///   pinscout --mode record --no-excel
///   pinscout --snapshot downloads/run/snapshot_debug.html
///   pinscout --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for config.json in the current directory
    #[arg(short, long, value_name = "FILE", env = "PINSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Search keyword (repeatable, replaces the configured keywords)
    #[arg(short, long, value_name = "TEXT")]
    pub keyword: Vec<String>,

    /// Minimum like count for a pin to be kept
    #[arg(long, value_name = "COUNT")]
    pub min_likes: Option<u64>,

    /// Stop after this many matching pins
    #[arg(long, value_name = "COUNT")]
    pub max_results: Option<usize>,

    /// Base folder for downloads and reports
    #[arg(short, long, value_name = "DIR")]
    pub save_path: Option<PathBuf>,

    /// Download images or only record matches
    #[arg(long, value_name = "MODE")]
    pub mode: Option<OutputMode>,

    /// Candidate ordering (relevance, random, likes)
    #[arg(long, value_name = "ORDER")]
    pub sort: Option<SortMode>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Do not write the Excel workbook
    #[arg(long)]
    pub no_excel: bool,

    /// Dump the raw search snapshot for inspection
    #[arg(long)]
    pub dump_snapshot: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Parse a saved snapshot file and print the pins found (no browser)
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Forget all previously seen pins and exit
    #[arg(long)]
    pub clear_history: bool,

    /// Generate a default config.json configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Run report format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// File extension of the report.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.max_results == Some(0) {
            return Err("Max results must be at least 1".to_string());
        }

        if self.keyword.iter().any(|k| k.trim().is_empty()) {
            return Err("Keywords must not be empty".to_string());
        }

        if let Some(ref snapshot) = self.snapshot {
            if !snapshot.is_file() {
                return Err(format!("Snapshot file does not exist: {}", snapshot.display()));
            }
        }

        if let Some(ref config) = self.config {
            if !self.init_config && !config.exists() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings, or `None` to
    /// use the configured level.
    pub fn log_level_override(&self) -> Option<tracing::Level> {
        if self.quiet {
            Some(tracing::Level::ERROR)
        } else if self.verbose {
            Some(tracing::Level::DEBUG)
        } else {
            None
        }
    }
}
