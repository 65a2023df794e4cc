//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};

/// Backup Chat Exporter - export message history and attachments from an
/// iPhone backup into per-conversation folders.
#[derive(Parser, Debug)]
#[command(name = "backup-chat-exporter")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every chat to a destination directory.
    Export {
        /// Backup root directory (contains Manifest.db).
        backup: PathBuf,

        /// Destination directory for exported chats.
        destination: PathBuf,

        /// Worker count (default: derived from available parallelism).
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Include messages with neither text nor attachments.
        #[arg(long)]
        include_empty: bool,

        /// Leave files already present in the destination untouched.
        #[arg(long)]
        no_overwrite: bool,

        /// Only export messages on or after this date (YYYY-MM-DD).
        #[arg(long)]
        min_date: Option<String>,

        /// Only export messages before this date (YYYY-MM-DD).
        #[arg(long)]
        max_date: Option<String>,

        /// TOML configuration file; CLI flags take precedence.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the chats found in a backup (summary table).
    List {
        /// Backup root directory (contains Manifest.db).
        backup: PathBuf,
    },

    /// Show statistics about a backup's message store.
    Stats {
        /// Backup root directory (contains Manifest.db).
        backup: PathBuf,
    },

    /// Show MobileSync backup roots found on this machine.
    Paths,
}

/// Parses a `YYYY-MM-DD` argument into a UTC midnight instant.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("Invalid date '{s}' (expected YYYY-MM-DD): {e}"))
        .and_then(|date| {
            date.and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc())
                .ok_or_else(|| format!("Invalid date '{s}'"))
        })
}
