//! Backup Chat Exporter - export message history from iPhone backups.
//!
//! This tool reads an unencrypted backup's manifest and messages
//! databases, reconstructs each conversation, and writes one folder per
//! chat: a `messages.json` transcript plus the chat's attachment files,
//! resolved out of the backup's content-hashed store.

mod application;
mod cli;
mod domain;
mod infrastructure;
#[cfg(test)]
mod testutil;

use std::path::Path;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{format_chats_table, format_summary, ExportOptions};
use cli::{parse_date, Cli, Commands};
use domain::AppError;
use infrastructure::{
    find_backup_roots, load_config_from_file, locate_messages_db, BackupManifest,
    ConversationStore, ExportConfig,
};

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> domain::Result<()> {
    match cli.command {
        Commands::Export {
            backup,
            destination,
            jobs,
            include_empty,
            no_overwrite,
            min_date,
            max_date,
            config,
        } => cmd_export(
            &backup,
            &destination,
            jobs,
            include_empty,
            no_overwrite,
            min_date.as_deref(),
            max_date.as_deref(),
            config.as_deref(),
        ),
        Commands::List { backup } => cmd_list(&backup),
        Commands::Stats { backup } => cmd_stats(&backup),
        Commands::Paths => cmd_paths(),
    }
}

/// Full export run.
#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn cmd_export(
    backup: &Path,
    destination: &Path,
    jobs: Option<usize>,
    include_empty: bool,
    no_overwrite: bool,
    min_date: Option<&str>,
    max_date: Option<&str>,
    config_path: Option<&Path>,
) -> domain::Result<()> {
    let config = match config_path {
        Some(path) => load_config_from_file(path)?,
        None => ExportConfig::default(),
    };

    let mut options = ExportOptions::from_config(&config);
    if let Some(jobs) = jobs {
        options.concurrency = jobs;
    }
    if include_empty {
        options.include_empty = true;
    }
    if no_overwrite {
        options.overwrite = false;
    }
    options.min_date = min_date
        .map(|s| parse_date(s).map_err(|e| AppError::Config { message: e }))
        .transpose()?;
    options.max_date = max_date
        .map(|s| parse_date(s).map_err(|e| AppError::Config { message: e }))
        .transpose()?;

    let summary = application::export_backup(backup, destination, &options)?;

    println!("{}", format_summary(&summary));
    println!(
        "\n{} Exported {} chats to {}",
        "✓".green().bold(),
        summary.chats_exported,
        destination.display()
    );

    Ok(())
}

/// List the chats in a backup.
fn cmd_list(backup: &Path) -> domain::Result<()> {
    let store = open_store(backup)?;
    println!("{}", format_chats_table(&store));
    Ok(())
}

/// Show backup store statistics.
fn cmd_stats(backup: &Path) -> domain::Result<()> {
    let manifest = BackupManifest::load(backup)?;
    let db_path = locate_messages_db(&manifest)?;
    let store = ConversationStore::load(&db_path)?;

    let attachment_refs: usize = store
        .chats()
        .iter()
        .flat_map(|chat| store.messages(chat.id))
        .map(|m| m.attachments.len())
        .sum();
    let group_chats = store.chats().iter().filter(|c| c.is_group()).count();

    println!(
        "{}\n  Manifest entries: {}\n  Chats: {} ({} group)\n  Messages: {}\n  Attachment references: {}",
        "Backup statistics".bold(),
        manifest.len().to_string().cyan(),
        store.chats().len().to_string().cyan(),
        group_chats.to_string().cyan(),
        store.message_count().to_string().green(),
        attachment_refs.to_string().green(),
    );

    Ok(())
}

/// Show discovered MobileSync backup roots.
fn cmd_paths() -> domain::Result<()> {
    let roots = find_backup_roots()?;

    println!("{}", "Discovered backup roots".bold());
    println!();

    for (i, path) in roots.iter().enumerate() {
        println!("  {}. {}", i + 1, path.display());
    }

    println!();
    println!("Total: {} backup(s)", roots.len());

    Ok(())
}

/// Opens the conversation store of a backup, resolving the messages
/// database through the manifest.
fn open_store(backup: &Path) -> domain::Result<ConversationStore> {
    let manifest = BackupManifest::load(backup)?;
    let db_path = locate_messages_db(&manifest)?;
    ConversationStore::load(&db_path)
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
