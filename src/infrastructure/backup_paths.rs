//! Backup root discovery.
//!
//! Handles locating MobileSync backup directories across platforms.

use std::path::PathBuf;

use crate::domain::{AppError, Result};

/// Known MobileSync backup locations, relative to the home directory.
const MOBILESYNC_BACKUP_PATHS: &[&str] = &[
    // macOS
    "Library/Application Support/MobileSync/Backup",
    // Windows (iTunes)
    "AppData/Roaming/Apple Computer/MobileSync/Backup",
    "Apple/MobileSync/Backup",
];

/// Manifest database every backup root must contain.
const MANIFEST_DB_NAME: &str = "Manifest.db";

/// Discovers the MobileSync backup container directory.
///
/// # Errors
/// Returns error if the home directory cannot be determined or no known
/// location exists.
pub fn find_backup_container() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| AppError::Config {
        message: "Could not determine home directory".into(),
    })?;

    for path in MOBILESYNC_BACKUP_PATHS {
        let full_path = home.join(path);
        if full_path.is_dir() {
            tracing::debug!("Found backup container at: {}", full_path.display());
            return Ok(full_path);
        }
    }

    Err(AppError::Config {
        message: format!("No MobileSync backup directory found. Searched: {MOBILESYNC_BACKUP_PATHS:?}"),
    })
}

/// Finds all backup roots (directories holding a `Manifest.db`).
///
/// # Errors
/// Returns error if the backup container cannot be found or read.
pub fn find_backup_roots() -> Result<Vec<PathBuf>> {
    let container = find_backup_container()?;
    let mut roots = Vec::new();

    let entries = std::fs::read_dir(&container)
        .map_err(|e| AppError::io("Failed to read backup container", e))?;

    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.join(MANIFEST_DB_NAME).is_file() {
            tracing::debug!("Found backup root: {}", path.display());
            roots.push(path);
        }
    }

    roots.sort();
    Ok(roots)
}
