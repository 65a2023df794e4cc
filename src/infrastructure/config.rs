//! Export configuration management.
//!
//! Handles loading TOML configuration files; CLI flags override any
//! value read from a file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{AppError, Result};

/// Recognized export options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Export body-less, attachment-less rows (reactions, system events).
    pub include_empty_messages: bool,
    /// Worker count; 0 derives from available parallelism.
    pub concurrency: usize,
    /// Overwrite files already present in the output tree.
    pub overwrite_existing: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include_empty_messages: false,
            concurrency: 0,
            overwrite_existing: true,
        }
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if the file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<ExportConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}
