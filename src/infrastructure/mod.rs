//! Infrastructure layer - external adapters (database, filesystem).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod backup_paths;
pub mod config;
pub mod manifest;
pub mod message_db;

pub use backup_paths::{find_backup_container, find_backup_roots};
pub use config::{load_config_from_file, ExportConfig};
pub use manifest::BackupManifest;
pub use message_db::{locate_messages_db, ConversationStore, LoadOptions};
