//! Backup manifest reader.
//!
//! An iPhone backup stores every original file under an opaque
//! content-hash name in a flat sharded directory, indexed by `Manifest.db`.
//! This module loads that index once and answers exact-match
//! `(domain, relative path)` lookups against it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::domain::{AppError, FileKind, ManifestEntry, Result};

/// Manifest database filename at the backup root.
const MANIFEST_DB_NAME: &str = "Manifest.db";

/// In-memory index over a backup's file manifest.
///
/// Built in a single scan at load time; all lookups afterwards are pure
/// and O(1) average. The entry set is immutable for the life of the value.
#[derive(Debug)]
pub struct BackupManifest {
    backup_root: PathBuf,
    entries: HashMap<(String, String), ManifestEntry>,
}

impl BackupManifest {
    /// Loads the manifest database from a backup root directory.
    ///
    /// # Errors
    /// Returns `AppError::ManifestLoad` if `Manifest.db` is absent or
    /// cannot be opened or scanned.
    pub fn load(backup_root: &Path) -> Result<Self> {
        let db_path = backup_root.join(MANIFEST_DB_NAME);

        if !db_path.is_file() {
            return Err(AppError::ManifestLoad {
                path: db_path,
                message: "manifest database not found".into(),
                source: None,
            });
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)
            .map_err(|e| AppError::manifest_load(&db_path, e))?;

        // Optimize for read-only access
        conn.execute_batch(
            "PRAGMA query_only = ON;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(|e| AppError::manifest_load(&db_path, e))?;

        let entries = Self::scan_files(&conn).map_err(|e| AppError::manifest_load(&db_path, e))?;

        tracing::debug!(
            "Loaded {} manifest entries from {}",
            entries.len(),
            db_path.display()
        );

        Ok(Self {
            backup_root: backup_root.to_path_buf(),
            entries,
        })
    }

    /// Single pass over the `Files` table building the lookup index.
    fn scan_files(
        conn: &Connection,
    ) -> rusqlite::Result<HashMap<(String, String), ManifestEntry>> {
        let mut stmt = conn.prepare("SELECT fileID, domain, relativePath, flags FROM Files")?;

        let rows = stmt.query_map([], |row| {
            let file_id: String = row.get(0)?;
            let domain: Option<String> = row.get(1)?;
            let relative_path: Option<String> = row.get(2)?;
            let flags: i64 = row.get(3)?;
            Ok((file_id, domain, relative_path, flags))
        })?;

        let mut entries = HashMap::new();
        for row in rows {
            let (file_id, domain, relative_path, flags) = match row {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Skipping unreadable manifest row: {}", e);
                    continue;
                }
            };

            let (Some(domain), Some(relative_path)) = (domain, relative_path) else {
                tracing::warn!("Skipping manifest row {} with null identifier", file_id);
                continue;
            };

            let kind = FileKind::try_from(u8::try_from(flags).unwrap_or(0))
                .unwrap_or(FileKind::Other);

            entries.insert(
                (domain.clone(), relative_path.clone()),
                ManifestEntry {
                    file_id,
                    domain,
                    relative_path,
                    kind,
                },
            );
        }

        Ok(entries)
    }

    /// Resolves a logical `(domain, relative path)` identifier.
    ///
    /// Exact match only; a one-character mismatch is a miss by design of
    /// the backup format.
    #[must_use]
    pub fn resolve(&self, domain: &str, relative_path: &str) -> Option<&ManifestEntry> {
        self.entries
            .get(&(domain.to_string(), relative_path.to_string()))
    }

    /// Resolves straight to the physical blob path for regular files.
    ///
    /// Returns `None` for misses and for entries that are not regular
    /// files (directories and symlinks have no stored blob).
    #[must_use]
    pub fn resolve_physical(&self, domain: &str, relative_path: &str) -> Option<PathBuf> {
        self.resolve(domain, relative_path)
            .filter(|entry| entry.is_file())
            .map(|entry| entry.physical_path(&self.backup_root))
    }

    /// The backup root this manifest was loaded from.
    #[must_use]
    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
