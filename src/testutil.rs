//! Shared test fixtures: minimal backups built inside temp directories.
//!
//! Builds just enough of the on-disk backup format for the pipeline to
//! run end to end: a `Manifest.db`, sharded blob files, and an sms.db
//! with the joined tables the store reads.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

/// One `Files` row for a fixture manifest.
pub struct ManifestRow<'a> {
    pub file_id: &'a str,
    pub domain: &'a str,
    pub relative_path: &'a str,
    pub flags: i64,
}

/// Creates a `Manifest.db` at the backup root with the given rows.
pub fn create_manifest_db(backup_root: &Path, rows: &[ManifestRow<'_>]) {
    let conn = Connection::open(backup_root.join("Manifest.db")).unwrap();
    conn.execute_batch(
        "CREATE TABLE Files (
            fileID TEXT PRIMARY KEY,
            domain TEXT,
            relativePath TEXT,
            flags INTEGER,
            file BLOB
        );",
    )
    .unwrap();

    for row in rows {
        conn.execute(
            "INSERT INTO Files (fileID, domain, relativePath, flags) VALUES (?1, ?2, ?3, ?4)",
            params![row.file_id, row.domain, row.relative_path, row.flags],
        )
        .unwrap();
    }
}

/// Writes a content-hashed blob into the backup's sharded store.
pub fn create_blob(backup_root: &Path, file_id: &str, bytes: &[u8]) -> PathBuf {
    let shard_dir = backup_root.join(&file_id[..2]);
    fs::create_dir_all(&shard_dir).unwrap();
    let path = shard_dir.join(file_id);
    fs::write(&path, bytes).unwrap();
    path
}

/// Seconds between the Unix epoch and the Apple epoch (2001-01-01 UTC).
pub const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Converts a Unix timestamp to the nanosecond Apple-epoch encoding
/// modern message databases use.
pub fn apple_ns(unix_secs: i64) -> i64 {
    (unix_secs - APPLE_EPOCH_OFFSET_SECS) * 1_000_000_000
}

/// Builder for a fixture messages database (sms.db schema subset).
pub struct MessagesDbBuilder {
    conn: Connection,
}

impl MessagesDbBuilder {
    /// Creates the database file with the full required schema.
    pub fn create(path: &Path) -> Self {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);
             CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, guid TEXT, chat_identifier TEXT);
             CREATE TABLE chat_handle_join (chat_id INTEGER, handle_id INTEGER);
             CREATE TABLE message (
                 ROWID INTEGER PRIMARY KEY,
                 date INTEGER,
                 handle_id INTEGER,
                 is_from_me INTEGER,
                 text TEXT
             );
             CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);
             CREATE TABLE attachment (
                 ROWID INTEGER PRIMARY KEY,
                 filename TEXT,
                 mime_type TEXT,
                 transfer_name TEXT,
                 created_date INTEGER
             );
             CREATE TABLE message_attachment_join (message_id INTEGER, attachment_id INTEGER);",
        )
        .unwrap();
        Self { conn }
    }

    pub fn add_handle(&self, rowid: i64, handle: &str) -> &Self {
        self.conn
            .execute(
                "INSERT INTO handle (ROWID, id) VALUES (?1, ?2)",
                params![rowid, handle],
            )
            .unwrap();
        self
    }

    pub fn add_chat(&self, rowid: i64, guid: &str, participants: &[i64]) -> &Self {
        self.conn
            .execute(
                "INSERT INTO chat (ROWID, guid, chat_identifier) VALUES (?1, ?2, ?2)",
                params![rowid, guid],
            )
            .unwrap();
        for handle_id in participants {
            self.conn
                .execute(
                    "INSERT INTO chat_handle_join (chat_id, handle_id) VALUES (?1, ?2)",
                    params![rowid, handle_id],
                )
                .unwrap();
        }
        self
    }

    pub fn add_message(
        &self,
        rowid: i64,
        chat_id: i64,
        date: i64,
        handle_id: i64,
        is_from_me: bool,
        text: Option<&str>,
    ) -> &Self {
        self.conn
            .execute(
                "INSERT INTO message (ROWID, date, handle_id, is_from_me, text)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![rowid, date, handle_id, i64::from(is_from_me), text],
            )
            .unwrap();
        self.conn
            .execute(
                "INSERT INTO chat_message_join (chat_id, message_id) VALUES (?1, ?2)",
                params![chat_id, rowid],
            )
            .unwrap();
        self
    }

    pub fn add_attachment(
        &self,
        rowid: i64,
        message_id: i64,
        filename: Option<&str>,
        mime_type: Option<&str>,
        transfer_name: Option<&str>,
    ) -> &Self {
        self.conn
            .execute(
                "INSERT INTO attachment (ROWID, filename, mime_type, transfer_name, created_date)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                params![rowid, filename, mime_type, transfer_name],
            )
            .unwrap();
        self.conn
            .execute(
                "INSERT INTO message_attachment_join (message_id, attachment_id) VALUES (?1, ?2)",
                params![message_id, rowid],
            )
            .unwrap();
        self
    }
}
