//! Messages database reader.
//!
//! Opens the sms.db resolved through the backup manifest and rebuilds
//! chats, participants, messages, and attachment references with the
//! chat↔handle, chat↔message, and message↔attachment joins performed
//! once, into in-memory indices with deterministic ordering.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};

use crate::domain::{AppError, Attachment, Chat, Message, Result};
use crate::infrastructure::BackupManifest;

/// Logical location of the messages database inside a backup.
const MESSAGES_DB_RELATIVE_PATH: &str = "Library/SMS/sms.db";

/// Domains the messages database may be indexed under, tried in order.
const MESSAGES_DB_DOMAINS: &[&str] = &["HomeDomain", "com.apple.MobileSMS"];

/// Domain attachment files live under in the backup's logical namespace.
const ATTACHMENT_DOMAIN: &str = "MediaDomain";

/// Tables the store cannot operate without.
const REQUIRED_TABLES: &[&str] = &[
    "handle",
    "chat",
    "chat_handle_join",
    "message",
    "chat_message_join",
    "attachment",
    "message_attachment_join",
];

/// Seconds between the Unix epoch and the Apple epoch (2001-01-01 UTC).
const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

/// Raw values at or above this magnitude are nanosecond-encoded.
/// Older backups store Apple-epoch seconds in the same column.
const NS_ENCODING_THRESHOLD: i64 = 1_000_000_000_000;

/// Optional bounds applied while loading messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Drop messages sent before this instant.
    pub min_date: Option<DateTime<Utc>>,
    /// Drop messages sent at or after this instant.
    pub max_date: Option<DateTime<Utc>>,
}

/// Locates the messages database's physical file through the manifest.
///
/// The database is itself a manifest-indexed file, so it must be resolved
/// before it can be opened (bootstrapping).
///
/// # Errors
/// Returns `AppError::StoreLoad` if no candidate domain resolves.
pub fn locate_messages_db(manifest: &BackupManifest) -> Result<PathBuf> {
    for domain in MESSAGES_DB_DOMAINS {
        if let Some(path) = manifest.resolve_physical(domain, MESSAGES_DB_RELATIVE_PATH) {
            tracing::debug!(
                "Messages database resolved under {} -> {}",
                domain,
                path.display()
            );
            return Ok(path);
        }
    }

    Err(AppError::StoreLoad {
        message: format!("{MESSAGES_DB_RELATIVE_PATH} has no entry in the backup manifest"),
        source: None,
    })
}

/// Read-only, fully loaded view of the messages database.
///
/// Immutable after construction; safe to share by reference across
/// worker threads.
#[derive(Debug)]
pub struct ConversationStore {
    chats: Vec<Chat>,
    messages_by_chat: HashMap<i64, Vec<Message>>,
}

impl ConversationStore {
    /// Loads the store with default options.
    ///
    /// # Errors
    /// See [`Self::load_with`].
    pub fn load(db_path: &Path) -> Result<Self> {
        Self::load_with(db_path, LoadOptions::default())
    }

    /// Loads chats, messages, and attachment references in one pass each.
    ///
    /// Malformed individual rows (unparseable timestamp, dangling foreign
    /// key, attachment without a filename) are logged and skipped; only a
    /// missing or unreadable database aborts the load.
    ///
    /// # Errors
    /// Returns `AppError::StoreLoad` if the database is absent, cannot be
    /// opened, or a required table is missing.
    pub fn load_with(db_path: &Path, options: LoadOptions) -> Result<Self> {
        if !db_path.is_file() {
            return Err(AppError::StoreLoad {
                message: format!("no database file at {}", db_path.display()),
                source: None,
            });
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags).map_err(AppError::store_load)?;

        conn.execute_batch(
            "PRAGMA query_only = ON;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(AppError::store_load)?;

        check_schema(&conn)?;

        let handles = load_handles(&conn)?;
        let chats = load_chats(&conn, &handles)?;
        let mut attachments = load_attachments(&conn)?;

        let chat_ids: HashSet<i64> = chats.iter().map(|c| c.id).collect();
        let messages_by_chat =
            load_messages(&conn, &chat_ids, &handles, &mut attachments, options)?;

        let total: usize = messages_by_chat.values().map(Vec::len).sum();
        tracing::info!(
            "Loaded {} chats with {} messages from {}",
            chats.len(),
            total,
            db_path.display()
        );

        Ok(Self {
            chats,
            messages_by_chat,
        })
    }

    /// All chats, in row-id order.
    #[must_use]
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// Messages of one chat, timestamp-ascending (ties by row id).
    #[must_use]
    pub fn messages(&self, chat_id: i64) -> &[Message] {
        self.messages_by_chat
            .get(&chat_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Total number of loaded messages across all chats.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages_by_chat.values().map(Vec::len).sum()
    }
}

/// Fails the load if any required table is absent.
fn check_schema(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .map_err(AppError::store_load)?;

    let present: HashSet<String> = stmt
        .query_map([], |row| row.get(0))
        .map_err(AppError::store_load)?
        .filter_map(std::result::Result::ok)
        .collect();

    for table in REQUIRED_TABLES {
        if !present.contains(*table) {
            return Err(AppError::StoreLoad {
                message: format!("required table '{table}' is missing (unexpected schema)"),
                source: None,
            });
        }
    }

    Ok(())
}

/// Loads the handle (sender id) table into a row-id map.
fn load_handles(conn: &Connection) -> Result<HashMap<i64, String>> {
    let mut stmt = conn
        .prepare("SELECT ROWID, id FROM handle")
        .map_err(AppError::store_load)?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
        .map_err(AppError::store_load)?;

    Ok(rows.filter_map(std::result::Result::ok).collect())
}

/// Loads chats and joins in their participant handles.
fn load_chats(conn: &Connection, handles: &HashMap<i64, String>) -> Result<Vec<Chat>> {
    let mut participants: HashMap<i64, Vec<String>> = HashMap::new();
    {
        let mut stmt = conn
            .prepare(
                "SELECT chat_id, handle_id FROM chat_handle_join
                 ORDER BY chat_id, handle_id",
            )
            .map_err(AppError::store_load)?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .map_err(AppError::store_load)?;

        for row in rows.filter_map(std::result::Result::ok) {
            let (chat_id, handle_id) = row;
            match handles.get(&handle_id) {
                Some(handle) => participants
                    .entry(chat_id)
                    .or_default()
                    .push(handle.clone()),
                None => {
                    tracing::warn!(
                        "Chat {} references unknown handle {}; participant dropped",
                        chat_id,
                        handle_id
                    );
                }
            }
        }
    }

    let mut stmt = conn
        .prepare("SELECT ROWID, guid FROM chat ORDER BY ROWID")
        .map_err(AppError::store_load)?;

    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .map_err(AppError::store_load)?;

    let mut chats = Vec::new();
    for row in rows.filter_map(std::result::Result::ok) {
        let (id, guid) = row;
        chats.push(Chat {
            id,
            guid: guid.unwrap_or_default(),
            participants: participants.remove(&id).unwrap_or_default(),
        });
    }

    Ok(chats)
}

/// Loads attachment rows bucketed by message id via the join table.
fn load_attachments(conn: &Connection) -> Result<HashMap<i64, Vec<Attachment>>> {
    let mut stmt = conn
        .prepare(
            "SELECT maj.message_id, a.ROWID, a.filename, a.mime_type,
                    a.transfer_name, a.created_date
             FROM attachment a
             JOIN message_attachment_join maj ON a.ROWID = maj.attachment_id
             ORDER BY maj.message_id, a.ROWID",
        )
        .map_err(AppError::store_load)?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<i64>>(5)?,
            ))
        })
        .map_err(AppError::store_load)?;

    let mut by_message: HashMap<i64, Vec<Attachment>> = HashMap::new();
    for row in rows.filter_map(std::result::Result::ok) {
        let (message_id, id, filename, mime_type, transfer_name, created_date) = row;

        let Some(filename) = filename else {
            tracing::warn!("Attachment {} on message {} has no filename", id, message_id);
            continue;
        };

        let relative_path = trim_logical_path(&filename).to_string();
        let transfer_name = transfer_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| basename(&relative_path).to_string());

        by_message.entry(message_id).or_default().push(Attachment {
            id,
            domain: ATTACHMENT_DOMAIN.to_string(),
            relative_path,
            mime_type,
            transfer_name,
            created_at: created_date.and_then(decode_apple_timestamp),
        });
    }

    Ok(by_message)
}

/// Loads messages, buckets them per chat, and sorts each bucket.
fn load_messages(
    conn: &Connection,
    chat_ids: &HashSet<i64>,
    handles: &HashMap<i64, String>,
    attachments: &mut HashMap<i64, Vec<Attachment>>,
    options: LoadOptions,
) -> Result<HashMap<i64, Vec<Message>>> {
    let mut stmt = conn
        .prepare(
            "SELECT m.ROWID, cmj.chat_id, m.date, m.handle_id, m.is_from_me, m.text
             FROM message m
             JOIN chat_message_join cmj ON m.ROWID = cmj.message_id",
        )
        .map_err(AppError::store_load)?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })
        .map_err(AppError::store_load)?;

    let mut by_chat: HashMap<i64, Vec<Message>> = HashMap::new();
    for row in rows.filter_map(std::result::Result::ok) {
        let (id, chat_id, date, handle_id, is_from_me, body) = row;

        if !chat_ids.contains(&chat_id) {
            tracing::warn!("Message {} references unknown chat {}; dropped", id, chat_id);
            continue;
        }

        let Some(timestamp) = date.and_then(decode_apple_timestamp) else {
            tracing::warn!("Message {} has an unparseable timestamp; dropped", id);
            continue;
        };

        if let Some(min) = options.min_date {
            if timestamp < min {
                continue;
            }
        }
        if let Some(max) = options.max_date {
            if timestamp >= max {
                continue;
            }
        }

        let outgoing = is_from_me.unwrap_or(0) != 0;
        let sender = if outgoing {
            None
        } else {
            match handle_id.unwrap_or(0) {
                0 => None,
                hid => match handles.get(&hid) {
                    Some(handle) => Some(handle.clone()),
                    None => {
                        tracing::warn!(
                            "Message {} references unknown handle {}; dropped",
                            id,
                            hid
                        );
                        continue;
                    }
                },
            }
        };

        by_chat.entry(chat_id).or_default().push(Message {
            id,
            chat_id,
            sender,
            timestamp,
            body,
            attachments: attachments.remove(&id).unwrap_or_default(),
        });
    }

    // Ties on timestamp resolve by row id so re-runs are byte-identical
    for messages in by_chat.values_mut() {
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    }

    Ok(by_chat)
}

/// Converts an Apple-epoch timestamp column value to UTC.
///
/// Modern databases store nanoseconds since 2001-01-01; older ones store
/// seconds in the same column. Values below the nanosecond threshold are
/// interpreted as seconds.
fn decode_apple_timestamp(raw: i64) -> Option<DateTime<Utc>> {
    let (secs, nanos) = if raw.abs() >= NS_ENCODING_THRESHOLD {
        (raw / 1_000_000_000, u32::try_from(raw.rem_euclid(1_000_000_000)).ok()?)
    } else {
        (raw, 0)
    };

    DateTime::from_timestamp(secs.checked_add(APPLE_EPOCH_OFFSET_SECS)?, nanos)
}

/// Strips the device-absolute prefix from an attachment filename,
/// yielding the path the manifest indexes it under.
fn trim_logical_path(path: &str) -> &str {
    path.strip_prefix("~/")
        .or_else(|| path.strip_prefix("/var/mobile/"))
        .unwrap_or(path)
}

/// Final component of a slash-separated path.
fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
