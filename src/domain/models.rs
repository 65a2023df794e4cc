//! Domain models for backup message data.
//!
//! These models represent the core entities extracted from an iPhone
//! backup's manifest database and messages database.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entry recorded in the backup manifest, decoded from the
/// `flags` column of the `Files` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FileKind {
    /// Regular file backed by a content-hashed blob.
    File = 1,
    /// Directory (no blob stored).
    Directory = 2,
    /// Symbolic link.
    Symlink = 4,
    /// Anything else the backup format may add.
    Other = 0,
}

impl From<FileKind> for u8 {
    fn from(kind: FileKind) -> Self {
        kind as Self
    }
}

impl TryFrom<u8> for FileKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Directory),
            4 => Ok(Self::Symlink),
            _ => Ok(Self::Other),
        }
    }
}

/// One row of the backup manifest: a logical (domain, relative path)
/// identifier mapped to the content hash the bytes are stored under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Content hash (40-char hex) the blob is stored under.
    pub file_id: String,
    /// Owning domain, e.g. `HomeDomain` or an app bundle identifier.
    pub domain: String,
    /// Path relative to the domain root.
    pub relative_path: String,
    /// Entry kind decoded from manifest flags.
    pub kind: FileKind,
}

impl ManifestEntry {
    /// Physical location of the stored blob under the backup root.
    ///
    /// The backup shards blobs by the first two hex characters of the
    /// content hash: `<root>/<ab>/<ab...full hash...>`. This must match
    /// the backup's own convention byte-for-byte.
    #[must_use]
    pub fn physical_path(&self, backup_root: &Path) -> PathBuf {
        let shard = &self.file_id[..2.min(self.file_id.len())];
        backup_root.join(shard).join(&self.file_id)
    }

    /// Whether this entry is a regular file with a stored blob.
    #[must_use]
    pub const fn is_file(&self) -> bool {
        matches!(self.kind, FileKind::File)
    }
}

/// A conversation thread from the messages database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    /// Stable row id from the messages database.
    pub id: i64,
    /// Globally unique chat identifier string.
    pub guid: String,
    /// Participant handles (phone numbers / email addresses), excluding self.
    pub participants: Vec<String>,
}

impl Chat {
    /// Whether this is a group conversation.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.participants.len() > 1
    }

    /// Directory name this chat exports under.
    ///
    /// A 1:1 chat is named after its sole participant; anything else gets
    /// a synthetic `chat{id}` name that is stable across runs.
    #[must_use]
    pub fn export_name(&self) -> String {
        if let [handle] = self.participants.as_slice() {
            let sanitized = sanitize_name(handle);
            if !sanitized.is_empty() {
                return sanitized;
            }
        }
        format!("chat{}", self.id)
    }
}

/// A single message within a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Row id from the messages database.
    pub id: i64,
    /// Chat this message belongs to.
    pub chat_id: i64,
    /// Sender handle; `None` for outgoing messages and unknown senders.
    pub sender: Option<String>,
    /// When the message was sent.
    pub timestamp: DateTime<Utc>,
    /// Message text, if any.
    pub body: Option<String>,
    /// Attachments referenced by this message, in join order.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Whether this row carries neither text nor attachments.
    ///
    /// Such rows usually reflect reactions, read receipts, or system
    /// events; they are retained in the store and suppressed at export
    /// time unless configured otherwise.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty() && self.body.as_deref().map_or(true, |b| b.trim().is_empty())
    }
}

/// An attachment reference as recorded in the messages database, with its
/// path already translated into the backup's logical namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Row id from the attachment table.
    pub id: i64,
    /// Backup domain the file is expected to live under.
    pub domain: String,
    /// Path relative to the domain, as the manifest indexes it.
    pub relative_path: String,
    /// Declared MIME type, if recorded.
    pub mime_type: Option<String>,
    /// Filename the device assigned at transfer time.
    pub transfer_name: String,
    /// Attachment creation date, if recorded.
    pub created_at: Option<DateTime<Utc>>,
}

/// Outcome of exporting a single chat.
#[derive(Debug, Clone, Default)]
pub struct ChatExportResult {
    /// Export directory name of the chat.
    pub chat_name: String,
    /// Messages written to the transcript.
    pub messages_exported: usize,
    /// Attachment files copied.
    pub attachments_copied: usize,
    /// Attachments with no manifest entry (transcript shows a null path).
    pub attachments_missing: usize,
    /// Per-file copy failures, as human-readable descriptions.
    pub copy_failures: Vec<String>,
}

/// Aggregate summary for a whole export run, merged from per-chat results.
#[derive(Debug, Clone, Default)]
pub struct ExportSummary {
    /// Chats considered by the run.
    pub chats_processed: usize,
    /// Chats that produced an export directory.
    pub chats_exported: usize,
    /// Total messages written across all transcripts.
    pub messages_exported: usize,
    /// Total attachment files copied.
    pub attachments_copied: usize,
    /// Total attachments without a manifest entry.
    pub attachments_missing: usize,
    /// Per-file copy failures across all chats.
    pub copy_failures: Vec<String>,
    /// Chats that failed entirely, with the error text.
    pub chat_errors: Vec<(String, String)>,
}

impl ExportSummary {
    /// Fold one chat's result into the run summary.
    pub fn absorb(&mut self, result: ChatExportResult) {
        self.chats_exported += 1;
        self.messages_exported += result.messages_exported;
        self.attachments_copied += result.attachments_copied;
        self.attachments_missing += result.attachments_missing;
        self.copy_failures.extend(result.copy_failures);
    }
}

/// Characters never allowed in an exported file or directory name.
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Sanitizes a string for use as a filesystem name.
///
/// Disallowed path characters and control characters become `_`; leading
/// and trailing dots and spaces are trimmed; case is preserved.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_control() || FORBIDDEN_NAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    replaced.trim_matches(|c| c == '.' || c == ' ').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name_replaces_forbidden_chars() {
        assert_eq!(sanitize_name("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_name("IMG 0001.JPG"), "IMG 0001.JPG");
        assert_eq!(sanitize_name("..hidden.."), "hidden");
        assert_eq!(sanitize_name("+15551234567"), "+15551234567");
    }

    #[test]
    fn test_sanitize_name_preserves_case() {
        assert_eq!(sanitize_name("Photo.JPG"), "Photo.JPG");
    }

    #[test]
    fn test_chat_export_name_one_to_one() {
        let chat = Chat {
            id: 7,
            guid: "iMessage;-;+15551234567".into(),
            participants: vec!["+15551234567".into()],
        };
        assert!(!chat.is_group());
        assert_eq!(chat.export_name(), "+15551234567");
    }

    #[test]
    fn test_chat_export_name_group_is_synthetic() {
        let chat = Chat {
            id: 42,
            guid: "chat000042".into(),
            participants: vec!["+1555".into(), "+1666".into(), "+1777".into()],
        };
        assert!(chat.is_group());
        assert_eq!(chat.export_name(), "chat42");
    }

    #[test]
    fn test_chat_export_name_empty_participants() {
        let chat = Chat {
            id: 3,
            guid: "g".into(),
            participants: vec![],
        };
        assert_eq!(chat.export_name(), "chat3");
    }

    #[test]
    fn test_manifest_entry_physical_path_sharding() {
        let entry = ManifestEntry {
            file_id: "ab34567890abcdef1234567890abcdef12345678".into(),
            domain: "MediaDomain".into(),
            relative_path: "Library/SMS/Attachments/x.jpg".into(),
            kind: FileKind::File,
        };
        let path = entry.physical_path(Path::new("/backup"));
        assert_eq!(
            path,
            Path::new("/backup/ab/ab34567890abcdef1234567890abcdef12345678")
        );
    }

    #[test]
    fn test_message_is_empty() {
        let mut msg = Message {
            id: 1,
            chat_id: 1,
            sender: None,
            timestamp: Utc::now(),
            body: None,
            attachments: vec![],
        };
        assert!(msg.is_empty());

        msg.body = Some("  ".into());
        assert!(msg.is_empty());

        msg.body = Some("hi".into());
        assert!(!msg.is_empty());
    }
}
