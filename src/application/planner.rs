//! Export planning.
//!
//! Turns one chat's loaded messages into an ordered transcript plus a
//! file-copy plan, resolving every attachment through the backup
//! manifest. Pure: no file I/O happens here, which keeps the resolution
//! logic independently testable.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{sanitize_name, Chat};
use crate::infrastructure::{BackupManifest, ConversationStore};

/// Subdirectory attachment files are copied into, inside each chat's
/// export directory.
pub const ATTACHMENTS_DIR: &str = "attachments";

/// Domains tried when an attachment's declared domain has no manifest
/// entry. Some backups index SMS media under the home domain instead.
const ATTACHMENT_FALLBACK_DOMAINS: &[&str] = &["HomeDomain", "com.apple.MobileSMS"];

/// Fixed textual timestamp form used in transcripts.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Options affecting what a plan includes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Keep body-less, attachment-less rows in the transcript.
    pub include_empty: bool,
}

/// One attachment reference in the transcript.
///
/// `path` is the chat-relative target the file is copied to, or `null`
/// when the backup manifest has no entry for it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedAttachment {
    pub name: String,
    pub path: Option<String>,
}

/// One transcript record, already in its serialized field order.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlannedMessage {
    pub sender: Option<String>,
    pub timestamp: String,
    pub body: Option<String>,
    pub attachments: Vec<PlannedAttachment>,
}

/// A single pending file copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    /// Physical blob location inside the backup.
    pub source: PathBuf,
    /// Target path relative to the chat's export directory.
    pub target: String,
    /// Creation date to restore on the copied file, when known.
    pub created_at: Option<DateTime<Utc>>,
}

/// Everything the writer needs to export one chat. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    /// Sanitized directory name the chat exports under.
    pub chat_name: String,
    /// Transcript records in timestamp order.
    pub messages: Vec<PlannedMessage>,
    /// File copies, in message order.
    pub copies: Vec<PlannedCopy>,
    /// Attachments that had no manifest entry.
    pub missing: usize,
}

/// Builds the export plan for one chat.
///
/// Messages come out in the store's deterministic order; target filenames
/// are allocated from declared transfer names, deduplicating collisions
/// in message order with `-1`, `-2`… suffixes before the extension.
#[must_use]
pub fn plan(
    store: &ConversationStore,
    manifest: &BackupManifest,
    chat: &Chat,
    options: PlanOptions,
) -> ExportPlan {
    let mut messages = Vec::new();
    let mut copies = Vec::new();
    let mut missing = 0usize;
    let mut taken: HashSet<String> = HashSet::new();

    for message in store.messages(chat.id) {
        if message.is_empty() && !options.include_empty {
            continue;
        }

        let mut planned_attachments = Vec::with_capacity(message.attachments.len());
        for attachment in &message.attachments {
            let resolved = resolve_attachment(manifest, &attachment.domain, &attachment.relative_path);

            let path = match resolved {
                Some(source) => {
                    let name = allocate_target_name(&mut taken, &attachment.transfer_name);
                    let target = format!("{ATTACHMENTS_DIR}/{name}");
                    copies.push(PlannedCopy {
                        source,
                        target: target.clone(),
                        created_at: attachment.created_at,
                    });
                    Some(target)
                }
                None => {
                    tracing::debug!(
                        "Attachment {} ({}) not present in manifest",
                        attachment.id,
                        attachment.relative_path
                    );
                    missing += 1;
                    None
                }
            };

            planned_attachments.push(PlannedAttachment {
                name: attachment.transfer_name.clone(),
                path,
            });
        }

        messages.push(PlannedMessage {
            sender: message.sender.clone(),
            timestamp: message.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            body: message.body.clone(),
            attachments: planned_attachments,
        });
    }

    ExportPlan {
        chat_name: chat.export_name(),
        messages,
        copies,
        missing,
    }
}

/// Resolves an attachment's physical blob, trying the declared domain
/// first and known fallbacks after.
fn resolve_attachment(
    manifest: &BackupManifest,
    domain: &str,
    relative_path: &str,
) -> Option<PathBuf> {
    if let Some(path) = manifest.resolve_physical(domain, relative_path) {
        return Some(path);
    }
    ATTACHMENT_FALLBACK_DOMAINS
        .iter()
        .filter(|d| **d != domain)
        .find_map(|d| manifest.resolve_physical(d, relative_path))
}

/// Allocates a unique target filename, suffixing `-1`, `-2`… before the
/// extension on collision.
fn allocate_target_name(taken: &mut HashSet<String>, transfer_name: &str) -> String {
    let mut wanted = sanitize_name(transfer_name);
    if wanted.is_empty() {
        wanted = "attachment".to_string();
    }

    if taken.insert(wanted.clone()) {
        return wanted;
    }

    let (stem, ext) = split_extension(&wanted);
    for n in 1.. {
        let candidate = match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
    }
    unreachable!("suffix counter exhausted")
}

/// Splits `name.ext` at the last dot; dotfiles and bare names have no
/// extension.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => {
            (&name[..idx], Some(&name[idx + 1..]))
        }
        _ => (name, None),
    }
}
