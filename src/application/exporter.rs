//! Export orchestration.
//!
//! Builds the manifest and conversation store once, up front, then runs
//! plan + write for each chat on a bounded pool of scoped worker threads.
//! Both indices are immutable after construction, so workers share them
//! by reference with no locking; per-chat results are merged post-hoc
//! into the run summary.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::planner::{self, PlanOptions};
use crate::application::writer;
use crate::domain::{AppError, Chat, ChatExportResult, ExportSummary, Result};
use crate::infrastructure::{
    locate_messages_db, BackupManifest, ConversationStore, ExportConfig, LoadOptions,
};

/// Upper bound on derived worker counts; copies are disk-bound and stop
/// scaling well past this.
const MAX_DERIVED_WORKERS: usize = 8;

/// Options for a full export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Export body-less, attachment-less rows.
    pub include_empty: bool,
    /// Worker count; 0 derives from available parallelism.
    pub concurrency: usize,
    /// Overwrite files already present in the output tree.
    pub overwrite: bool,
    /// Only export messages sent at or after this instant.
    pub min_date: Option<DateTime<Utc>>,
    /// Only export messages sent before this instant.
    pub max_date: Option<DateTime<Utc>>,
    /// Checked before each chat is claimed; a chat already in progress
    /// runs to completion.
    pub cancel: Arc<AtomicBool>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_empty: false,
            concurrency: 0,
            overwrite: true,
            min_date: None,
            max_date: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ExportOptions {
    /// Builds options from a loaded configuration file.
    #[must_use]
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            include_empty: config.include_empty_messages,
            concurrency: config.concurrency,
            overwrite: config.overwrite_existing,
            ..Self::default()
        }
    }
}

/// Runs the whole pipeline against one backup.
///
/// The messages database is itself resolved through the manifest before
/// the store can open it.
///
/// # Errors
/// Returns error only for fatal conditions: unreadable manifest or
/// messages database, or an uncreatable output root. Chat-level and
/// attachment-level failures land in the summary instead.
pub fn export_backup(
    backup_root: &Path,
    output_root: &Path,
    options: &ExportOptions,
) -> Result<ExportSummary> {
    let manifest = BackupManifest::load(backup_root)?;
    let db_path = locate_messages_db(&manifest)?;
    let store = ConversationStore::load_with(
        &db_path,
        LoadOptions {
            min_date: options.min_date,
            max_date: options.max_date,
        },
    )?;

    fs::create_dir_all(output_root).map_err(|e| {
        AppError::io(format!("Failed to create {}", output_root.display()), e)
    })?;

    Ok(export_chats(&store, &manifest, output_root, options))
}

/// Exports every chat in the store, concurrently, and merges the results.
#[must_use]
pub fn export_chats(
    store: &ConversationStore,
    manifest: &BackupManifest,
    output_root: &Path,
    options: &ExportOptions,
) -> ExportSummary {
    let chats = store.chats();
    let workers = worker_count(options.concurrency, chats.len());
    let cursor = AtomicUsize::new(0);

    tracing::info!(
        "Exporting {} chats with {} worker(s) to {}",
        chats.len(),
        workers,
        output_root.display()
    );

    let mut outcomes: Vec<(usize, Result<Option<ChatExportResult>>)> =
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut local = Vec::new();
                        loop {
                            if options.cancel.load(Ordering::Relaxed) {
                                tracing::info!("Cancellation requested; worker stopping");
                                break;
                            }
                            let index = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(chat) = chats.get(index) else {
                                break;
                            };
                            local.push((
                                index,
                                export_one(store, manifest, chat, output_root, options),
                            ));
                        }
                        local
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_default())
                .collect()
        });

    // Deterministic summary regardless of which worker ran what
    outcomes.sort_by_key(|(index, _)| *index);

    let mut summary = ExportSummary::default();
    for (index, outcome) in outcomes {
        summary.chats_processed += 1;
        match outcome {
            Ok(Some(result)) => summary.absorb(result),
            Ok(None) => {}
            Err(e) => {
                let name = chats.get(index).map_or_else(String::new, Chat::export_name);
                tracing::warn!("Chat {} failed: {}", name, e);
                summary.chat_errors.push((name, e.to_string()));
            }
        }
    }

    summary
}

/// Plans and writes a single chat.
///
/// Chats whose plan carries nothing exportable are skipped so stale
/// recipients don't litter the output tree with empty directories.
fn export_one(
    store: &ConversationStore,
    manifest: &BackupManifest,
    chat: &Chat,
    output_root: &Path,
    options: &ExportOptions,
) -> Result<Option<ChatExportResult>> {
    let plan = planner::plan(
        store,
        manifest,
        chat,
        PlanOptions {
            include_empty: options.include_empty,
        },
    );

    if plan.messages.is_empty() && plan.copies.is_empty() {
        tracing::debug!("Chat {} has nothing to export; skipped", plan.chat_name);
        return Ok(None);
    }

    writer::write(&plan, output_root, options.overwrite).map(Some)
}

/// Effective pool size for a run.
fn worker_count(configured: usize, chat_count: usize) -> usize {
    let derived = if configured > 0 {
        configured
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get().min(MAX_DERIVED_WORKERS))
            .unwrap_or(4)
    };
    derived.clamp(1, chat_count.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{apple_ns, create_blob, create_manifest_db, ManifestRow, MessagesDbBuilder};
    use std::path::PathBuf;
    use tempfile::tempdir;

    const SMS_DB_HASH: &str = "3d0d7e5fb2ce288813306e4d4636395e047a3d28";
    const IMAGE_HASH: &str = "ab11111111111111111111111111111111111111";

    /// Builds a complete fixture backup: manifest, sharded sms.db blob,
    /// and one attachment blob.
    fn build_backup(backup_root: &Path) {
        create_manifest_db(
            backup_root,
            &[
                ManifestRow {
                    file_id: SMS_DB_HASH,
                    domain: "com.apple.MobileSMS",
                    relative_path: "Library/SMS/sms.db",
                    flags: 1,
                },
                ManifestRow {
                    file_id: IMAGE_HASH,
                    domain: "MediaDomain",
                    relative_path: "Library/SMS/Attachments/ab/IMG_0001.JPG",
                    flags: 1,
                },
            ],
        );

        create_blob(backup_root, IMAGE_HASH, b"jpeg bytes");

        // The messages database is itself a sharded blob
        let db_path = sms_db_path(backup_root);
        std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();
        let db = MessagesDbBuilder::create(&db_path);
        db.add_handle(1, "+15551234567")
            .add_handle(2, "+15559876543")
            .add_handle(3, "+15550001111")
            .add_handle(4, "+15552223333")
            // 1:1 chat, one plain message
            .add_chat(1, "iMessage;-;+15551234567", &[1])
            .add_message(1, 1, apple_ns(1_600_000_000), 1, false, Some("hi"))
            // group chat with three participants and chat id 42
            .add_chat(42, "chat000042", &[2, 3, 4])
            .add_message(2, 42, apple_ns(1_600_000_100), 2, false, Some("photo"))
            .add_attachment(
                1,
                2,
                Some("~/Library/SMS/Attachments/ab/IMG_0001.JPG"),
                Some("image/jpeg"),
                Some("IMG_0001.JPG"),
            )
            .add_message(3, 42, apple_ns(1_600_000_200), 3, false, Some("lost one"))
            .add_attachment(
                2,
                3,
                Some("~/Library/SMS/Attachments/cd/GONE.JPG"),
                Some("image/jpeg"),
                Some("GONE.JPG"),
            );
    }

    fn sms_db_path(backup_root: &Path) -> PathBuf {
        backup_root.join(&SMS_DB_HASH[..2]).join(SMS_DB_HASH)
    }

    #[test]
    fn test_export_one_to_one_chat_scenario() {
        let backup = tempdir().unwrap();
        let out = tempdir().unwrap();
        build_backup(backup.path());

        let summary =
            export_backup(backup.path(), out.path(), &ExportOptions::default()).unwrap();

        assert_eq!(summary.chats_processed, 2);
        assert_eq!(summary.chats_exported, 2);
        assert!(summary.chat_errors.is_empty());

        let transcript =
            std::fs::read_to_string(out.path().join("+15551234567/messages.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&transcript).unwrap();
        let messages = parsed.as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["sender"], "+15551234567");
        assert_eq!(messages[0]["body"], "hi");
        assert_eq!(messages[0]["attachments"].as_array().unwrap().len(), 0);

        // No attachments subfolder for an attachment-less chat
        assert!(!out.path().join("+15551234567/attachments").exists());
    }

    #[test]
    fn test_export_group_chat_scenario() {
        let backup = tempdir().unwrap();
        let out = tempdir().unwrap();
        build_backup(backup.path());

        let summary =
            export_backup(backup.path(), out.path(), &ExportOptions::default()).unwrap();

        // Group chat exports under its synthetic stable name
        let chat_dir = out.path().join("chat42");
        assert!(chat_dir.join("messages.json").is_file());

        let copied = std::fs::read(chat_dir.join("attachments/IMG_0001.JPG")).unwrap();
        assert_eq!(copied, b"jpeg bytes");

        assert_eq!(summary.attachments_copied, 1);
        assert_eq!(summary.attachments_missing, 1);

        let transcript = std::fs::read_to_string(chat_dir.join("messages.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&transcript).unwrap();
        let messages = parsed.as_array().unwrap();
        assert_eq!(messages[1]["attachments"][0]["name"], "GONE.JPG");
        assert!(messages[1]["attachments"][0]["path"].is_null());
    }

    #[test]
    fn test_rerun_produces_identical_tree() {
        let backup = tempdir().unwrap();
        let out = tempdir().unwrap();
        build_backup(backup.path());

        export_backup(backup.path(), out.path(), &ExportOptions::default()).unwrap();
        let first = snapshot_tree(out.path());

        export_backup(backup.path(), out.path(), &ExportOptions::default()).unwrap();
        let second = snapshot_tree(out.path());

        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_manifest_is_fatal() {
        let backup = tempdir().unwrap();
        let out = tempdir().unwrap();

        let err =
            export_backup(backup.path(), out.path(), &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::ManifestLoad { .. }));
    }

    #[test]
    fn test_missing_messages_db_entry_is_fatal() {
        let backup = tempdir().unwrap();
        let out = tempdir().unwrap();
        create_manifest_db(backup.path(), &[]);

        let err =
            export_backup(backup.path(), out.path(), &ExportOptions::default()).unwrap_err();
        assert!(matches!(err, AppError::StoreLoad { .. }));
    }

    #[test]
    fn test_cancellation_before_start_exports_nothing() {
        let backup = tempdir().unwrap();
        let out = tempdir().unwrap();
        build_backup(backup.path());

        let options = ExportOptions::default();
        options.cancel.store(true, Ordering::Relaxed);

        let summary = export_backup(backup.path(), out.path(), &options).unwrap();
        assert_eq!(summary.chats_processed, 0);
        assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_failed_chat_recorded_and_run_continues() {
        let backup = tempdir().unwrap();
        let out = tempdir().unwrap();
        build_backup(backup.path());

        let manifest = BackupManifest::load(backup.path()).unwrap();
        let db_path = locate_messages_db(&manifest).unwrap();
        let store = ConversationStore::load(&db_path).unwrap();

        // A regular file where the output root should be makes every
        // chat directory creation fail
        let output_root = out.path().join("exports");
        std::fs::write(&output_root, b"in the way").unwrap();

        let summary = export_chats(&store, &manifest, &output_root, &ExportOptions::default());

        assert_eq!(summary.chats_processed, 2);
        assert_eq!(summary.chats_exported, 0);
        assert_eq!(summary.chat_errors.len(), 2);

        let failed: Vec<&str> = summary
            .chat_errors
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert!(failed.contains(&"+15551234567"));
        assert!(failed.contains(&"chat42"));
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(4, 100), 4);
        assert_eq!(worker_count(4, 2), 2);
        assert_eq!(worker_count(0, 0), 1);
        assert!(worker_count(0, 100) >= 1);
    }

    /// Sorted (relative path, contents) listing of a directory tree.
    fn snapshot_tree(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                    files.push((rel, std::fs::read(&path).unwrap()));
                }
            }
        }
        files.sort();
        files
    }
}
