//! Export writing.
//!
//! Executes an `ExportPlan`: creates the chat's directories idempotently,
//! serializes the transcript, and copies attachment blobs. Per-file copy
//! failures are captured in the result and never abort the rest of the
//! chat.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::application::planner::{ExportPlan, ATTACHMENTS_DIR};
use crate::domain::{AppError, ChatExportResult, Result};

/// Transcript filename inside each chat's export directory.
pub const TRANSCRIPT_FILE: &str = "messages.json";

/// Writes one chat's plan under the output root.
///
/// Re-running against the same output root is safe: directories are
/// created idempotently and, with `overwrite` set, existing files are
/// replaced deterministically rather than accumulated.
///
/// # Errors
/// Returns error if the chat directory or transcript cannot be written;
/// individual attachment copy failures are recorded in the result
/// instead.
pub fn write(plan: &ExportPlan, output_root: &Path, overwrite: bool) -> Result<ChatExportResult> {
    let chat_dir = output_root.join(&plan.chat_name);
    fs::create_dir_all(&chat_dir).map_err(|e| {
        AppError::io(format!("Failed to create {}", chat_dir.display()), e)
    })?;

    let transcript_path = chat_dir.join(TRANSCRIPT_FILE);
    if overwrite || !transcript_path.exists() {
        let transcript = serde_json::to_string_pretty(&plan.messages).map_err(AppError::json)?;
        fs::write(&transcript_path, transcript.as_bytes()).map_err(|e| {
            AppError::io(format!("Failed to write {}", transcript_path.display()), e)
        })?;
    } else {
        tracing::debug!("Keeping existing {}", transcript_path.display());
    }

    let mut result = ChatExportResult {
        chat_name: plan.chat_name.clone(),
        messages_exported: plan.messages.len(),
        attachments_missing: plan.missing,
        ..ChatExportResult::default()
    };

    // Attachment dir only materializes when something will land in it
    if !plan.copies.is_empty() {
        let att_dir = chat_dir.join(ATTACHMENTS_DIR);
        fs::create_dir_all(&att_dir).map_err(|e| {
            AppError::io(format!("Failed to create {}", att_dir.display()), e)
        })?;
    }

    for copy in &plan.copies {
        let target = chat_dir.join(&copy.target);

        if !overwrite && target.exists() {
            tracing::debug!("Keeping existing {}", target.display());
            continue;
        }

        match fs::copy(&copy.source, &target) {
            Ok(_) => {
                result.attachments_copied += 1;
                if let Some(created_at) = copy.created_at {
                    restore_mtime(&target, created_at);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to copy {}: {}", copy.source.display(), e);
                result.copy_failures.push(format!(
                    "{}: {} -> {}: {}",
                    plan.chat_name,
                    copy.source.display(),
                    copy.target,
                    e
                ));
            }
        }
    }

    tracing::info!(
        "Exported {}: {} messages, {} attachments copied, {} missing",
        result.chat_name,
        result.messages_exported,
        result.attachments_copied,
        result.attachments_missing
    );

    Ok(result)
}

/// Best-effort restore of the attachment's creation date as the copied
/// file's modification time.
fn restore_mtime(target: &Path, created_at: DateTime<Utc>) {
    let Ok(secs) = u64::try_from(created_at.timestamp()) else {
        return;
    };
    let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(secs);

    let outcome = fs::File::options()
        .write(true)
        .open(target)
        .and_then(|file| file.set_modified(mtime));

    if let Err(e) = outcome {
        tracing::debug!("Could not set mtime on {}: {}", target.display(), e);
    }
}
