//! Output formatting for chat listings and run summaries.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::ExportSummary;
use crate::infrastructure::ConversationStore;

/// Formats a table listing of the store's chats.
pub fn format_chats_table(store: &ConversationStore) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["ID", "Name", "Kind", "Participants", "Msgs"]);

    for chat in store.chats() {
        let kind = if chat.is_group() { "group" } else { "1:1" };
        let participants = if chat.participants.is_empty() {
            "-".to_string()
        } else {
            truncate(&chat.participants.join(", "), 40)
        };

        table.add_row(vec![
            chat.id.to_string(),
            chat.export_name(),
            kind.to_string(),
            participants,
            store.messages(chat.id).len().to_string(),
        ]);
    }

    table.to_string()
}

/// Formats the aggregate run summary for display.
pub fn format_summary(summary: &ExportSummary) -> String {
    let mut out = format!(
        "{}\n  Chats processed: {}\n  Chats exported: {}\n  Messages exported: {}\n  Attachments copied: {}\n  Attachments missing: {}",
        "Export summary".bold(),
        summary.chats_processed.to_string().cyan(),
        summary.chats_exported.to_string().cyan(),
        summary.messages_exported.to_string().green(),
        summary.attachments_copied.to_string().green(),
        summary.attachments_missing.to_string().yellow(),
    );

    if !summary.copy_failures.is_empty() {
        out.push_str(&format!(
            "\n  Copy failures: {}",
            summary.copy_failures.len().to_string().red()
        ));
        for failure in &summary.copy_failures {
            out.push_str(&format!("\n    {failure}"));
        }
    }

    if !summary.chat_errors.is_empty() {
        out.push_str(&format!(
            "\n  Failed chats: {}",
            summary.chat_errors.len().to_string().red()
        ));
        for (chat, error) in &summary.chat_errors {
            out.push_str(&format!("\n    {chat}: {error}"));
        }
    }

    out
}

/// Truncates a string to max length (in chars) with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
