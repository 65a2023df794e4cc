//! Application layer - use cases and orchestration.
//!
//! This layer contains the main business logic for planning and
//! executing exports.

pub mod exporter;
pub mod formatter;
pub mod planner;
pub mod writer;

pub use exporter::{export_backup, export_chats, ExportOptions};
pub use formatter::{format_chats_table, format_summary};
pub use planner::{plan, ExportPlan, PlanOptions, ATTACHMENTS_DIR};
pub use writer::{write, TRANSCRIPT_FILE};
