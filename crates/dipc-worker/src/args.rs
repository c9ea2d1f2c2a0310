//! Typed `args` payloads per queue.
//!
//! `QueueMessage::args` is `serde_json::Value` on the wire (so every queue
//! backend can stay payload-agnostic), but each stage handler only ever
//! needs one shape out of it — these structs are that shape, parsed once
//! at the top of `handle()`.

use dipc_domain::Options;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveArgs {
    pub file_url: String,
    pub user_id: String,
    pub options: Options,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseArgs {
    pub file_url: String,
    pub user_id: String,
    pub options: Options,
    /// `"archive_extraction"` when created by C7.
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizeArgs {
    pub content: Value,
    pub user_id: String,
    pub options: Options,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupMode {
    Expired,
    Extraction,
    /// FileMetadata rows whose backing object is gone.
    Orphaned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupArgs {
    pub mode: CleanupMode,
    #[serde(default)]
    pub extraction_dir: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
    /// Pagination cursor for `CleanupMode::Orphaned`'s paginated scan;
    /// re-derived by the handler when it reschedules itself.
    #[serde(default)]
    pub after_id: Option<String>,
}
