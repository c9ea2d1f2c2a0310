//! Per-entry and whole-archive result shapes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryReport {
    pub original_path: String,
    pub safe_path: Option<String>,
    pub size: u64,
    pub file_type: String,
    pub valid: bool,
    pub error: Option<String>,
}

impl EntryReport {
    pub(crate) fn suspicious(original_path: String, size: u64, file_type: String, reason: &str) -> Self {
        Self {
            original_path,
            safe_path: None,
            size,
            file_type,
            valid: false,
            error: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub extraction_dir: PathBuf,
    pub entries: Vec<EntryReport>,
}

impl ExtractionResult {
    pub fn valid_entries(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| e.valid)
    }

    pub fn valid_count(&self) -> usize {
        self.valid_entries().count()
    }
}
