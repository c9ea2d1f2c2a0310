//! Validation phase: inspects every entry's metadata
//! without extracting anything, partitioning the archive into valid and
//! suspicious entries before a single byte is written to disk.

use std::fs::File;

use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::limits::{ArchiveLimits, MAX_COMPRESSION_RATIO};
use crate::sanitize::{extension_of, is_path_traversal};

#[derive(Debug)]
pub(crate) enum EntryPlan {
    Valid {
        index: usize,
        original_path: String,
        uncompressed_size: u64,
        extension: String,
    },
    Suspicious {
        original_path: String,
        uncompressed_size: u64,
        extension: String,
        reason: &'static str,
    },
}

/// Runs the validation phase over an already-opened archive, returning
/// one [`EntryPlan`] per entry. Fails fast (before any extraction) on
/// structural problems: too many entries, or a declared-size/compression
/// profile consistent with a zip bomb.
pub(crate) fn validate(
    archive: &mut ZipArchive<File>,
    limits: &ArchiveLimits,
) -> Result<Vec<EntryPlan>, ArchiveError> {
    let entry_count = archive.len();
    if entry_count > limits.max_files {
        return Err(ArchiveError::TooManyFiles {
            found: entry_count,
            limit: limits.max_files,
        });
    }

    let mut plans = Vec::with_capacity(entry_count);
    let mut total_uncompressed: u64 = 0;

    for index in 0..entry_count {
        let entry = archive
            .by_index(index)
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

        let original_path = entry.name().to_string();

        // Directory entries carry no content; skip them entirely, they
        // are implicitly recreated by the flat sanitized layout.
        if entry.is_dir() {
            continue;
        }

        let uncompressed_size = entry.size();
        let compressed_size = entry.compressed_size();
        let extension = extension_of(&original_path);

        total_uncompressed = total_uncompressed.saturating_add(uncompressed_size);
        if total_uncompressed > limits.max_extracted_total_bytes {
            return Err(ArchiveError::ZipBomb {
                reason: format!(
                    "declared uncompressed total {total_uncompressed} bytes exceeds limit {}",
                    limits.max_extracted_total_bytes
                ),
            });
        }

        if compressed_size > 0 {
            let ratio = uncompressed_size / compressed_size.max(1);
            if ratio > MAX_COMPRESSION_RATIO {
                return Err(ArchiveError::ZipBomb {
                    reason: format!(
                        "entry '{original_path}' has compression ratio {ratio}x, exceeding the {MAX_COMPRESSION_RATIO}x threshold"
                    ),
                });
            }
        }

        if is_path_traversal(&original_path) {
            plans.push(EntryPlan::Suspicious {
                original_path,
                uncompressed_size,
                extension,
                reason: "Path traversal",
            });
            continue;
        }

        if uncompressed_size > limits.max_file_bytes {
            plans.push(EntryPlan::Suspicious {
                original_path,
                uncompressed_size,
                extension,
                reason: "File too large",
            });
            continue;
        }

        if !limits.allows_extension(&extension) {
            plans.push(EntryPlan::Suspicious {
                original_path,
                uncompressed_size,
                extension,
                reason: "Disallowed file type",
            });
            continue;
        }

        plans.push(EntryPlan::Valid {
            index,
            original_path,
            uncompressed_size,
            extension,
        });
    }

    let has_valid = plans.iter().any(|p| matches!(p, EntryPlan::Valid { .. }));
    if !has_valid {
        return Err(ArchiveError::EmptyArchive);
    }

    Ok(plans)
}
