//! Extraction phase: materializes valid entries under a
//! fresh, scoped extraction root, skipping everything the validation
//! phase flagged as suspicious.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::report::EntryReport;
use crate::sanitize::{is_descendant, join_under_root, sanitize_filename};
use crate::validate::EntryPlan;

/// Streams one entry's bytes to `dest`, refusing to write more than
/// `declared_size` bytes. On overrun the partial file is deleted and an
/// error entry is produced rather than a hard failure, since the rest of
/// the archive may still be perfectly extractable.
fn write_bounded(mut reader: impl Read, dest: &Path, declared_size: u64) -> std::io::Result<()> {
    let mut file = File::create(dest)?;
    let mut buf = [0u8; 64 * 1024];
    let mut written: u64 = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        written += n as u64;
        if written > declared_size {
            drop(file);
            let _ = std::fs::remove_file(dest);
            return Err(std::io::Error::other(format!(
                "entry stream exceeded declared size {declared_size} bytes"
            )));
        }
        file.write_all(&buf[..n])?;
    }
    Ok(())
}

pub(crate) fn extract(
    archive: &mut ZipArchive<File>,
    plans: Vec<EntryPlan>,
    extraction_root: &Path,
) -> Result<Vec<EntryReport>, ArchiveError> {
    std::fs::create_dir_all(extraction_root)?;

    let mut reports = Vec::with_capacity(plans.len());
    let mut used_names: HashSet<String> = HashSet::new();

    for plan in plans {
        match plan {
            EntryPlan::Suspicious {
                original_path,
                uncompressed_size,
                extension,
                reason,
            } => {
                reports.push(EntryReport::suspicious(
                    original_path,
                    uncompressed_size,
                    extension,
                    reason,
                ));
            }
            EntryPlan::Valid {
                index,
                original_path,
                uncompressed_size,
                extension,
            } => {
                let mut dedupe = 0usize;
                let safe_name = loop {
                    let candidate = sanitize_filename(&original_path, dedupe);
                    if used_names.insert(candidate.clone()) {
                        break candidate;
                    }
                    dedupe += 1;
                };

                let dest = join_under_root(extraction_root, &safe_name);
                if !is_descendant(extraction_root, &dest) {
                    reports.push(EntryReport::suspicious(
                        original_path,
                        uncompressed_size,
                        extension,
                        "Path traversal",
                    ));
                    continue;
                }

                let mut entry = archive
                    .by_index(index)
                    .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

                match write_bounded(&mut entry, &dest, uncompressed_size) {
                    Ok(()) => {
                        reports.push(EntryReport {
                            original_path,
                            safe_path: Some(safe_name),
                            size: uncompressed_size,
                            file_type: extension,
                            valid: true,
                            error: None,
                        });
                    }
                    Err(e) => {
                        reports.push(EntryReport::suspicious(
                            original_path,
                            uncompressed_size,
                            extension,
                            &format!("Stream exceeded declared size: {e}"),
                        ));
                    }
                }
            }
        }
    }

    Ok(reports)
}
