//! # Secure Archive Extractor (C4)
//!
//! Validates and unpacks a ZIP archive into a scoped directory, enforcing
//! zip-bomb, path-traversal, file-type, per-file, and aggregate limits
//! before a single byte is extracted.
//!
//! The two phases are deliberately separate: [`validate`](validate) never
//! touches the filesystem, so a hostile archive can be rejected (and the
//! parent task marked `failed` with `SECURITY_VIOLATION`) without ever
//! creating an extraction root.

mod error;
mod extract;
mod limits;
mod report;
mod sanitize;
mod validate;

pub use error::ArchiveError;
pub use limits::ArchiveLimits;
pub use report::{EntryReport, ExtractionResult};

use std::fs::File;
use std::path::Path;

use zip::ZipArchive;

/// Validates `zip_path` against `limits` and, if it passes, extracts all
/// valid entries into a fresh directory under `extraction_root_parent`
/// named `dipc-archive-<uuid>`.
///
/// Returns `Err` only for archive-level failures (`InvalidArchive`,
/// `TooManyFiles`, `ZipBomb`, `EmptyArchive`); per-entry problems never
/// fail the call, they are reported as invalid entries in the result.
pub fn validate_and_extract(
    zip_path: &Path,
    extraction_root_parent: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractionResult, ArchiveError> {
    let file = File::open(zip_path)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

    let plans = validate::validate(&mut archive, limits)?;

    let extraction_dir =
        extraction_root_parent.join(format!("dipc-archive-{}", uuid::Uuid::new_v4()));
    let entries = extract::extract(&mut archive, plans, &extraction_dir)?;

    tracing::info!(
        extraction_dir = %extraction_dir.display(),
        valid = entries.iter().filter(|e| e.valid).count(),
        suspicious = entries.iter().filter(|e| !e.valid).count(),
        "archive extraction complete"
    );

    Ok(ExtractionResult {
        extraction_dir,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    fn build_zip(entries: &[(&str, &[u8])]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = ZipWriter::new(file.reopen().unwrap());
        let opts = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            writer.start_file(*name, opts).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
        file
    }

    #[test]
    fn valid_archive_extracts_all_entries() {
        let zip = build_zip(&[("a.txt", b"hello"), ("b.json", b"{}")]);
        let tmp = tempfile::tempdir().unwrap();
        let result =
            validate_and_extract(zip.path(), tmp.path(), &ArchiveLimits::default()).unwrap();
        assert_eq!(result.valid_count(), 2);
        assert!(result.extraction_dir.exists());
        for entry in result.valid_entries() {
            let path = result.extraction_dir.join(entry.safe_path.as_ref().unwrap());
            assert!(path.exists());
        }
    }

    #[test]
    fn disallowed_extension_is_suspicious_but_does_not_fail_archive() {
        let zip = build_zip(&[("a.txt", b"ok"), ("payload.exe", b"bad")]);
        let tmp = tempfile::tempdir().unwrap();
        let result =
            validate_and_extract(zip.path(), tmp.path(), &ArchiveLimits::default()).unwrap();
        assert_eq!(result.valid_count(), 1);
        let suspicious = result.entries.iter().find(|e| !e.valid).unwrap();
        assert_eq!(suspicious.error.as_deref(), Some("Disallowed file type"));
    }

    #[test]
    fn path_traversal_entry_is_flagged() {
        let zip = build_zip(&[("../../etc/passwd.txt", b"nope"), ("good.txt", b"fine")]);
        let tmp = tempfile::tempdir().unwrap();
        let result =
            validate_and_extract(zip.path(), tmp.path(), &ArchiveLimits::default()).unwrap();
        assert_eq!(result.valid_count(), 1);
        let suspicious = result.entries.iter().find(|e| !e.valid).unwrap();
        assert_eq!(suspicious.error.as_deref(), Some("Path traversal"));
    }

    #[test]
    fn archive_with_only_suspicious_entries_is_empty_archive() {
        let zip = build_zip(&[("payload.exe", b"bad"), ("other.bin", b"bad2")]);
        let tmp = tempfile::tempdir().unwrap();
        let err = validate_and_extract(zip.path(), tmp.path(), &ArchiveLimits::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::EmptyArchive));
    }

    #[test]
    fn oversized_file_is_flagged_too_large() {
        let zip = build_zip(&[("big.txt", &vec![b'x'; 1024])]);
        let tmp = tempfile::tempdir().unwrap();
        let limits = ArchiveLimits {
            max_file_bytes: 100,
            ..ArchiveLimits::default()
        };
        let result = validate_and_extract(zip.path(), tmp.path(), &limits).unwrap_err();
        // every entry suspicious -> no valid entries -> EmptyArchive
        assert!(matches!(result, ArchiveError::EmptyArchive));
    }

    #[test]
    fn too_many_files_fails_before_extraction() {
        let entries: Vec<(String, Vec<u8>)> =
            (0..5).map(|i| (format!("f{i}.txt"), b"x".to_vec())).collect();
        let entry_refs: Vec<(&str, &[u8])> =
            entries.iter().map(|(n, c)| (n.as_str(), c.as_slice())).collect();
        let zip = build_zip(&entry_refs);
        let tmp = tempfile::tempdir().unwrap();
        let limits = ArchiveLimits {
            max_files: 2,
            ..ArchiveLimits::default()
        };
        let err = validate_and_extract(zip.path(), tmp.path(), &limits).unwrap_err();
        assert!(matches!(err, ArchiveError::TooManyFiles { found: 5, limit: 2 }));
    }

    #[test]
    fn duplicate_basenames_after_sanitization_are_deduplicated() {
        let zip = build_zip(&[("dir1/a.txt", b"one"), ("dir2/a.txt", b"two")]);
        let tmp = tempfile::tempdir().unwrap();
        let result =
            validate_and_extract(zip.path(), tmp.path(), &ArchiveLimits::default()).unwrap();
        assert_eq!(result.valid_count(), 2);
        let names: std::collections::HashSet<_> = result
            .valid_entries()
            .map(|e| e.safe_path.clone().unwrap())
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn invalid_archive_header_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a zip file").unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let err = validate_and_extract(file.path(), tmp.path(), &ArchiveLimits::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidArchive(_)));
    }
}
