//! Filename and path sanitization.

use std::path::{Component, Path, PathBuf};

/// Maximum length, in bytes, of a sanitized filename component.
const MAX_NAME_LEN: usize = 100;

/// True if `name` is absolute, escapes its own directory via `..`, or
/// otherwise cannot be confined to an extraction root.
pub fn is_path_traversal(name: &str) -> bool {
    let path = Path::new(name);
    if path.is_absolute() {
        return true;
    }
    path.components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}

/// Returns the lowercase extension (without the dot), or an empty string
/// if the entry has none.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Produces a flat, filesystem-safe basename for `name`: strips all
/// directory components, replaces non-portable characters, and caps
/// length at [`MAX_NAME_LEN`] bytes while preserving the extension.
pub fn sanitize_filename(name: &str, dedupe_suffix: usize) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("file");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = if cleaned.is_empty() { "file".to_string() } else { cleaned };

    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (cleaned.clone(), None),
    };

    let suffix = if dedupe_suffix > 0 {
        format!("_{dedupe_suffix}")
    } else {
        String::new()
    };
    let ext_suffix = ext.as_ref().map(|e| format!(".{e}")).unwrap_or_default();
    let budget = MAX_NAME_LEN.saturating_sub(suffix.len() + ext_suffix.len());
    let truncated_stem: String = stem.chars().take(budget.max(1)).collect();

    format!("{truncated_stem}{suffix}{ext_suffix}")
}

/// Resolves `candidate` (already joined under `root`) and verifies it is
/// still a descendant of `root` after normalization. Since the candidate
/// is built from a sanitized flat filename this mainly guards against
/// future regressions in [`sanitize_filename`].
pub fn is_descendant(root: &Path, candidate: &Path) -> bool {
    match candidate.strip_prefix(root) {
        Ok(rest) => !rest
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_))),
        Err(_) => false,
    }
}

pub fn join_under_root(root: &Path, safe_name: &str) -> PathBuf {
    root.join(safe_name)
}
