//! Default and configurable limits for archive validation.

/// Compression ratio above which an entry is treated as a zip bomb even
/// if its declared uncompressed size alone would pass. Chosen generously
/// above typical text/office compression ratios (~10-20x) so legitimate
/// archives never trip it, while the classic "10KB -> 2GB" bomb does.
pub const MAX_COMPRESSION_RATIO: u64 = 100;

#[derive(Debug, Clone)]
pub struct ArchiveLimits {
    pub max_extracted_total_bytes: u64,
    pub max_file_bytes: u64,
    pub max_files: usize,
    pub allowed_extensions: Vec<String>,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_extracted_total_bytes: 200 * 1024 * 1024,
            max_file_bytes: 50 * 1024 * 1024,
            max_files: 1000,
            allowed_extensions: [
                "pdf", "jpg", "jpeg", "png", "gif", "webp", "txt", "md", "csv", "json", "docx",
                "xlsx", "doc",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl ArchiveLimits {
    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}
