//! External collaborator contracts. The core depends only on
//! these traits; concrete preprocessors, LLM clients, vector stores, and
//! downloaders are out of scope and are injected by the
//! binary crate that assembles a worker process.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;

/// `Preprocess(file_url) -> ProcessedDocument`.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub format: String,
    pub text_content: Option<String>,
    pub image_paths: Vec<String>,
    pub metadata: Value,
    pub original_filename: String,
    pub file_size: u64,
}

#[async_trait]
pub trait Preprocess: Send + Sync {
    async fn preprocess(&self, file_url: &str) -> Result<ProcessedDocument, HandlerError>;
}

/// Realized token usage from one `Extract` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// One block of user content sent to the LLM: text, or an inline image.
#[derive(Debug, Clone)]
pub enum UserContentBlock {
    Text(String),
    ImageBase64 { media_type: String, data: String },
}

/// `Extract(system, user) -> (content, usage)`.
///
/// Returns the provider's raw textual response rather than a pre-parsed
/// `Value`: the caller (C8) attempts the JSON parse itself and wraps the
/// result as `{raw_response, parse_error}` on failure, so the parse has to
/// happen on this side of the seam.
#[async_trait]
pub trait Extract: Send + Sync {
    async fn extract(
        &self,
        system_prompt: &str,
        user_content: &[UserContentBlock],
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<(String, RawTokenUsage), HandlerError>;
}

/// A single chunk's vector-store document.
#[derive(Debug, Clone)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

/// `StoreDocuments([...]) -> [id]`.
#[async_trait]
pub trait StoreDocuments: Send + Sync {
    async fn store_documents(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>, HandlerError>;
}

/// Embedding provider consumed by C9, called once per batch of chunks.
#[async_trait]
pub trait EmbedBatch: Send + Sync {
    /// Returns one embedding per input chunk, each of `expected_dim` length.
    async fn embed_batch(&self, chunks: &[String], expected_dim: usize) -> Result<Vec<Vec<f32>>, HandlerError>;
}

/// Streamed HTTP download with a running byte counter, used by C7 to fetch
/// archives.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Downloads `url` into a local temp file, aborting if `Content-Length`
    /// or the streamed byte count exceeds `max_bytes`. Returns the local
    /// path and the number of bytes written.
    async fn download(&self, url: &str, max_bytes: u64) -> Result<(std::path::PathBuf, u64), HandlerError>;
}

/// Lightweight metadata about a file, fetched without downloading its full
/// body — feeds the cost gate before C8 calls `Preprocess`, via a
/// HEAD-then-GET-fallback probe.
#[derive(Debug, Clone)]
pub struct FileProbe {
    pub filename: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ProbeFile: Send + Sync {
    async fn probe(&self, file_url: &str) -> Result<FileProbe, HandlerError>;
}

/// The object-storage backend behind `FileMetadata::storage_path`. C10 mode A deletes expired objects, mode B checks existence before dropping metadata.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Deletes the object at `storage_path`. Treats "object not found" as
    /// success.
    async fn delete(&self, storage_path: &str) -> Result<(), HandlerError>;

    /// Returns whether an object still exists at `storage_path`.
    async fn exists(&self, storage_path: &str) -> Result<bool, HandlerError>;
}
