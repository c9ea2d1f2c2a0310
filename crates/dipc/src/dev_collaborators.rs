//! Local stand-ins for the collaborators the core treats as external:
//! concrete document preprocessors, LLM provider clients, and the vector
//! database. These let a worker process actually run end-to-end for local
//! development; a real deployment swaps them for provider-backed
//! implementations of the same [`dipc_worker::collaborators`] traits.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;
use dipc_worker::{
    EmbedBatch, Extract, HandlerError, Preprocess, ProcessedDocument, RawTokenUsage, StoreDocuments, UserContentBlock,
    VectorDocument,
};
use serde_json::json;

/// Reads the file's raw bytes and treats them as text when valid UTF-8.
/// No OCR, PDF layout analysis, or DOCX unpacking is attempted — that
/// belongs to the real per-format preprocessors this stands in for.
pub struct PlainTextPreprocessor;

#[async_trait]
impl Preprocess for PlainTextPreprocessor {
    async fn preprocess(&self, file_url: &str) -> Result<ProcessedDocument, HandlerError> {
        let bytes = if let Some(path) = file_url.strip_prefix("local://") {
            tokio::fs::read(path)
                .await
                .map_err(|e| HandlerError::validation(format!("cannot read {path}: {e}")))?
        } else {
            let response = reqwest::get(file_url)
                .await
                .map_err(|e| HandlerError::transient_io(format!("download failed: {e}")))?;
            response
                .bytes()
                .await
                .map_err(|e| HandlerError::transient_io(format!("body read failed: {e}")))?
                .to_vec()
        };

        let original_filename = file_url.rsplit('/').next().unwrap_or("unknown_file").to_string();
        let format = original_filename.rsplit('.').next().unwrap_or("bin").to_lowercase();
        let text_content = String::from_utf8(bytes.clone()).ok();

        Ok(ProcessedDocument {
            format,
            text_content,
            image_paths: Vec::new(),
            metadata: json!({"byte_length": bytes.len()}),
            original_filename,
            file_size: bytes.len() as u64,
        })
    }
}

/// Deterministic pseudo-extraction: wraps the preprocessed text back up as
/// JSON instead of calling a real model. Good enough to exercise C8's
/// post-processing and C9's chunking/embedding pipeline locally.
pub struct EchoExtractor;

#[async_trait]
impl Extract for EchoExtractor {
    async fn extract(
        &self,
        system_prompt: &str,
        user_content: &[UserContentBlock],
        _model: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<(String, RawTokenUsage), HandlerError> {
        let text: String = user_content
            .iter()
            .filter_map(|block| match block {
                UserContentBlock::Text(t) => Some(t.as_str()),
                UserContentBlock::ImageBase64 { .. } => None,
            })
            .collect();

        let content = json!({"text": text, "confidence": 0.8}).to_string();
        let usage = RawTokenUsage {
            prompt_tokens: (system_prompt.len() + text.len()) as u64 / 4,
            completion_tokens: content.len() as u64 / 4,
            total_tokens: (system_prompt.len() + text.len() + content.len()) as u64 / 4,
        };
        Ok((content, usage))
    }
}

/// Hashes each chunk into a fixed-dimension unit vector. Not a real
/// embedding model; stands in for one so C9 can be exercised without a
/// network call.
pub struct HashEmbedder;

#[async_trait]
impl EmbedBatch for HashEmbedder {
    async fn embed_batch(&self, chunks: &[String], expected_dim: usize) -> Result<Vec<Vec<f32>>, HandlerError> {
        Ok(chunks
            .iter()
            .map(|chunk| {
                let mut vector = vec![0.0f32; expected_dim];
                for (i, slot) in vector.iter_mut().enumerate() {
                    let mut hasher = DefaultHasher::new();
                    (chunk, i).hash(&mut hasher);
                    *slot = (hasher.finish() % 1000) as f32 / 1000.0;
                }
                vector
            })
            .collect())
    }
}

/// In-process vector store, lost on process exit. Wired by default so the
/// runtime has somewhere to write `VectorDocument`s during local runs.
#[derive(Default)]
pub struct InMemoryVectorStore {
    documents: Mutex<Vec<VectorDocument>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreDocuments for InMemoryVectorStore {
    async fn store_documents(&self, documents: Vec<VectorDocument>) -> Result<Vec<String>, HandlerError> {
        let ids = documents.iter().map(|d| d.id.clone()).collect();
        self.documents.lock().expect("vector store mutex poisoned").extend(documents);
        Ok(ids)
    }
}
