//! Vectorization Handler.
//!
//! Flattens extracted content into chunks, embeds them in one batch call,
//! and bulk-writes the resulting vector documents.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dipc_queue::QueueMessage;
use serde_json::{json, Value};

use crate::args::VectorizeArgs;
use crate::collaborators::{EmbedBatch, StoreDocuments, VectorDocument};
use crate::context::WorkerContext;
use crate::error::HandlerError;
use crate::runtime::{HandlerOutcome, StageHandler};

const MIN_CONTENT_LEN: usize = 10;

pub struct VectorizationHandler {
    embedder: Arc<dyn EmbedBatch>,
    store: Arc<dyn StoreDocuments>,
    embedding_dim: usize,
}

impl VectorizationHandler {
    pub fn new(embedder: Arc<dyn EmbedBatch>, store: Arc<dyn StoreDocuments>, embedding_dim: usize) -> Self {
        Self {
            embedder,
            store,
            embedding_dim,
        }
    }
}

/// Flatten `content` into a single string.
fn flatten_content(content: &Value) -> String {
    if let Some(s) = content.as_str() {
        return s.to_string();
    }
    let Value::Object(map) = content else {
        return String::new();
    };

    let mut lines = Vec::new();
    for key in ["text", "content", "summary"] {
        if let Some(Value::String(s)) = map.get(key) {
            lines.push(s.clone());
        }
    }
    if let Some(Value::Object(extracted)) = map.get("extracted_content") {
        for (key, value) in extracted {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("{key}: {rendered}"));
        }
    }
    lines.join("\n")
}

/// Slide a window of `chunk_size` bytes with `overlap` bytes back-tracking,
/// breaking at the last whitespace boundary within the window. Discards empty chunks.
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let bytes = text.as_bytes();
    let len = bytes.len();
    if len == 0 {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let mut end = (start + chunk_size).min(len);
        if end < len {
            if let Some(break_at) = text[start..end].rfind(char::is_whitespace) {
                // Only break early if it doesn't collapse the window to nothing.
                if break_at > 0 {
                    end = start + break_at;
                }
            }
        }
        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end <= start {
            break;
        }
        start = if end >= len { end } else { end.saturating_sub(overlap).max(start + 1) };
    }
    chunks
}

#[async_trait]
impl StageHandler for VectorizationHandler {
    async fn handle(&self, ctx: &WorkerContext, message: &QueueMessage) -> Result<HandlerOutcome, HandlerError> {
        let args: VectorizeArgs = serde_json::from_value(message.args.clone())
            .map_err(|e| HandlerError::validation(format!("malformed vectorize args: {e}")))?;

        if !args.options.enable_vectorization {
            return Ok(HandlerOutcome::Completed {
                results: json!({"vectorized": false, "reason": "vectorization_disabled"}),
                actual_cost_usd: None,
                token_usage: None,
            });
        }

        let flattened = flatten_content(&args.content);
        if flattened.trim().chars().count() < MIN_CONTENT_LEN {
            return Ok(HandlerOutcome::Completed {
                results: json!({"vectorized": false, "reason": "content_too_short"}),
                actual_cost_usd: None,
                token_usage: None,
            });
        }

        let chunk_size = args.options.chunk_size.max(1) as usize;
        let overlap = (args.options.chunk_overlap as usize).min(chunk_size.saturating_sub(1));
        let chunks = chunk_text(&flattened, chunk_size, overlap);
        if chunks.is_empty() {
            return Ok(HandlerOutcome::Completed {
                results: json!({"vectorized": false, "reason": "no_chunks_produced"}),
                actual_cost_usd: None,
                token_usage: None,
            });
        }

        let embeddings = self.embedder.embed_batch(&chunks, self.embedding_dim).await?;
        if embeddings.len() != chunks.len() {
            return Err(HandlerError::validation(format!(
                "embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let chunk_count = chunks.len();
        let created_at = Utc::now();
        let documents: Vec<VectorDocument> = chunks
            .into_iter()
            .zip(embeddings.into_iter())
            .enumerate()
            .map(|(idx, (content, embedding))| {
                let mut metadata = args.metadata.clone();
                if let Value::Object(ref mut map) = metadata {
                    map.insert("task_id".to_string(), json!(ctx.task_id));
                    map.insert("chunk_index".to_string(), json!(idx));
                    map.insert("chunk_count".to_string(), json!(chunk_count));
                    map.insert("created_at".to_string(), json!(created_at.to_rfc3339()));
                }
                VectorDocument {
                    id: format!("{}_{}", ctx.task_id, idx),
                    content,
                    metadata,
                    embedding,
                }
            })
            .collect();

        let stored_ids = self.store.store_documents(documents).await?;

        Ok(HandlerOutcome::Completed {
            results: json!({"vectorized": true, "chunk_count": chunk_count, "document_ids": stored_ids}),
            actual_cost_usd: None,
            token_usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_breaks_at_whitespace_and_drops_empty_chunks() {
        let text = "the quick brown fox jumps over the lazy dog and then keeps running";
        let chunks = chunk_text(text, 20, 5);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(!chunk.is_empty());
        }
        assert!(chunks.join(" ").contains("quick brown"));
    }

    #[test]
    fn flatten_prefers_named_text_fields() {
        let content = json!({"summary": "short summary", "extracted_content": {"title": "Report"}});
        let flat = flatten_content(&content);
        assert!(flat.contains("short summary"));
        assert!(flat.contains("title: Report"));
    }

    #[test]
    fn flatten_passes_through_plain_strings() {
        assert_eq!(flatten_content(&json!("hello world")), "hello world");
    }
}
