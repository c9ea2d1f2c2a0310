//! Submission options (`SubmitTask.options`).
//!
//! Modeled as an enumerated struct rather than a free-form map — unknown keys
//! are rejected by `serde` at deserialization time instead of silently
//! ignored, closing off the "dynamic config dictionary" anti-pattern.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> u32 {
    1000
}

fn default_chunk_overlap() -> u32 {
    100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePolicy {
    Permanent,
    Temporary,
}

impl Default for StoragePolicy {
    fn default() -> Self {
        StoragePolicy::Temporary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Openai,
    Openrouter,
    Litelm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Structured,
    Summary,
    FullText,
    Custom,
}

/// Per-task configuration, carried verbatim from submission through to every
/// derived subtask (children inherit `parent.options` unchanged per C7 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Options {
    #[serde(default = "default_true")]
    pub enable_vectorization: bool,

    #[serde(default)]
    pub storage_policy: StoragePolicy,

    #[serde(default)]
    pub max_cost_limit: Option<f64>,

    #[serde(default)]
    pub llm_provider: Option<LlmProvider>,

    #[serde(default)]
    pub model_name: Option<String>,

    #[serde(default)]
    pub extraction_mode: Option<ExtractionMode>,

    #[serde(default)]
    pub custom_prompt: Option<String>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    #[serde(default)]
    pub embedding_model: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enable_vectorization: true,
            storage_policy: StoragePolicy::Temporary,
            max_cost_limit: None,
            llm_provider: None,
            model_name: None,
            extraction_mode: None,
            custom_prompt: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_model: None,
        }
    }
}

/// Submission payload consumed from the HTTP layer. Dispatch rule lives in `dipc-worker::submission`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTask {
    pub file_urls: Vec<String>,
    pub user_id: String,
    #[serde(default)]
    pub options: Options,
}
