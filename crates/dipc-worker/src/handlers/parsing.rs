//! Parsing Handler.
//!
//! Cost-gates via C3 before touching the file, preprocesses, calls the LLM
//! extractor, computes actual cost from realized token usage, and
//! optionally hands the extracted content off to C9.

use std::sync::Arc;

use async_trait::async_trait;
use dipc_cost::{breakdown, estimate_from_file_info, gate, GateDecision};
use dipc_domain::{ExtractionMode, LlmProvider, Options, TokenUsage};
use dipc_queue::{QueueFabric, QueueMessage, QueueName};
use serde_json::{json, Value};

use crate::args::{ParseArgs, VectorizeArgs};
use crate::collaborators::{Extract, Preprocess, ProcessedDocument, ProbeFile, UserContentBlock};
use crate::context::WorkerContext;
use crate::error::HandlerError;
use crate::runtime::{HandlerOutcome, StageHandler};

const DEFAULT_MODEL: &str = "gpt-4-vision-preview";
const DEFAULT_PROVIDER: &str = "openai";
const DEFAULT_CONFIDENCE: f64 = 0.8;
const PARSE_ERROR_CONFIDENCE: f64 = 0.3;
const MAX_INLINE_IMAGES: usize = 3;

pub struct ParsingHandler {
    prober: Arc<dyn ProbeFile>,
    preprocessor: Arc<dyn Preprocess>,
    extractor: Arc<dyn Extract>,
    queue: Arc<dyn QueueFabric>,
    llm_timeout_secs: u64,
}

impl ParsingHandler {
    pub fn new(
        prober: Arc<dyn ProbeFile>,
        preprocessor: Arc<dyn Preprocess>,
        extractor: Arc<dyn Extract>,
        queue: Arc<dyn QueueFabric>,
        llm_timeout_secs: u64,
    ) -> Self {
        Self {
            prober,
            preprocessor,
            extractor,
            queue,
            llm_timeout_secs,
        }
    }

    fn provider_name(options: &Options) -> &'static str {
        match options.llm_provider {
            Some(LlmProvider::Openai) => "openai",
            Some(LlmProvider::Openrouter) => "openrouter",
            Some(LlmProvider::Litelm) => "litellm",
            None => DEFAULT_PROVIDER,
        }
    }

    fn system_prompt(options: &Options) -> String {
        match options.extraction_mode.unwrap_or(ExtractionMode::Structured) {
            ExtractionMode::Structured => {
                "Extract the document's content as structured JSON. Identify fields, tables, and \
                 sections; respond with a single JSON object only."
                    .to_string()
            }
            ExtractionMode::Summary => {
                "Summarize the document's content concisely. Respond with a single JSON object \
                 containing a `summary` field."
                    .to_string()
            }
            ExtractionMode::FullText => {
                "Transcribe the document's full text verbatim. Respond with a single JSON object \
                 containing a `text` field."
                    .to_string()
            }
            ExtractionMode::Custom => options
                .custom_prompt
                .clone()
                .unwrap_or_else(|| "Extract the document's content as structured JSON.".to_string()),
        }
    }

    fn user_content(doc: &ProcessedDocument, supports_vision: bool) -> Vec<UserContentBlock> {
        let mut blocks = Vec::new();
        let mut text = String::new();
        if let Some(body) = &doc.text_content {
            text.push_str(body);
        }
        text.push_str(&format!(
            "\n\n---\nformat: {}\nfilename: {}\nmetadata: {}\n",
            doc.format, doc.original_filename, doc.metadata
        ));
        blocks.push(UserContentBlock::Text(text));

        if supports_vision {
            for image_path in doc.image_paths.iter().take(MAX_INLINE_IMAGES) {
                if let Ok(bytes) = std::fs::read(image_path) {
                    use base64::Engine;
                    blocks.push(UserContentBlock::ImageBase64 {
                        media_type: guess_image_media_type(image_path),
                        data: base64::engine::general_purpose::STANDARD.encode(bytes),
                    });
                }
            }
        }
        blocks
    }
}

fn guess_image_media_type(path: &str) -> String {
    let lower = path.to_lowercase();
    if lower.ends_with(".png") {
        "image/png".to_string()
    } else if lower.ends_with(".gif") {
        "image/gif".to_string()
    } else if lower.ends_with(".webp") {
        "image/webp".to_string()
    } else {
        "image/jpeg".to_string()
    }
}

/// Parse `content_json` as JSON; wrap as `{raw_response, parse_error}` with
/// confidence 0.3 if it is not valid JSON.
fn parse_or_wrap(content_json: &str) -> (Value, f64) {
    match serde_json::from_str::<Value>(content_json) {
        Ok(parsed) => (parsed, DEFAULT_CONFIDENCE),
        Err(e) => (
            json!({"raw_response": content_json, "parse_error": e.to_string()}),
            PARSE_ERROR_CONFIDENCE,
        ),
    }
}

/// Extract the confidence the model reported, defaulting to
/// `DEFAULT_CONFIDENCE` when absent or when the response had to be wrapped.
fn extract_confidence(parsed: &Value, fallback: f64) -> f64 {
    parsed
        .get("metadata")
        .and_then(|m| m.get("confidence"))
        .and_then(|c| c.as_f64())
        .unwrap_or(fallback)
}

/// `true` when the parsed content carries extractable text worth vectorizing.
fn has_extractable_text(parsed: &Value) -> bool {
    let text_like = |v: &Value| v.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false);
    ["text", "content", "summary", "extracted_content"]
        .iter()
        .any(|key| parsed.get(*key).map(text_like).unwrap_or(false))
        || parsed.as_str().map(|s| !s.trim().is_empty()).unwrap_or(false)
}

#[async_trait]
impl StageHandler for ParsingHandler {
    async fn handle(&self, ctx: &WorkerContext, message: &QueueMessage) -> Result<HandlerOutcome, HandlerError> {
        ctx.check_cancelled().await?;

        let args: ParseArgs = serde_json::from_value(message.args.clone())
            .map_err(|e| HandlerError::validation(format!("malformed parse args: {e}")))?;

        let model_name = args.options.model_name.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let provider = Self::provider_name(&args.options);

        // Step 2: cost gate, never touching the file body.
        let probe = self.prober.probe(&args.file_url).await?;
        let estimate = estimate_from_file_info(
            &probe.filename,
            probe.size_bytes,
            &model_name,
            provider,
            probe.content_type.as_deref(),
        );
        if let GateDecision::Reject { reason } = gate(&estimate, args.options.max_cost_limit) {
            return Err(HandlerError::cost_limit_exceeded(reason).with_results(json!({
                "cost_estimate": breakdown(&estimate),
                "processing_stage": "cost_validation",
            })));
        }

        ctx.check_cancelled().await?;

        // Step 3: preprocess.
        let doc = self.preprocessor.preprocess(&args.file_url).await.map_err(|e| {
            e.with_results(json!({
                "cost_estimate": breakdown(&estimate),
                "processing_stage": "preprocessing",
            }))
        })?;

        let pricing_supports_vision = dipc_cost::pricing::pricing_for(&model_name).supports_vision;
        let system_prompt = Self::system_prompt(&args.options);
        let user_content = Self::user_content(&doc, pricing_supports_vision);

        ctx.check_cancelled().await?;

        // Step 5: LLM extraction, bounded by the configured per-call timeout.
        let (content_json, usage) = tokio::time::timeout(
            std::time::Duration::from_secs(self.llm_timeout_secs),
            self.extractor.extract(&system_prompt, &user_content, &model_name, 4096, 0.2),
        )
        .await
        .map_err(|_| HandlerError::provider(None, format!("LLM extraction timed out after {}s", self.llm_timeout_secs)))??;

        let (mut parsed, parse_confidence) = parse_or_wrap(&content_json);
        let confidence = extract_confidence(&parsed, parse_confidence);

        // Step 6: post-process, attaching document/provider metadata.
        if let Value::Object(ref mut map) = parsed {
            map.insert(
                "metadata".to_string(),
                json!({
                    "confidence": confidence,
                    "document_format": doc.format,
                    "original_filename": doc.original_filename,
                    "provider": provider,
                    "model_name": model_name,
                    "processing_stages_completed": [
                        "cost_validation",
                        "preprocessing",
                        "extraction",
                        "result_storage",
                    ],
                }),
            );
        }

        ctx.check_cancelled().await?;

        let actual_cost_usd = dipc_cost::actual_cost(usage.prompt_tokens, usage.completion_tokens, &model_name);
        let token_usage = TokenUsage {
            prompt: usage.prompt_tokens,
            completion: usage.completion_tokens,
            total: usage.total_tokens,
            cost: actual_cost_usd,
        };

        let results = json!({
            "extracted_content": parsed,
            "confidence_score": confidence,
            "cost_estimate": breakdown(&estimate),
            "document_format": doc.format,
            "original_filename": doc.original_filename,
        });

        // Step 9: vectorization is best-effort and never fails the parse.
        if args.options.enable_vectorization && has_extractable_text(&parsed) {
            let vectorize_args = VectorizeArgs {
                content: parsed.clone(),
                user_id: args.user_id.clone(),
                options: args.options.clone(),
                metadata: json!({
                    "source_task_id": ctx.task_id,
                    "original_filename": doc.original_filename,
                }),
            };
            match serde_json::to_value(vectorize_args) {
                Ok(vargs) => {
                    let msg = QueueMessage::new(ctx.task_id.clone(), vargs).with_correlation_id(message.correlation_id.clone());
                    if let Err(e) = self.queue.enqueue(QueueName::Vectorize, msg).await {
                        tracing::warn!(task_id = %ctx.task_id, error = %e, "failed to enqueue vectorization, parse still succeeds");
                    }
                }
                Err(e) => {
                    tracing::warn!(task_id = %ctx.task_id, error = %e, "failed to serialize vectorize args");
                }
            }
        }

        // Step 10: temp files are owned by Preprocess/Extract collaborators;
        // nothing local to delete beyond what they already clean up.

        Ok(HandlerOutcome::Completed {
            results,
            actual_cost_usd: Some(actual_cost_usd),
            token_usage: Some(token_usage),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::ParseArgs;
    use crate::collaborators::{FileProbe, RawTokenUsage};
    use dipc_domain::{Task, TaskStatus, TaskType};
    use dipc_queue::in_memory::InMemoryQueueFabric;
    use dipc_task_store::in_memory::InMemoryTaskStore;
    use dipc_task_store::TaskStore;

    struct FakeProber(FileProbe);
    #[async_trait]
    impl ProbeFile for FakeProber {
        async fn probe(&self, _file_url: &str) -> Result<FileProbe, HandlerError> {
            Ok(self.0.clone())
        }
    }

    struct FakePreprocessor(ProcessedDocument);
    #[async_trait]
    impl Preprocess for FakePreprocessor {
        async fn preprocess(&self, _file_url: &str) -> Result<ProcessedDocument, HandlerError> {
            Ok(self.0.clone())
        }
    }

    struct FakeExtractor {
        response: String,
        usage: RawTokenUsage,
    }
    #[async_trait]
    impl Extract for FakeExtractor {
        async fn extract(
            &self,
            _system_prompt: &str,
            _user_content: &[UserContentBlock],
            _model: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<(String, RawTokenUsage), HandlerError> {
            Ok((self.response.clone(), self.usage))
        }
    }

    struct NeverCalledExtractor;
    #[async_trait]
    impl Extract for NeverCalledExtractor {
        async fn extract(
            &self,
            _system_prompt: &str,
            _user_content: &[UserContentBlock],
            _model: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<(String, RawTokenUsage), HandlerError> {
            panic!("cost gate should have rejected before any LLM call was made");
        }
    }

    fn sample_doc() -> ProcessedDocument {
        ProcessedDocument {
            format: "pdf".to_string(),
            text_content: Some("quarterly earnings report".to_string()),
            image_paths: Vec::new(),
            metadata: json!({"pages": 3}),
            original_filename: "report.pdf".to_string(),
            file_size: 1024,
        }
    }

    async fn context_for(task_id: &str) -> (WorkerContext, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new());
        store
            .create_task(Task::new_pending(
                task_id.to_string(),
                "u1".to_string(),
                None,
                TaskType::Parse,
                Some("https://x/report.pdf".to_string()),
                None,
                Options::default(),
            ))
            .await
            .unwrap();
        let ctx = WorkerContext::new(
            task_id.to_string(),
            "u1".to_string(),
            "corr-1".to_string(),
            std::time::Duration::from_secs(300),
            store.clone(),
        );
        (ctx, store)
    }

    #[tokio::test]
    async fn cost_gate_rejection_skips_llm_call_and_records_estimate() {
        let (ctx, _store) = context_for("t1").await;
        let handler = ParsingHandler::new(
            Arc::new(FakeProber(FileProbe {
                filename: "huge.pdf".to_string(),
                size_bytes: 10 * 1024 * 1024,
                content_type: Some("application/pdf".to_string()),
            })),
            Arc::new(FakePreprocessor(sample_doc())),
            Arc::new(NeverCalledExtractor),
            Arc::new(InMemoryQueueFabric::new()),
            120,
        );

        let mut options = Options::default();
        options.max_cost_limit = Some(0.01);
        options.model_name = Some("gpt-4-vision-preview".to_string());
        let args = ParseArgs {
            file_url: "https://x/huge.pdf".to_string(),
            user_id: "u1".to_string(),
            options,
            source: None,
        };
        let message = QueueMessage::new("t1", serde_json::to_value(args).unwrap());

        let err = handler.handle(&ctx, &message).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::CostLimitExceeded);
        assert_eq!(err.error_code(), Some("COST_LIMIT_EXCEEDED"));
        let results = err.results.expect("cost rejection attaches a diagnostic payload");
        assert!(results["cost_estimate"]["max_possible_cost_usd"].as_f64().unwrap() > 0.01);
    }

    #[tokio::test]
    async fn successful_parse_enqueues_vectorization_when_text_is_extractable() {
        let (ctx, _store) = context_for("t2").await;
        let queue = Arc::new(InMemoryQueueFabric::new());
        let handler = ParsingHandler::new(
            Arc::new(FakeProber(FileProbe {
                filename: "small.pdf".to_string(),
                size_bytes: 1024,
                content_type: Some("application/pdf".to_string()),
            })),
            Arc::new(FakePreprocessor(sample_doc())),
            Arc::new(FakeExtractor {
                response: json!({"text": "extracted body text"}).to_string(),
                usage: RawTokenUsage {
                    prompt_tokens: 600,
                    completion_tokens: 200,
                    total_tokens: 800,
                },
            }),
            queue.clone(),
            120,
        );

        let mut options = Options::default();
        options.max_cost_limit = Some(5.0);
        let args = ParseArgs {
            file_url: "https://x/small.pdf".to_string(),
            user_id: "u1".to_string(),
            options,
            source: None,
        };
        let message = QueueMessage::new("t2", serde_json::to_value(args).unwrap());

        let outcome = handler.handle(&ctx, &message).await.unwrap();
        match outcome {
            HandlerOutcome::Completed { results, actual_cost_usd, token_usage } => {
                assert!(results["extracted_content"]["text"].as_str().unwrap().contains("extracted body"));
                assert!(actual_cost_usd.unwrap() > 0.0);
                assert_eq!(token_usage.unwrap().total, 800);
            }
            HandlerOutcome::Deferred => panic!("expected Completed"),
        }

        let depth = queue.depth(QueueName::Vectorize).await.unwrap();
        assert_eq!(depth.ready, 1);
    }

    #[tokio::test]
    async fn non_json_llm_response_is_wrapped_with_low_confidence() {
        let (ctx, _store) = context_for("t3").await;
        let handler = ParsingHandler::new(
            Arc::new(FakeProber(FileProbe {
                filename: "small.txt".to_string(),
                size_bytes: 200,
                content_type: Some("text/plain".to_string()),
            })),
            Arc::new(FakePreprocessor(sample_doc())),
            Arc::new(FakeExtractor {
                response: "not valid json at all".to_string(),
                usage: RawTokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                },
            }),
            Arc::new(InMemoryQueueFabric::new()),
            120,
        );

        let mut options = Options::default();
        options.max_cost_limit = Some(5.0);
        options.enable_vectorization = false;
        let args = ParseArgs {
            file_url: "https://x/small.txt".to_string(),
            user_id: "u1".to_string(),
            options,
            source: None,
        };
        let message = QueueMessage::new("t3", serde_json::to_value(args).unwrap());

        let outcome = handler.handle(&ctx, &message).await.unwrap();
        match outcome {
            HandlerOutcome::Completed { results, .. } => {
                assert_eq!(results["confidence_score"].as_f64().unwrap(), PARSE_ERROR_CONFIDENCE);
                assert!(results["extracted_content"]["raw_response"].is_string());
            }
            HandlerOutcome::Deferred => panic!("expected Completed"),
        }
    }

    #[tokio::test]
    async fn cancellation_checkpoint_aborts_before_llm_call() {
        let (ctx, store) = context_for("t4").await;
        store
            .update_status(
                "t4",
                &[TaskStatus::Pending],
                TaskStatus::Processing,
                dipc_domain::StatusUpdate::default(),
            )
            .await
            .unwrap();
        store
            .update_status(
                "t4",
                &[TaskStatus::Processing],
                TaskStatus::Cancelled,
                dipc_domain::StatusUpdate::default(),
            )
            .await
            .unwrap();

        let handler = ParsingHandler::new(
            Arc::new(FakeProber(FileProbe {
                filename: "x.pdf".to_string(),
                size_bytes: 100,
                content_type: None,
            })),
            Arc::new(FakePreprocessor(sample_doc())),
            Arc::new(NeverCalledExtractor),
            Arc::new(InMemoryQueueFabric::new()),
            120,
        );
        let mut options = Options::default();
        options.max_cost_limit = Some(5.0);
        let args = ParseArgs {
            file_url: "https://x/x.pdf".to_string(),
            user_id: "u1".to_string(),
            options,
            source: None,
        };
        let message = QueueMessage::new("t4", serde_json::to_value(args).unwrap());

        let err = handler.handle(&ctx, &message).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Cancelled);
    }
}
