//! Archive Handler.
//!
//! Downloads the archive, invokes the secure extractor (C4), creates one
//! child `parse` task per valid file in a single durable batch, enqueues
//! every child, and schedules a deferred cleanup of the extraction
//! directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dipc_archive::{ArchiveLimits, validate_and_extract};
use dipc_domain::{FileMetadata, FileStoragePolicy, Task, TaskType};
use dipc_queue::{QueueFabric, QueueMessage, QueueName};
use dipc_task_store::{FileMetadataStore, TaskStore, in_memory::generate_task_id};
use serde_json::json;

use crate::args::{ArchiveArgs, CleanupArgs, CleanupMode, ParseArgs};
use crate::collaborators::Downloader;
use crate::context::WorkerContext;
use crate::error::HandlerError;
use crate::runtime::{HandlerOutcome, StageHandler};

/// Grace period before the first cleanup attempt fires for a freshly
/// completed archive task.
pub const CLEANUP_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);

pub struct ArchiveHandler {
    task_store: Arc<dyn TaskStore>,
    file_store: Arc<dyn FileMetadataStore>,
    queue: Arc<dyn QueueFabric>,
    downloader: Arc<dyn Downloader>,
    archive_limits: ArchiveLimits,
    max_archive_bytes: u64,
    extraction_root_parent: PathBuf,
    ttl_hours: i64,
}

impl ArchiveHandler {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        file_store: Arc<dyn FileMetadataStore>,
        queue: Arc<dyn QueueFabric>,
        downloader: Arc<dyn Downloader>,
        archive_limits: ArchiveLimits,
        max_archive_bytes: u64,
        extraction_root_parent: PathBuf,
        ttl_hours: i64,
    ) -> Self {
        Self {
            task_store,
            file_store,
            queue,
            downloader,
            archive_limits,
            max_archive_bytes,
            extraction_root_parent,
            ttl_hours,
        }
    }
}

#[async_trait]
impl StageHandler for ArchiveHandler {
    async fn handle(&self, ctx: &WorkerContext, message: &QueueMessage) -> Result<HandlerOutcome, HandlerError> {
        ctx.check_cancelled().await?;

        let args: ArchiveArgs = serde_json::from_value(message.args.clone())
            .map_err(|e| HandlerError::validation(format!("malformed archive args: {e}")))?;

        // Step 2: download with a running byte counter, ceiling at
        // max_archive_size_mb.
        let (archive_path, _downloaded) = self.downloader.download(&args.file_url, self.max_archive_bytes).await?;

        let extraction = validate_and_extract(&archive_path, &self.extraction_root_parent, &self.archive_limits);
        let _ = tokio::fs::remove_file(&archive_path).await;
        let extraction = extraction?;

        ctx.check_cancelled().await?;

        // Step 4: one child `parse` task + FileMetadata row per valid entry.
        let mut children = Vec::new();
        let mut file_rows = Vec::new();
        let mut child_urls = Vec::new();
        for entry in extraction.valid_entries() {
            let safe_path = entry.safe_path.as_ref().expect("valid entries always carry a safe_path");
            let local_url = format!("local://{}", extraction.extraction_dir.join(safe_path).display());
            let child_id = generate_task_id();
            let child = Task::new_pending(
                child_id.clone(),
                args.user_id.clone(),
                Some(ctx.task_id.clone()),
                TaskType::Parse,
                Some(local_url.clone()),
                Some(entry.original_path.clone()),
                args.options.clone(),
            );
            children.push(child);
            child_urls.push(local_url.clone());

            let storage_policy = match args.options.storage_policy {
                dipc_domain::StoragePolicy::Permanent => FileStoragePolicy::Permanent,
                dipc_domain::StoragePolicy::Temporary => FileStoragePolicy::Temporary,
            };
            file_rows.push(FileMetadata::new(
                generate_task_id(),
                child_id,
                entry.original_path.clone(),
                entry.file_type.clone(),
                entry.size,
                extraction.extraction_dir.join(safe_path).display().to_string(),
                storage_policy,
                Some(self.ttl_hours),
            ));
        }

        // Ordering requirement: children must be durable
        // before the parent is marked complete.
        let child_ids = self.task_store.bulk_create(children).await?;
        for file_row in file_rows {
            self.file_store.create_file(file_row).await?;
        }

        for (child_id, child_url) in child_ids.iter().zip(child_urls.into_iter()) {
            let msg = QueueMessage::new(
                child_id.clone(),
                serde_json::to_value(ParseArgs {
                    file_url: child_url,
                    user_id: args.user_id.clone(),
                    options: args.options.clone(),
                    source: Some("archive_extraction".to_string()),
                })
                .expect("ParseArgs always serializes"),
            )
            .with_correlation_id(message.correlation_id.clone());
            self.queue.enqueue(QueueName::Parse, msg).await?;
        }

        let invalid_files: Vec<_> = extraction
            .entries
            .iter()
            .filter(|e| !e.valid)
            .map(|e| json!({"filename": e.original_path, "error": e.error}))
            .collect();

        let results = json!({
            "archive_processed": true,
            "total_files_in_archive": extraction.entries.len(),
            "valid_files_extracted": extraction.valid_count(),
            "invalid_files_skipped": invalid_files.len(),
            "subtasks_created": child_ids.len(),
            "subtask_ids": child_ids,
            "extraction_directory": extraction.extraction_dir.display().to_string(),
            "invalid_files": invalid_files,
        });

        // Step 7: schedule deferred cleanup of the extraction directory.
        let cleanup_msg = QueueMessage::new(
            ctx.task_id.clone(),
            serde_json::to_value(CleanupArgs {
                mode: CleanupMode::Extraction,
                extraction_dir: Some(extraction.extraction_dir.display().to_string()),
                parent_id: Some(ctx.task_id.clone()),
                batch_size: None,
                dry_run: false,
                after_id: None,
            })
            .expect("CleanupArgs always serializes"),
        );
        self.queue.enqueue_after(QueueName::Cleanup, cleanup_msg, CLEANUP_GRACE_PERIOD).await?;

        Ok(HandlerOutcome::Completed {
            results,
            actual_cost_usd: None,
            token_usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use dipc_domain::{Options, Task as DTask, TaskStatus, TaskType as DTaskType};
    use dipc_queue::in_memory::InMemoryQueueFabric;
    use dipc_task_store::in_memory::{InMemoryFileMetadataStore, InMemoryTaskStore};
    use zip::write::{FileOptions, ZipWriter};

    struct LocalFileDownloader;

    #[async_trait]
    impl Downloader for LocalFileDownloader {
        async fn download(&self, url: &str, _max_bytes: u64) -> Result<(PathBuf, u64), HandlerError> {
            // Tests hand this a real path on disk rather than an http(s) URL;
            // it stands in for the archive already having been fetched.
            let path = PathBuf::from(url);
            let size = tokio::fs::metadata(&path).await.map_err(|e| HandlerError::transient_io(e.to_string()))?.len();
            Ok((path, size))
        }
    }

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

    async fn new_handler(
        task_store: Arc<dyn TaskStore>,
        file_store: Arc<dyn FileMetadataStore>,
        queue: Arc<dyn QueueFabric>,
        extraction_root: PathBuf,
    ) -> ArchiveHandler {
        ArchiveHandler::new(
            task_store,
            file_store,
            queue,
            Arc::new(LocalFileDownloader),
            ArchiveLimits::default(),
            100 * 1024 * 1024,
            extraction_root,
            24,
        )
    }

    async fn seed_archive_task(store: &InMemoryTaskStore, id: &str) {
        store
            .create_task(DTask::new_pending(
                id.to_string(),
                "u1".to_string(),
                None,
                DTaskType::Archive,
                None,
                None,
                Options::default(),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn archive_with_safe_and_unsafe_files_completes_with_two_children() {
        let task_store = Arc::new(InMemoryTaskStore::new());
        let file_store = Arc::new(InMemoryFileMetadataStore::new());
        let queue = Arc::new(InMemoryQueueFabric::new());
        seed_archive_task(&task_store, "archive-1").await;

        let zip = build_zip(&[
            ("a.txt", b"safe one"),
            ("b.json", b"{\"ok\":true}"),
            ("payload.exe", b"unsafe binary"),
            ("../../etc/passwd.txt", b"path traversal"),
        ]);
        let extraction_root = tempfile::tempdir().unwrap();
        let handler = new_handler(
            task_store.clone(),
            file_store.clone(),
            queue.clone(),
            extraction_root.path().to_path_buf(),
        )
        .await;

        let ctx = WorkerContext::new(
            "archive-1".to_string(),
            "u1".to_string(),
            "corr-1".to_string(),
            std::time::Duration::from_secs(60),
            task_store.clone(),
        );
        let args = ArchiveArgs {
            file_url: zip.path().display().to_string(),
            user_id: "u1".to_string(),
            options: Options::default(),
        };
        let message = QueueMessage::new("archive-1", serde_json::to_value(args).unwrap());

        let outcome = handler.handle(&ctx, &message).await.unwrap();
        match outcome {
            HandlerOutcome::Completed { results, .. } => {
                assert_eq!(results["valid_files_extracted"], serde_json::json!(2));
                assert_eq!(results["invalid_files_skipped"], serde_json::json!(2));
                assert_eq!(results["subtasks_created"], serde_json::json!(2));
                let invalid = results["invalid_files"].as_array().unwrap();
                assert_eq!(invalid.len(), 2);
            }
            HandlerOutcome::Deferred => panic!("archive handler never defers"),
        }

        let children = task_store.list_children("archive-1").await.unwrap();
        assert_eq!(children.len(), 2);
        for child in &children {
            assert_eq!(child.status, TaskStatus::Pending);
            assert_eq!(child.task_type, DTaskType::Parse);
        }
        let depth = queue.depth(QueueName::Parse).await.unwrap();
        assert_eq!(depth.ready, 2);
        let cleanup_depth = queue.depth(QueueName::Cleanup).await.unwrap();
        assert_eq!(cleanup_depth.delayed, 1);
    }

    #[tokio::test]
    async fn zip_bomb_fails_the_task_and_leaves_no_children() {
        let task_store = Arc::new(InMemoryTaskStore::new());
        let file_store = Arc::new(InMemoryFileMetadataStore::new());
        let queue = Arc::new(InMemoryQueueFabric::new());
        seed_archive_task(&task_store, "archive-2").await;

        // Highly repetitive content deflates to a tiny compressed size,
        // tripping the compression-ratio zip-bomb guard well before any
        // byte of it is extracted.
        let bomb_content = vec![0u8; 2 * 1024 * 1024];
        let zip = build_zip(&[("bomb.txt", &bomb_content)]);
        let extraction_root = tempfile::tempdir().unwrap();
        let handler = new_handler(
            task_store.clone(),
            file_store.clone(),
            queue.clone(),
            extraction_root.path().to_path_buf(),
        )
        .await;

        let ctx = WorkerContext::new(
            "archive-2".to_string(),
            "u1".to_string(),
            "corr-2".to_string(),
            std::time::Duration::from_secs(60),
            task_store.clone(),
        );
        let args = ArchiveArgs {
            file_url: zip.path().display().to_string(),
            user_id: "u1".to_string(),
            options: Options::default(),
        };
        let message = QueueMessage::new("archive-2", serde_json::to_value(args).unwrap());

        let err = handler.handle(&ctx, &message).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::SecurityViolation);

        let children = task_store.list_children("archive-2").await.unwrap();
        assert!(children.is_empty());
        assert_eq!(queue.depth(QueueName::Parse).await.unwrap().ready, 0);

        // The downloaded archive copy is removed regardless of outcome, and
        // since validation never creates an extraction directory, nothing
        // under extraction_root survived either.
        assert_eq!(std::fs::read_dir(extraction_root.path()).unwrap().count(), 0);
    }
}
