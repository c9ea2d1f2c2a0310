//! Cleanup Handler.
//!
//! Three invocation shapes share one handler: expired temporary files,
//! archive extraction directories pending child completion, and orphaned
//! `FileMetadata` rows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dipc_domain::is_terminal;
use dipc_queue::{QueueFabric, QueueMessage, QueueName};
use dipc_task_store::{FileMetadataStore, TaskStore};
use serde_json::json;

use crate::args::{CleanupArgs, CleanupMode};
use crate::collaborators::ObjectStore;
use crate::context::WorkerContext;
use crate::error::HandlerError;
use crate::runtime::{HandlerOutcome, StageHandler};

/// Reschedule delay when an archive's children are still in flight.
const EXTRACTION_RECHECK_DELAY: Duration = Duration::from_secs(5 * 60);

const DEFAULT_EXPIRED_BATCH: u32 = 100;
const DEFAULT_ORPHAN_BATCH: u32 = 100;

pub struct CleanupHandler {
    task_store: Arc<dyn TaskStore>,
    file_store: Arc<dyn FileMetadataStore>,
    object_store: Arc<dyn ObjectStore>,
    queue: Arc<dyn QueueFabric>,
}

impl CleanupHandler {
    pub fn new(
        task_store: Arc<dyn TaskStore>,
        file_store: Arc<dyn FileMetadataStore>,
        object_store: Arc<dyn ObjectStore>,
        queue: Arc<dyn QueueFabric>,
    ) -> Self {
        Self {
            task_store,
            file_store,
            object_store,
            queue,
        }
    }

    async fn cleanup_expired(&self, batch_size: u32) -> Result<HandlerOutcome, HandlerError> {
        let rows = self.file_store.list_expired(batch_size).await?;
        let mut deleted = 0u64;
        let mut bytes_freed = 0u64;
        let mut errors = Vec::new();

        for row in &rows {
            match self.object_store.delete(&row.storage_path).await {
                Ok(()) => match self.file_store.delete_file(&row.id).await {
                    Ok(_) => {
                        deleted += 1;
                        bytes_freed += row.file_size_bytes;
                    }
                    Err(e) => errors.push(json!({"file_id": row.id, "error": e.to_string()})),
                },
                Err(e) => errors.push(json!({"file_id": row.id, "error": e.to_string()})),
            }
        }

        Ok(HandlerOutcome::Completed {
            results: json!({
                "mode": "expired",
                "processed": rows.len(),
                "deleted": deleted,
                "bytes_freed": bytes_freed,
                "errors": errors,
            }),
            actual_cost_usd: None,
            token_usage: None,
        })
    }

    async fn cleanup_extraction(
        &self,
        ctx: &WorkerContext,
        message: &QueueMessage,
        extraction_dir: &str,
        parent_id: &str,
    ) -> Result<HandlerOutcome, HandlerError> {
        let children = self.task_store.list_children(parent_id).await?;
        let incomplete = children.iter().filter(|c| !is_terminal(c.status)).count();

        if incomplete > 0 {
            let mut retry_message = message.clone();
            retry_message.delivery_count += 1;
            self.queue
                .enqueue_after(QueueName::Cleanup, retry_message, EXTRACTION_RECHECK_DELAY)
                .await?;
            tracing::debug!(
                task_id = %ctx.task_id,
                parent_id,
                incomplete,
                "archive children still in flight, rescheduling extraction cleanup"
            );
            return Ok(HandlerOutcome::Deferred);
        }

        match tokio::fs::remove_dir_all(extraction_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(HandlerError::storage(format!("failed to remove {extraction_dir}: {e}"))),
        }

        Ok(HandlerOutcome::Completed {
            results: json!({
                "mode": "extraction",
                "extraction_directory": extraction_dir,
                "parent_id": parent_id,
                "removed": true,
            }),
            actual_cost_usd: None,
            token_usage: None,
        })
    }

    async fn cleanup_orphaned(
        &self,
        batch_size: u32,
        after_id: Option<&str>,
    ) -> Result<HandlerOutcome, HandlerError> {
        let rows = self.file_store.list_all(batch_size, after_id).await?;
        let mut removed = 0u64;
        let mut errors = Vec::new();
        let mut last_id = None;

        for row in &rows {
            last_id = Some(row.id.clone());
            match self.object_store.exists(&row.storage_path).await {
                Ok(true) => {}
                Ok(false) => match self.file_store.delete_file(&row.id).await {
                    Ok(_) => removed += 1,
                    Err(e) => errors.push(json!({"file_id": row.id, "error": e.to_string()})),
                },
                Err(e) => errors.push(json!({"file_id": row.id, "error": e.to_string()})),
            }
        }

        Ok(HandlerOutcome::Completed {
            results: json!({
                "mode": "orphaned",
                "scanned": rows.len(),
                "removed": removed,
                "errors": errors,
                "last_id": last_id,
                "exhausted": (rows.len() as u32) < batch_size,
            }),
            actual_cost_usd: None,
            token_usage: None,
        })
    }
}

#[async_trait]
impl StageHandler for CleanupHandler {
    async fn handle(&self, ctx: &WorkerContext, message: &QueueMessage) -> Result<HandlerOutcome, HandlerError> {
        let args: CleanupArgs = serde_json::from_value(message.args.clone())
            .map_err(|e| HandlerError::validation(format!("malformed cleanup args: {e}")))?;

        match args.mode {
            CleanupMode::Expired => self.cleanup_expired(args.batch_size.unwrap_or(DEFAULT_EXPIRED_BATCH)).await,
            CleanupMode::Extraction => {
                let extraction_dir = args
                    .extraction_dir
                    .as_deref()
                    .ok_or_else(|| HandlerError::validation("extraction cleanup requires extraction_dir"))?;
                let parent_id = args
                    .parent_id
                    .as_deref()
                    .ok_or_else(|| HandlerError::validation("extraction cleanup requires parent_id"))?;
                self.cleanup_extraction(ctx, message, extraction_dir, parent_id).await
            }
            CleanupMode::Orphaned => {
                self.cleanup_orphaned(args.batch_size.unwrap_or(DEFAULT_ORPHAN_BATCH), args.after_id.as_deref())
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalObjectStore;
    use dipc_domain::{Options, StatusUpdate, Task, TaskStatus, TaskType};
    use dipc_queue::in_memory::InMemoryQueueFabric;
    use dipc_task_store::in_memory::{InMemoryFileMetadataStore, InMemoryTaskStore};

    fn ctx() -> WorkerContext {
        WorkerContext::new(
            "cleanup-task".to_string(),
            "u1".to_string(),
            "corr".to_string(),
            std::time::Duration::from_secs(60),
            Arc::new(InMemoryTaskStore::new()),
        )
    }

    /// Moves a freshly-created `pending` child to `target` via the shortest
    /// legal path through the state machine.
    async fn drive_to(store: &InMemoryTaskStore, id: &str, target: TaskStatus) {
        match target {
            TaskStatus::Pending => {}
            TaskStatus::Failed | TaskStatus::Cancelled => {
                store.update_status(id, &[TaskStatus::Pending], target, StatusUpdate::default()).await.unwrap();
            }
            TaskStatus::Processing => {
                store.update_status(id, &[TaskStatus::Pending], TaskStatus::Processing, StatusUpdate::default()).await.unwrap();
            }
            TaskStatus::Completed | TaskStatus::Retrying => {
                store.update_status(id, &[TaskStatus::Pending], TaskStatus::Processing, StatusUpdate::default()).await.unwrap();
                store.update_status(id, &[TaskStatus::Processing], target, StatusUpdate::default()).await.unwrap();
            }
        }
    }

    async fn archive_with_children(store: &InMemoryTaskStore, child_statuses: &[TaskStatus]) -> String {
        store
            .create_task(Task::new_pending(
                "parent".to_string(),
                "u1".to_string(),
                None,
                TaskType::Archive,
                None,
                None,
                Options::default(),
            ))
            .await
            .unwrap();
        for (i, status) in child_statuses.iter().enumerate() {
            let child_id = format!("child{i}");
            store
                .create_task(Task::new_pending(
                    child_id.clone(),
                    "u1".to_string(),
                    Some("parent".to_string()),
                    TaskType::Parse,
                    None,
                    None,
                    Options::default(),
                ))
                .await
                .unwrap();
            drive_to(store, &child_id, *status).await;
        }
        "parent".to_string()
    }

    #[tokio::test]
    async fn extraction_cleanup_reschedules_while_a_child_is_incomplete() {
        let task_store = Arc::new(InMemoryTaskStore::new());
        let file_store = Arc::new(InMemoryFileMetadataStore::new());
        let queue = Arc::new(InMemoryQueueFabric::new());
        archive_with_children(&task_store, &[TaskStatus::Completed, TaskStatus::Processing]).await;

        let handler = CleanupHandler::new(task_store.clone(), file_store, Arc::new(LocalObjectStore::new()), queue.clone());
        let tmp = tempfile::tempdir().unwrap();
        let args = CleanupArgs {
            mode: CleanupMode::Extraction,
            extraction_dir: Some(tmp.path().display().to_string()),
            parent_id: Some("parent".to_string()),
            batch_size: None,
            dry_run: false,
            after_id: None,
        };
        let message = QueueMessage::new("parent", serde_json::to_value(args).unwrap());

        let outcome = handler.handle(&ctx(), &message).await.unwrap();
        assert!(matches!(outcome, HandlerOutcome::Deferred));
        assert!(tmp.path().exists(), "directory must not be removed while children are incomplete");
        let depth = queue.depth(QueueName::Cleanup).await.unwrap();
        assert_eq!(depth.delayed, 1);
    }

    #[tokio::test]
    async fn extraction_cleanup_removes_directory_once_all_children_are_terminal() {
        let task_store = Arc::new(InMemoryTaskStore::new());
        let file_store = Arc::new(InMemoryFileMetadataStore::new());
        let queue = Arc::new(InMemoryQueueFabric::new());
        archive_with_children(&task_store, &[TaskStatus::Completed, TaskStatus::Failed]).await;

        let handler = CleanupHandler::new(task_store.clone(), file_store, Arc::new(LocalObjectStore::new()), queue.clone());
        let tmp = tempfile::tempdir().unwrap();
        let extraction_dir = tmp.path().display().to_string();
        let args = CleanupArgs {
            mode: CleanupMode::Extraction,
            extraction_dir: Some(extraction_dir.clone()),
            parent_id: Some("parent".to_string()),
            batch_size: None,
            dry_run: false,
            after_id: None,
        };
        let message = QueueMessage::new("parent", serde_json::to_value(args).unwrap());

        let outcome = handler.handle(&ctx(), &message).await.unwrap();
        match outcome {
            HandlerOutcome::Completed { results, .. } => {
                assert_eq!(results["removed"], serde_json::json!(true));
            }
            HandlerOutcome::Deferred => panic!("expected Completed once every child is terminal"),
        }
        assert!(!std::path::Path::new(&extraction_dir).exists());
    }

    #[tokio::test]
    async fn extraction_cleanup_on_already_missing_directory_is_idempotent() {
        let task_store = Arc::new(InMemoryTaskStore::new());
        let file_store = Arc::new(InMemoryFileMetadataStore::new());
        let queue = Arc::new(InMemoryQueueFabric::new());
        archive_with_children(&task_store, &[TaskStatus::Completed]).await;

        let handler = CleanupHandler::new(task_store.clone(), file_store, Arc::new(LocalObjectStore::new()), queue.clone());
        let args = CleanupArgs {
            mode: CleanupMode::Extraction,
            extraction_dir: Some("/tmp/dipc-nonexistent-extraction-dir-xyz".to_string()),
            parent_id: Some("parent".to_string()),
            batch_size: None,
            dry_run: false,
            after_id: None,
        };
        let message = QueueMessage::new("parent", serde_json::to_value(args).unwrap());

        handler.handle(&ctx(), &message).await.unwrap();
    }

    #[tokio::test]
    async fn expired_files_mode_deletes_metadata_and_reports_bytes_freed() {
        use dipc_domain::FileStoragePolicy;
        let task_store = Arc::new(InMemoryTaskStore::new());
        let file_store = Arc::new(InMemoryFileMetadataStore::new());
        let queue = Arc::new(InMemoryQueueFabric::new());

        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"expired contents").unwrap();
        let file = dipc_domain::FileMetadata {
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
            ..dipc_domain::FileMetadata::new(
                "f1".into(),
                "t1".into(),
                "a.pdf".into(),
                "pdf".into(),
                17,
                tmp.path().display().to_string(),
                FileStoragePolicy::Temporary,
                Some(24),
            )
        };
        file_store.create_file(file).await.unwrap();

        let handler = CleanupHandler::new(task_store, file_store.clone(), Arc::new(LocalObjectStore::new()), queue);
        let args = CleanupArgs {
            mode: CleanupMode::Expired,
            extraction_dir: None,
            parent_id: None,
            batch_size: None,
            dry_run: false,
            after_id: None,
        };
        let message = QueueMessage::new("sweep", serde_json::to_value(args).unwrap());

        let outcome = handler.handle(&ctx(), &message).await.unwrap();
        match outcome {
            HandlerOutcome::Completed { results, .. } => {
                assert_eq!(results["deleted"], serde_json::json!(1));
                assert_eq!(results["bytes_freed"], serde_json::json!(17));
            }
            HandlerOutcome::Deferred => panic!("expected Completed"),
        }
        assert!(file_store.get_file("f1").await.unwrap().is_none());
        assert!(!tmp.path().exists());
    }
}
