//! Core task store and file metadata store traits.

use async_trait::async_trait;
use dipc_domain::{FileMetadata, StatusCounts, StatusUpdate, Task, TaskFilters, TaskStatus, TaskType};

use crate::error::TaskStoreError;

/// A page of tasks plus the total matching count, for `list_by_user`.
#[derive(Debug, Clone)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    pub total: u64,
}

/// Durable storage of tasks, parent/child links, and results (C1), with the
/// legal-transition enforcement of C5 folded into `update_status`.
///
/// Implementations must be `Send + Sync` for use across worker slots.
#[async_trait]
pub trait TaskStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// `Create(task) -> id`.
    async fn create_task(&self, task: Task) -> Result<Task, TaskStoreError>;

    /// `Get(id) -> task | not_found`. `None` is the sentinel;
    /// never an exception.
    async fn get_task(&self, id: &str) -> Result<Option<Task>, TaskStoreError>;

    /// `ListByUser(user, filters, page, size) -> (tasks, total)`.
    async fn list_by_user(
        &self,
        user_id: &str,
        filters: TaskFilters,
        page: u32,
        size: u32,
    ) -> Result<TaskPage, TaskStoreError>;

    /// `ListChildren(parent_id) -> tasks`. An explicit call, never an
    /// implicit ORM join.
    async fn list_children(&self, parent_id: &str) -> Result<Vec<Task>, TaskStoreError>;

    /// `UpdateStatus(id, new_status, {..}) -> task | not_found`.
    ///
    /// Atomic and idempotent under retries. `expected_from` implements the
    /// conditional predicate: callers pass
    /// `&[Pending, Retrying]` when claiming, `&[Processing]` when
    /// finalizing. If the task's current status is not in `expected_from`,
    /// returns `TaskStoreError::PreconditionFailed` rather than applying a
    /// last-writer-wins overwrite.
    async fn update_status(
        &self,
        id: &str,
        expected_from: &[TaskStatus],
        new_status: TaskStatus,
        update: StatusUpdate,
    ) -> Result<Task, TaskStoreError>;

    /// `BulkCreate(tasks) -> ids` — used by C7 to durably create every child
    /// parse task in a single transaction before the parent is marked
    /// complete.
    async fn bulk_create(&self, tasks: Vec<Task>) -> Result<Vec<String>, TaskStoreError>;

    /// `CountByStatus(filter) -> map<status,int>`.
    async fn count_by_status(&self, task_type: Option<TaskType>) -> Result<StatusCounts, TaskStoreError>;
}

/// Durable storage of `FileMetadata` rows.
#[async_trait]
pub trait FileMetadataStore: Send + Sync {
    async fn create_file(&self, file: FileMetadata) -> Result<FileMetadata, TaskStoreError>;

    async fn get_file(&self, id: &str) -> Result<Option<FileMetadata>, TaskStoreError>;

    async fn list_by_task(&self, task_id: &str) -> Result<Vec<FileMetadata>, TaskStoreError>;

    /// Rows where `storage_policy = temporary AND expires_at < now`, bounded
    /// by `batch_size` — feeds C10 mode A.
    async fn list_expired(&self, batch_size: u32) -> Result<Vec<FileMetadata>, TaskStoreError>;

    /// Paginated scan over every row, used by C10's orphan-detection mode
    /// to find metadata whose backing object is gone.
    async fn list_all(&self, batch_size: u32, after_id: Option<&str>) -> Result<Vec<FileMetadata>, TaskStoreError>;

    async fn delete_file(&self, id: &str) -> Result<bool, TaskStoreError>;
}
