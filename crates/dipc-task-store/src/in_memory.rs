//! In-memory task and file-metadata store.
//!
//! Suitable for development, testing, and single-instance deployments. Tasks
//! are stored in a `HashMap` behind a `RwLock`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dipc_domain::{
    FileMetadata, StatusCounts, StatusUpdate, Task, TaskFilters, TaskStatus, TaskType,
    is_terminal, validate_transition,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::TaskStoreError;
use crate::traits::{FileMetadataStore, TaskPage, TaskStore};

/// Generate a new task id (UUID v7, temporally ordered — matches the
/// ordering `list_by_user` sorts on).
pub fn generate_task_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_update(task: &mut Task, new_status: TaskStatus, update: StatusUpdate) {
    task.status = new_status;
    task.updated_at = Utc::now();
    if is_terminal(new_status) {
        task.completed_at = Some(task.updated_at);
    }
    if update.error_message.is_some() {
        task.error_message = update.error_message;
    }
    if update.error_code.is_some() {
        task.error_code = update.error_code;
    }
    if update.results.is_some() {
        task.results = update.results;
    }
    if update.actual_cost_usd.is_some() {
        task.actual_cost_usd = update.actual_cost_usd;
    }
    if update.token_usage.is_some() {
        task.token_usage = update.token_usage;
    }
    if new_status == TaskStatus::Retrying {
        task.retry_count += 1;
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn create_task(&self, task: Task) -> Result<Task, TaskStoreError> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: &str) -> Result<Option<Task>, TaskStoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(id).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        filters: TaskFilters,
        page: u32,
        size: u32,
    ) -> Result<TaskPage, TaskStoreError> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id)
            .filter(|t| filters.status.is_none_or(|s| t.status == s))
            .filter(|t| filters.task_type.is_none_or(|ty| t.task_type == ty))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        let start = (page as usize) * (size as usize);
        let page_items = matching.into_iter().skip(start).take(size as usize).collect();
        Ok(TaskPage {
            tasks: page_items,
            total,
        })
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<Task>, TaskStoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: &str,
        expected_from: &[TaskStatus],
        new_status: TaskStatus,
        update: StatusUpdate,
    ) -> Result<Task, TaskStoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskStoreError::TaskNotFound(id.to_string()))?;

        if !expected_from.contains(&task.status) {
            return Err(TaskStoreError::PreconditionFailed {
                task_id: id.to_string(),
                actual: task.status,
            });
        }
        if let Err((from, to)) = validate_transition(task.status, new_status) {
            return Err(TaskStoreError::InvalidTransition {
                current: from,
                requested: to,
            });
        }

        apply_update(task, new_status, update);
        Ok(task.clone())
    }

    async fn bulk_create(&self, new_tasks: Vec<Task>) -> Result<Vec<String>, TaskStoreError> {
        let mut tasks = self.tasks.write().await;
        let mut ids = Vec::with_capacity(new_tasks.len());
        for task in new_tasks {
            ids.push(task.id.clone());
            tasks.insert(task.id.clone(), task);
        }
        Ok(ids)
    }

    async fn count_by_status(&self, task_type: Option<TaskType>) -> Result<StatusCounts, TaskStoreError> {
        let tasks = self.tasks.read().await;
        let mut counts = StatusCounts::new();
        for task in tasks.values() {
            if task_type.is_some_and(|ty| ty != task.task_type) {
                continue;
            }
            *counts.entry(task.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFileMetadataStore {
    files: Arc<RwLock<HashMap<String, FileMetadata>>>,
}

impl InMemoryFileMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileMetadataStore for InMemoryFileMetadataStore {
    async fn create_file(&self, file: FileMetadata) -> Result<FileMetadata, TaskStoreError> {
        let mut files = self.files.write().await;
        files.insert(file.id.clone(), file.clone());
        Ok(file)
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileMetadata>, TaskStoreError> {
        let files = self.files.read().await;
        Ok(files.get(id).cloned())
    }

    async fn list_by_task(&self, task_id: &str) -> Result<Vec<FileMetadata>, TaskStoreError> {
        let files = self.files.read().await;
        Ok(files
            .values()
            .filter(|f| f.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn list_expired(&self, batch_size: u32) -> Result<Vec<FileMetadata>, TaskStoreError> {
        let files = self.files.read().await;
        let now = Utc::now();
        Ok(files
            .values()
            .filter(|f| f.expires_at.is_some_and(|exp| exp < now))
            .take(batch_size as usize)
            .cloned()
            .collect())
    }

    async fn list_all(&self, batch_size: u32, after_id: Option<&str>) -> Result<Vec<FileMetadata>, TaskStoreError> {
        let files = self.files.read().await;
        let mut all: Vec<&FileMetadata> = files.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        let start = match after_id {
            Some(after) => all.iter().position(|f| f.id.as_str() > after).unwrap_or(all.len()),
            None => 0,
        };
        Ok(all
            .into_iter()
            .skip(start)
            .take(batch_size as usize)
            .cloned()
            .collect())
    }

    async fn delete_file(&self, id: &str) -> Result<bool, TaskStoreError> {
        let mut files = self.files.write().await;
        Ok(files.remove(id).is_some())
    }
}
