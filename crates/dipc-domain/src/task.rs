//! Task and FileMetadata records, and the task status state machine.
//!
//! The legal-transition table: `pending` and
//! `retrying` both fan out through `processing`; `processing` is the only
//! state that can reach `retrying`. Terminal states are absorbing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::options::Options;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Archive,
    Parse,
    Vectorize,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

/// Returns `true` for the three absorbing (terminal) states.
pub fn is_terminal(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
    )
}

/// Validate a task status transition against the legal-transition table.
///
/// `Processing -> Processing` is the one same-state edge accepted: it is
/// the stale-lease reclaim a worker performs on a task abandoned by a dead
/// peer, not a state change, but it still has to
/// pass through this predicate since `update_status` calls it unconditionally.
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), (TaskStatus, TaskStatus)> {
    use TaskStatus::*;
    let ok = match (from, to) {
        (Pending, Processing) | (Pending, Failed) | (Pending, Cancelled) => true,
        (Processing, Processing)
        | (Processing, Completed)
        | (Processing, Failed)
        | (Processing, Retrying)
        | (Processing, Cancelled) => true,
        (Retrying, Processing) | (Retrying, Failed) | (Retrying, Cancelled) => true,
        _ => false,
    };
    if ok { Ok(()) } else { Err((from, to)) }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
    pub cost: f64,
}

/// The central entity; one per unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub file_url: Option<String>,
    pub original_filename: Option<String>,
    pub options: Options,
    pub estimated_cost_usd: Option<f64>,
    pub actual_cost_usd: Option<f64>,
    pub results: Option<Value>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl Task {
    /// Construct a brand-new `pending` task. Callers supply `id` so that both
    /// the worker-assigned UUID and a deterministic test id can be used.
    pub fn new_pending(
        id: String,
        user_id: String,
        parent_id: Option<String>,
        task_type: TaskType,
        file_url: Option<String>,
        original_filename: Option<String>,
        options: Options,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            parent_id,
            task_type,
            status: TaskStatus::Pending,
            file_url,
            original_filename,
            options,
            estimated_cost_usd: None,
            actual_cost_usd: None,
            results: None,
            error_message: None,
            error_code: None,
            token_usage: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            retry_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStoragePolicy {
    Permanent,
    Temporary,
}

/// One per file known to the system, uploaded or extracted from an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub task_id: String,
    pub original_filename: String,
    pub file_type: String,
    pub file_size_bytes: u64,
    pub storage_path: String,
    pub storage_policy: FileStoragePolicy,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FileMetadata {
    /// Enforces the invariant `storage_policy = temporary => expires_at != null`
    /// (and the converse) at construction time rather than leaving it to be
    /// checked by callers.
    pub fn new(
        id: String,
        task_id: String,
        original_filename: String,
        file_type: String,
        file_size_bytes: u64,
        storage_path: String,
        storage_policy: FileStoragePolicy,
        ttl_hours: Option<i64>,
    ) -> Self {
        let expires_at = match storage_policy {
            FileStoragePolicy::Temporary => {
                Some(Utc::now() + chrono::Duration::hours(ttl_hours.unwrap_or(24)))
            }
            FileStoragePolicy::Permanent => None,
        };
        Self {
            id,
            task_id,
            original_filename,
            file_type,
            file_size_bytes,
            storage_path,
            storage_policy,
            expires_at,
            created_at: Utc::now(),
        }
    }
}

/// Filters accepted by `TaskStore::list_by_user`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
}

/// Fields that `UpdateStatus` may write alongside the new status.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub results: Option<Value>,
    pub actual_cost_usd: Option<f64>,
    pub token_usage: Option<TokenUsage>,
}

/// `CountByStatus` return type.
pub type StatusCounts = HashMap<TaskStatus, u64>;
