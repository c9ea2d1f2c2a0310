//! Unified error type for task store operations.

use dipc_domain::TaskStatus;

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("file metadata not found: {0}")]
    FileNotFound(String),

    #[error("invalid state transition: {current:?} -> {requested:?}")]
    InvalidTransition {
        current: TaskStatus,
        requested: TaskStatus,
    },

    #[error("task is in terminal state: {0:?}")]
    TerminalState(TaskStatus),

    #[error(
        "conditional update rejected: task {task_id} was not in an expected_from state (actual: {actual:?})"
    )]
    PreconditionFailed {
        task_id: String,
        actual: TaskStatus,
    },

    #[error("parent task {0} refers to a non-archive task")]
    InvalidParent(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for TaskStoreError {
    fn from(err: serde_json::Error) -> Self {
        TaskStoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for TaskStoreError {
    fn from(err: sqlx::Error) -> Self {
        TaskStoreError::Database(err.to_string())
    }
}

/// Connection errors are retriable; row-not-found returns a sentinel,
/// never an exception that aborts the worker.
impl TaskStoreError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, TaskStoreError::Database(_))
    }
}
