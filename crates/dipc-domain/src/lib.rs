//! Core data model for the DIPC document intelligence pipeline.
//!
//! Defines the `Task` and `FileMetadata` records persisted by the task store
//! (`dipc-task-store`), the `Options` submission schema, and the small set of
//! enums shared across every stage handler. Kept free of any storage or
//! runtime dependency so it can be depended on by every other crate in the
//! workspace without pulling in tokio, sqlx, or reqwest.

pub mod options;
pub mod task;

pub use options::{ExtractionMode, LlmProvider, Options, StoragePolicy};
pub use task::{
    FileMetadata, Task, TaskStatus, TaskType, TokenUsage, is_terminal, validate_transition,
};

use thiserror::Error;

/// Errors produced while constructing or validating domain values.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("task is in terminal state: {0:?}")]
    TerminalState(TaskStatus),

    #[error("validation error: {0}")]
    Validation(String),
}
