//! Convenience re-exports for consumers of this crate.

pub use crate::error::TaskStoreError;
pub use crate::in_memory::{InMemoryFileMetadataStore, InMemoryTaskStore, generate_task_id};
pub use crate::traits::{FileMetadataStore, TaskPage, TaskStore};
