//! # Task Store
//!
//! Durable storage of tasks, parent/child links, file metadata, results, and
//! costs (C1), plus the legal-transition enforcement of the task state
//! machine (C5).
//!
//! - [`traits::TaskStore`] / [`traits::FileMetadataStore`]: storage
//!   abstractions, backend-agnostic.
//! - [`in_memory`]: development/test backend.
//! - [`postgres`] (feature `postgres`): production backend with conditional
//!   `UPDATE ... WHERE status = ANY(expected_from)` claims.

pub mod error;
pub mod in_memory;
pub mod prelude;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use error::TaskStoreError;
pub use traits::{FileMetadataStore, TaskPage, TaskStore};
