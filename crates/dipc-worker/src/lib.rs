//! # Worker Runtime and Stage Handlers (C6-C10)
//!
//! `dipc-worker` owns the asynchronous task pipeline's core: the
//! logical-slot runtime that claims work and drives it through
//! the state machine (C6, [`runtime`]), and the four stage handlers that do
//! the actual work (C7-C10, [`handlers`]). Everything this crate talks to
//! outside the task store and queue fabric — preprocessors, LLM clients,
//! vector stores, object storage, file downloads — is behind a trait in
//! [`collaborators`]; concrete implementations are assembled by the binary
//! crate that deploys a worker process.

pub mod args;
pub mod collaborators;
pub mod context;
pub mod downloader;
pub mod error;
pub mod handlers;
pub mod health;
pub mod object_store;
pub mod prober;
pub mod runtime;
pub mod submission;

pub use collaborators::{
    EmbedBatch, Extract, FileProbe, ObjectStore, Preprocess, ProcessedDocument, ProbeFile, RawTokenUsage,
    StoreDocuments, UserContentBlock, VectorDocument,
};
pub use context::WorkerContext;
pub use downloader::HttpDownloader;
pub use error::{ErrorKind, HandlerError};
pub use handlers::{ArchiveHandler, CleanupHandler, ParsingHandler, VectorizationHandler};
pub use health::{check as check_health, HealthReport, QueueHealth};
pub use object_store::LocalObjectStore;
pub use prober::DefaultFileProber;
pub use runtime::{HandlerOutcome, RuntimeConfig, StageHandler, WorkerRuntime};
pub use submission::{dispatch, Dispatched};
