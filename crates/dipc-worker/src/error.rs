//! Handler-agnostic error kinds.

use std::fmt;

/// One of the handler-agnostic error kinds a stage can raise. Each kind
/// fixes whether the runtime treats it as retryable and which `error_code`
/// (if any) lands on the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    CostLimitExceeded,
    SecurityViolation,
    TransientIo,
    ProviderError,
    StorageError,
    NotFound,
    Cancelled,
}

impl ErrorKind {
    /// Default retryability per kind. `ProviderError` is
    /// retryable only for 429/5xx; callers construct it with
    /// [`HandlerError::provider`] which takes that distinction explicitly.
    pub fn default_retryable(self) -> bool {
        matches!(self, ErrorKind::TransientIo | ErrorKind::StorageError)
    }

    pub fn error_code(self) -> Option<&'static str> {
        match self {
            ErrorKind::CostLimitExceeded => Some("COST_LIMIT_EXCEEDED"),
            ErrorKind::SecurityViolation => Some("SECURITY_VIOLATION"),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::CostLimitExceeded => "cost_limit_exceeded",
            ErrorKind::SecurityViolation => "security_violation",
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// The tagged result a handler returns to the worker runtime: a typed
/// error carrying the kind, a human-readable message, and whether *this
/// particular occurrence* is retryable (distinct from the kind's default,
/// since `ProviderError` depends on the HTTP status observed).
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    /// Diagnostic payload persisted to `results` when the runtime marks the
    /// task `failed`. `None` leaves
    /// `results` untouched.
    pub results: Option<serde_json::Value>,
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for HandlerError {}

impl HandlerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retryable = kind.default_retryable();
        Self {
            kind,
            message: message.into(),
            retryable,
            results: None,
        }
    }

    /// Attaches a diagnostic payload the runtime persists to `results`
    /// alongside the terminal `failed` status.
    pub fn with_results(mut self, results: serde_json::Value) -> Self {
        self.results = Some(results);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn cost_limit_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CostLimitExceeded, message)
    }

    pub fn security_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SecurityViolation, message)
    }

    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientIo, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: "task cancelled".to_string(),
            retryable: false,
            results: None,
        }
    }

    /// `ProviderError` is retryable only for 429/5xx responses.
    pub fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        let retryable = matches!(status, Some(429) | Some(500..=599)) || status.is_none();
        Self {
            kind: ErrorKind::ProviderError,
            message: message.into(),
            retryable,
            results: None,
        }
    }

    pub fn error_code(&self) -> Option<&'static str> {
        self.kind.error_code()
    }
}

impl From<dipc_task_store::TaskStoreError> for HandlerError {
    fn from(err: dipc_task_store::TaskStoreError) -> Self {
        use dipc_task_store::TaskStoreError::*;
        match &err {
            TaskNotFound(_) | FileNotFound(_) => HandlerError::not_found(err.to_string()),
            Database(_) => HandlerError::transient_io(err.to_string()),
            _ => HandlerError::validation(err.to_string()),
        }
    }
}

impl From<dipc_queue::QueueError> for HandlerError {
    fn from(err: dipc_queue::QueueError) -> Self {
        HandlerError::transient_io(err.to_string())
    }
}

impl From<dipc_archive::ArchiveError> for HandlerError {
    fn from(err: dipc_archive::ArchiveError) -> Self {
        use dipc_archive::ArchiveError::*;
        match &err {
            ZipBomb { .. } => HandlerError::security_violation(err.to_string()),
            InvalidArchive(_) | TooManyFiles { .. } | EmptyArchive => {
                HandlerError::validation(err.to_string())
            }
            Io(_) => HandlerError::transient_io(err.to_string()),
        }
    }
}
