//! Per-invocation worker context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dipc_task_store::TaskStore;

use crate::error::HandlerError;

/// Bound to the current scope for the duration of one handler invocation:
/// `task_id`, `user_id`, `correlation_id`, and a deadline derived from
/// `per_stage_timeout`.
#[derive(Clone)]
pub struct WorkerContext {
    pub task_id: String,
    pub user_id: String,
    pub correlation_id: String,
    pub deadline: Instant,
    task_store: Arc<dyn TaskStore>,
}

impl WorkerContext {
    pub fn new(
        task_id: String,
        user_id: String,
        correlation_id: String,
        per_stage_timeout: Duration,
        task_store: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            task_id,
            user_id,
            correlation_id,
            deadline: Instant::now() + per_stage_timeout,
            task_store,
        }
    }

    pub fn time_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Re-reads task status at a coarse checkpoint (entry, before LLM call,
    /// before writing results) and returns `Err(Cancelled)` if a user
    /// requested cancellation in the meantime. Cancellation is cooperative:
    /// it never interrupts an in-flight collaborator call.
    pub async fn check_cancelled(&self) -> Result<(), HandlerError> {
        let task = self
            .task_store
            .get_task(&self.task_id)
            .await?
            .ok_or_else(|| HandlerError::not_found(format!("task {} vanished", self.task_id)))?;
        if task.status == dipc_domain::TaskStatus::Cancelled {
            return Err(HandlerError::cancelled());
        }
        Ok(())
    }
}
