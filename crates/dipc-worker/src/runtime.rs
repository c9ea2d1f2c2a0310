//! Worker Runtime.
//!
//! Each logical slot loops: dequeue, claim, bind context, run the
//! stage-appropriate handler, finalize. Multiple slots run concurrently
//! within a process and share only read-only configuration, the task
//! store's connection pool, and the queue fabric.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dipc_domain::{StatusUpdate, Task, TaskStatus};
use dipc_queue::{backoff::compute_backoff, Delivery, QueueFabric, QueueMessage, QueueName};
use dipc_task_store::{TaskStore, TaskStoreError};

use crate::context::WorkerContext;
use crate::error::{ErrorKind, HandlerError};

/// What a stage handler hands back to the runtime for finalization.
pub enum HandlerOutcome {
    Completed {
        results: serde_json::Value,
        actual_cost_usd: Option<f64>,
        token_usage: Option<dipc_domain::TokenUsage>,
    },
    /// The handler rescheduled itself and wants the runtime to leave the
    /// task non-terminal.
    /// The legal-transition table has no `processing -> pending` edge, so
    /// the runtime instead moves the task to `retrying` without consuming
    /// a retry attempt — see DESIGN.md for this Open Question's resolution.
    Deferred,
}

/// One stage handler per named queue (C7-C10).
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &WorkerContext,
        message: &QueueMessage,
    ) -> Result<HandlerOutcome, HandlerError>;
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub per_stage_timeout: Duration,
    pub dequeue_timeout: Duration,
    pub max_retries: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            per_stage_timeout: Duration::from_secs(300),
            dequeue_timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

pub struct WorkerRuntime {
    task_store: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueFabric>,
    handlers: HashMap<QueueName, Arc<dyn StageHandler>>,
    config: RuntimeConfig,
}

impl WorkerRuntime {
    pub fn new(task_store: Arc<dyn TaskStore>, queue: Arc<dyn QueueFabric>, config: RuntimeConfig) -> Self {
        Self {
            task_store,
            queue,
            handlers: HashMap::new(),
            config,
        }
    }

    pub fn register(&mut self, queue_name: QueueName, handler: Arc<dyn StageHandler>) {
        self.handlers.insert(queue_name, handler);
    }

    /// Runs `concurrency` logical slots against `queue_name`, forever.
    /// Returns only if every slot's loop exits, which happens only on an
    /// unrecoverable queue error.
    pub async fn run(self: Arc<Self>, queue_name: QueueName, concurrency: u32) {
        let mut slots = Vec::with_capacity(concurrency as usize);
        for slot in 0..concurrency.max(1) {
            let this = Arc::clone(&self);
            slots.push(tokio::spawn(async move {
                this.run_slot(queue_name, slot).await;
            }));
        }
        for slot in slots {
            let _ = slot.await;
        }
    }

    async fn run_slot(&self, queue_name: QueueName, slot: u32) {
        loop {
            let delivery = match self.queue.dequeue(queue_name, self.config.dequeue_timeout).await {
                Ok(Some(d)) => d,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(queue = %queue_name, slot, error = %e, "dequeue failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if let Err(e) = self.process_one(queue_name, &delivery).await {
                tracing::error!(
                    queue = %queue_name,
                    slot,
                    task_id = %delivery.message.task_id,
                    error = %e,
                    "unhandled error processing delivery"
                );
            }
        }
    }

    async fn claim(&self, task_id: &str) -> Result<Option<Task>, TaskStoreError> {
        let claimed = self
            .task_store
            .update_status(
                task_id,
                &[TaskStatus::Pending, TaskStatus::Retrying],
                TaskStatus::Processing,
                StatusUpdate::default(),
            )
            .await;

        match claimed {
            Ok(task) => Ok(Some(task)),
            Err(TaskStoreError::PreconditionFailed { actual, .. }) if actual == TaskStatus::Processing => {
                self.try_stale_reclaim(task_id).await
            }
            Err(TaskStoreError::PreconditionFailed { .. }) => Ok(None),
            Err(TaskStoreError::TaskNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Worker-lost safety: a task stuck `processing`
    /// for longer than `per_stage_timeout * 2` is assumed orphaned by a
    /// dead worker and reclaimed.
    async fn try_stale_reclaim(&self, task_id: &str) -> Result<Option<Task>, TaskStoreError> {
        let Some(task) = self.task_store.get_task(task_id).await? else {
            return Ok(None);
        };
        if task.status != TaskStatus::Processing {
            return Ok(None);
        }
        let cutoff = self.config.per_stage_timeout * 2;
        let stale_for = Utc::now().signed_duration_since(task.updated_at);
        if stale_for < chrono::Duration::from_std(cutoff).unwrap_or(chrono::Duration::zero()) {
            return Ok(None);
        }
        tracing::warn!(task_id, "reclaiming stale processing task from a presumed-dead worker");
        match self
            .task_store
            .update_status(
                task_id,
                &[TaskStatus::Processing],
                TaskStatus::Processing,
                StatusUpdate::default(),
            )
            .await
        {
            Ok(task) => Ok(Some(task)),
            Err(TaskStoreError::PreconditionFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn process_one(&self, queue_name: QueueName, delivery: &Delivery) -> Result<(), HandlerError> {
        let task_id = delivery.message.task_id.clone();

        let task = match self.claim(&task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                // Already terminal or claimed by another worker: ack and move on.
                self.queue.ack(queue_name, delivery).await?;
                return Ok(());
            }
            Err(e) => {
                // Leave unacked; the fabric redelivers after the visibility window.
                tracing::warn!(task_id, error = %e, "claim failed, leaving delivery for redelivery");
                return Ok(());
            }
        };

        let ctx = WorkerContext::new(
            task_id.clone(),
            task.user_id.clone(),
            delivery.message.correlation_id.clone(),
            self.config.per_stage_timeout,
            Arc::clone(&self.task_store),
        );

        let Some(handler) = self.handlers.get(&queue_name) else {
            tracing::error!(queue = %queue_name, "no handler registered for queue");
            self.fail_task(&task_id, &HandlerError::validation("no handler registered")).await;
            self.queue.ack(queue_name, delivery).await?;
            return Ok(());
        };

        let outcome = handler.handle(&ctx, &delivery.message).await;
        self.finalize(queue_name, delivery, &task, outcome).await
    }

    async fn finalize(
        &self,
        queue_name: QueueName,
        delivery: &Delivery,
        task: &Task,
        outcome: Result<HandlerOutcome, HandlerError>,
    ) -> Result<(), HandlerError> {
        match outcome {
            Ok(HandlerOutcome::Completed {
                results,
                actual_cost_usd,
                token_usage,
            }) => {
                self.task_store
                    .update_status(
                        &task.id,
                        &[TaskStatus::Processing],
                        TaskStatus::Completed,
                        StatusUpdate {
                            results: Some(results),
                            actual_cost_usd,
                            token_usage,
                            ..Default::default()
                        },
                    )
                    .await?;
                self.queue.ack(queue_name, delivery).await?;
            }
            Ok(HandlerOutcome::Deferred) => {
                self.task_store
                    .update_status(
                        &task.id,
                        &[TaskStatus::Processing],
                        TaskStatus::Retrying,
                        StatusUpdate::default(),
                    )
                    .await?;
                self.queue.ack(queue_name, delivery).await?;
            }
            Err(handler_error) => {
                self.handle_failure(queue_name, delivery, task, handler_error).await?;
            }
        }
        Ok(())
    }

    async fn handle_failure(
        &self,
        queue_name: QueueName,
        delivery: &Delivery,
        task: &Task,
        handler_error: HandlerError,
    ) -> Result<(), HandlerError> {
        let retry_count = task.retry_count + 1;
        let should_retry = handler_error.retryable
            && handler_error.kind != ErrorKind::Cancelled
            && retry_count <= self.config.max_retries;

        if should_retry {
            self.task_store
                .update_status(
                    &task.id,
                    &[TaskStatus::Processing],
                    TaskStatus::Retrying,
                    StatusUpdate {
                        error_message: Some(handler_error.message.clone()),
                        error_code: handler_error.error_code().map(String::from),
                        results: handler_error.results.clone(),
                        ..Default::default()
                    },
                )
                .await?;

            let mut retry_message = delivery.message.clone();
            retry_message.delivery_count += 1;
            let delay = compute_backoff(retry_count);
            self.queue.enqueue_after(queue_name, retry_message, delay).await?;
            self.queue.ack(queue_name, delivery).await?;
        } else {
            self.fail_task(&task.id, &handler_error).await;
            self.queue.ack(queue_name, delivery).await?;
            self.queue
                .dead_letter(queue_name, delivery.message.clone(), handler_error.to_string())
                .await?;
        }
        Ok(())
    }

    async fn fail_task(&self, task_id: &str, handler_error: &HandlerError) {
        let result = self
            .task_store
            .update_status(
                task_id,
                &[TaskStatus::Processing],
                TaskStatus::Failed,
                StatusUpdate {
                    error_message: Some(handler_error.message.clone()),
                    error_code: handler_error.error_code().map(String::from),
                    results: handler_error.results.clone(),
                    ..Default::default()
                },
            )
            .await;
        if let Err(e) = result {
            tracing::error!(task_id, error = %e, "failed to mark task as failed");
        }
    }
}
