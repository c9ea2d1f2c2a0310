//! The `QueueFabric` trait.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::QueueError;
use crate::message::{Delivery, QueueMessage, QueueName};

/// Backpressure/health snapshot for one named queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueDepth {
    pub ready: usize,
    pub in_flight: usize,
    pub delayed: usize,
}

/// Named, at-least-once queues with per-message ack and redelivery on worker
/// loss. FIFO ordering is explicitly NOT guaranteed —
/// handlers must be idempotent keyed by `task_id`.
#[async_trait]
pub trait QueueFabric: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Enqueue for immediate delivery. Returns `QueueError::Saturated` once
    /// the hard limit is reached instead of silently dropping the message.
    async fn enqueue(&self, queue: QueueName, message: QueueMessage) -> Result<(), QueueError>;

    /// `EnqueueAfter(queue, msg, delay)` — delayed delivery, used for
    /// self-rescheduling cleanup and retry backoff.
    async fn enqueue_after(
        &self,
        queue: QueueName,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<(), QueueError>;

    /// Blocking poll with `timeout`. A returned `Delivery` is NOT removed
    /// from the queue until `ack` is called — if the worker dies before
    /// acking, the message becomes visible again after its delivery's
    /// visibility window elapses.
    async fn dequeue(&self, queue: QueueName, timeout: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery: handler returned success, or a retry was
    /// already scheduled via `enqueue_after`.
    async fn ack(&self, queue: QueueName, delivery: &Delivery) -> Result<(), QueueError>;

    /// Move a message to the dead-letter queue after `max_retries` is
    /// exhausted. Acking the original delivery is the
    /// caller's responsibility.
    async fn dead_letter(&self, source_queue: QueueName, message: QueueMessage, reason: String) -> Result<(), QueueError>;

    /// Operational recovery: requeue a message from the dead-letter queue
    /// back onto its source queue.
    async fn requeue_dead_letter(&self, source_queue: QueueName, task_id: &str) -> Result<bool, QueueError>;

    /// Backpressure/health snapshot.
    async fn depth(&self, queue: QueueName) -> Result<QueueDepth, QueueError>;
}
