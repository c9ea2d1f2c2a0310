//! In-memory queue fabric backend.
//!
//! Models SQS-like visibility timeouts with plain `tokio::sync` primitives:
//! a dequeued message moves from `ready` into `in_flight` with a visibility
//! deadline; if it is not acked before the deadline, the next `dequeue` call
//! reclaims it back onto `ready` — this is the mechanism behind "if the
//! worker dies, the message is re-delivered".

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::QueueError;
use crate::message::{Delivery, QueueMessage, QueueName};
use crate::traits::{QueueDepth, QueueFabric};

#[derive(Debug, Clone, Copy)]
pub struct InMemoryQueueConfig {
    /// Soft threshold surfaced through health checks.
    pub soft_threshold: usize,
    /// Hard limit past which enqueue is refused.
    pub hard_limit: usize,
    /// How long a dequeued-but-unacked message stays invisible before
    /// being reclaimed.
    pub visibility_timeout: Duration,
}

impl Default for InMemoryQueueConfig {
    fn default() -> Self {
        Self {
            soft_threshold: 1000,
            hard_limit: 10_000,
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

struct InFlightEntry {
    message: QueueMessage,
    deadline: Instant,
}

struct DelayedEntry {
    message: QueueMessage,
    ready_at: Instant,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueueMessage>,
    delayed: Vec<DelayedEntry>,
    in_flight: HashMap<String, InFlightEntry>,
}

impl QueueState {
    fn total_len(&self) -> usize {
        self.ready.len() + self.delayed.len() + self.in_flight.len()
    }

    /// Moves any delayed entries whose time has come, and any expired
    /// in-flight entries, onto `ready`.
    fn reclaim(&mut self) {
        let now = Instant::now();

        let mut still_delayed = Vec::with_capacity(self.delayed.len());
        for entry in self.delayed.drain(..) {
            if entry.ready_at <= now {
                self.ready.push_back(entry.message);
            } else {
                still_delayed.push(entry);
            }
        }
        self.delayed = still_delayed;

        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(entry) = self.in_flight.remove(&receipt) {
                self.ready.push_back(entry.message);
            }
        }
    }
}

pub struct InMemoryQueueFabric {
    config: InMemoryQueueConfig,
    queues: Mutex<HashMap<QueueName, QueueState>>,
    dead_letters: Mutex<HashMap<(QueueName, String), (QueueMessage, String)>>,
    notify: Notify,
}

impl InMemoryQueueFabric {
    pub fn new() -> Self {
        Self::with_config(InMemoryQueueConfig::default())
    }

    pub fn with_config(config: InMemoryQueueConfig) -> Self {
        Self {
            config,
            queues: Mutex::new(HashMap::new()),
            dead_letters: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }
}

impl Default for InMemoryQueueFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueFabric for InMemoryQueueFabric {
    fn backend_name(&self) -> &'static str {
        "in-memory"
    }

    async fn enqueue(&self, queue: QueueName, message: QueueMessage) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();
        if state.total_len() >= self.config.hard_limit {
            return Err(QueueError::Saturated(queue.to_string()));
        }
        state.ready.push_back(message);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn enqueue_after(
        &self,
        queue: QueueName,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();
        if state.total_len() >= self.config.hard_limit {
            return Err(QueueError::Saturated(queue.to_string()));
        }
        state.delayed.push(DelayedEntry {
            message,
            ready_at: Instant::now() + delay,
        });
        Ok(())
    }

    async fn dequeue(&self, queue: QueueName, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut queues = self.queues.lock().await;
                let state = queues.entry(queue).or_default();
                state.reclaim();
                if let Some(mut message) = state.ready.pop_front() {
                    message.delivery_count += 1;
                    let receipt = Uuid::new_v4().to_string();
                    state.in_flight.insert(
                        receipt.clone(),
                        InFlightEntry {
                            message: message.clone(),
                            deadline: Instant::now() + self.config.visibility_timeout,
                        },
                    );
                    return Ok(Some(Delivery { message, receipt }));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let remaining = deadline - now;
            let wait = remaining.min(Duration::from_millis(100));
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn ack(&self, queue: QueueName, delivery: &Delivery) -> Result<(), QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();
        state
            .in_flight
            .remove(&delivery.receipt)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownReceipt(delivery.receipt.clone()))
    }

    async fn dead_letter(&self, source_queue: QueueName, message: QueueMessage, reason: String) -> Result<(), QueueError> {
        let mut dlq = self.dead_letters.lock().await;
        dlq.insert((source_queue, message.task_id.clone()), (message, reason));
        Ok(())
    }

    async fn requeue_dead_letter(&self, source_queue: QueueName, task_id: &str) -> Result<bool, QueueError> {
        let entry = {
            let mut dlq = self.dead_letters.lock().await;
            dlq.remove(&(source_queue, task_id.to_string()))
        };
        match entry {
            Some((mut message, _reason)) => {
                message.delivery_count = 0;
                self.enqueue(source_queue, message).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn depth(&self, queue: QueueName) -> Result<QueueDepth, QueueError> {
        let mut queues = self.queues.lock().await;
        let state = queues.entry(queue).or_default();
        state.reclaim();
        Ok(QueueDepth {
            ready: state.ready.len(),
            in_flight: state.in_flight.len(),
            delayed: state.delayed.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn enqueue_then_dequeue_roundtrips() {
        let fabric = InMemoryQueueFabric::new();
        let msg = QueueMessage::new("t1", json!({"file_url": "https://x/a.pdf"}));
        fabric.enqueue(QueueName::Parse, msg).await.unwrap();

        let delivery = fabric
            .dequeue(QueueName::Parse, Duration::from_millis(100))
            .await
            .unwrap()
            .expect("message available");
        assert_eq!(delivery.message.task_id, "t1");
        assert_eq!(delivery.message.delivery_count, 1);

        fabric.ack(QueueName::Parse, &delivery).await.unwrap();
        let depth = fabric.depth(QueueName::Parse).await.unwrap();
        assert_eq!(depth.ready + depth.in_flight, 0);
    }

    #[tokio::test]
    async fn dequeue_times_out_when_empty() {
        let fabric = InMemoryQueueFabric::new();
        let result = fabric
            .dequeue(QueueName::Parse, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unacked_message_is_redelivered_after_visibility_timeout() {
        let fabric = InMemoryQueueFabric::with_config(InMemoryQueueConfig {
            visibility_timeout: Duration::from_millis(20),
            ..InMemoryQueueConfig::default()
        });
        fabric
            .enqueue(QueueName::Parse, QueueMessage::new("t1", json!({})))
            .await
            .unwrap();

        let first = fabric
            .dequeue(QueueName::Parse, Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        // Simulate worker death: never ack.
        drop(first);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = fabric
            .dequeue(QueueName::Parse, Duration::from_millis(200))
            .await
            .unwrap()
            .expect("message redelivered after visibility timeout");
        assert_eq!(second.message.task_id, "t1");
        assert_eq!(second.message.delivery_count, 2);
    }

    #[tokio::test]
    async fn enqueue_after_is_not_visible_before_delay_elapses() {
        let fabric = InMemoryQueueFabric::new();
        fabric
            .enqueue_after(QueueName::Cleanup, QueueMessage::new("t1", json!({})), Duration::from_millis(100))
            .await
            .unwrap();

        let immediate = fabric
            .dequeue(QueueName::Cleanup, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(immediate.is_none());

        tokio::time::sleep(Duration::from_millis(110)).await;
        let later = fabric
            .dequeue(QueueName::Cleanup, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(later.is_some());
    }

    #[tokio::test]
    async fn hard_limit_rejects_further_enqueues() {
        let fabric = InMemoryQueueFabric::with_config(InMemoryQueueConfig {
            hard_limit: 2,
            ..InMemoryQueueConfig::default()
        });
        fabric.enqueue(QueueName::Parse, QueueMessage::new("t1", json!({}))).await.unwrap();
        fabric.enqueue(QueueName::Parse, QueueMessage::new("t2", json!({}))).await.unwrap();
        let result = fabric.enqueue(QueueName::Parse, QueueMessage::new("t3", json!({}))).await;
        assert!(matches!(result, Err(QueueError::Saturated(_))));
    }

    #[tokio::test]
    async fn dead_letter_and_requeue() {
        let fabric = InMemoryQueueFabric::new();
        let msg = QueueMessage::new("t1", json!({}));
        fabric.dead_letter(QueueName::Parse, msg, "exhausted retries".into()).await.unwrap();

        let requeued = fabric.requeue_dead_letter(QueueName::Parse, "t1").await.unwrap();
        assert!(requeued);
        let delivery = fabric
            .dequeue(QueueName::Parse, Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message.task_id, "t1");
    }
}
