//! Health/readiness surface.
//!
//! No HTTP server is implemented; this computes a composed-checks snapshot
//! as plain data, for the binary's periodic log line or an embedding HTTP
//! layer to serve.

use std::sync::Arc;

use dipc_queue::{QueueFabric, QueueName};
use dipc_task_store::TaskStore;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub queue: String,
    pub ready: usize,
    pub in_flight: usize,
    pub delayed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub task_store_reachable: bool,
    pub queues: Vec<QueueHealth>,
    pub worker_slots_configured: u32,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.task_store_reachable
    }
}

/// Probes the task store (a lightweight `count_by_status` call) and every
/// named queue's depth. Individual probe failures degrade the report rather
/// than aborting it.
pub async fn check(task_store: &Arc<dyn TaskStore>, queue: &Arc<dyn QueueFabric>, worker_slots_configured: u32) -> HealthReport {
    let task_store_reachable = task_store.count_by_status(None).await.is_ok();

    let mut queues = Vec::new();
    for name in [QueueName::Archive, QueueName::Parse, QueueName::Vectorize, QueueName::Cleanup] {
        if let Ok(depth) = queue.depth(name).await {
            queues.push(QueueHealth {
                queue: name.to_string(),
                ready: depth.ready,
                in_flight: depth.in_flight,
                delayed: depth.delayed,
            });
        }
    }

    HealthReport {
        task_store_reachable,
        queues,
        worker_slots_configured,
    }
}
