//! Queue message schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Archive,
    Parse,
    Vectorize,
    Cleanup,
    /// Not targeted by `Enqueue`; only reached via dead-lettering.
    DeadLetter,
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueName::Archive => "archive",
            QueueName::Parse => "parse",
            QueueName::Vectorize => "vectorize",
            QueueName::Cleanup => "cleanup",
            QueueName::DeadLetter => "dead-letter",
        };
        f.write_str(s)
    }
}

/// `{task_id, correlation_id, submitted_at, args}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub task_id: String,
    pub correlation_id: String,
    pub submitted_at: DateTime<Utc>,
    pub args: Value,
    /// Number of prior delivery attempts; incremented by the fabric on
    /// redelivery, not by callers. Drives the `max_retries` dead-letter cutoff.
    #[serde(default)]
    pub delivery_count: u32,
}

impl QueueMessage {
    pub fn new(task_id: impl Into<String>, args: Value) -> Self {
        Self {
            task_id: task_id.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            submitted_at: Utc::now(),
            args,
            delivery_count: 0,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

/// A delivered message plus an opaque receipt handle used to `ack` it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: QueueMessage,
    pub receipt: String,
}
