//! Amazon SQS-backed queue fabric.
//!
//! Production backend for multi-process deployments. Visibility timeouts
//! and redelivery are native to SQS; this backend mostly maps the
//! `QueueFabric` trait onto `SendMessage`/`ReceiveMessage`/`DeleteMessage`.
//! `EnqueueAfter` uses SQS's native `DelaySeconds` (capped at 900s by the
//! service — callers needing longer delays should chain `enqueue_after`
//! calls from a cleanup handler, as C10 mode B already does).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::Client;
use tracing::warn;

use crate::error::QueueError;
use crate::message::{Delivery, QueueMessage, QueueName};
use crate::traits::{QueueDepth, QueueFabric};

#[derive(Debug, Clone, Default)]
pub struct SqsQueueUrls {
    pub archive: String,
    pub parse: String,
    pub vectorize: String,
    pub cleanup: String,
    pub dead_letter: String,
}

impl SqsQueueUrls {
    fn url_for(&self, queue: QueueName) -> &str {
        match queue {
            QueueName::Archive => &self.archive,
            QueueName::Parse => &self.parse,
            QueueName::Vectorize => &self.vectorize,
            QueueName::Cleanup => &self.cleanup,
            QueueName::DeadLetter => &self.dead_letter,
        }
    }
}

pub struct SqsQueueFabric {
    client: Client,
    urls: SqsQueueUrls,
}

impl SqsQueueFabric {
    pub fn new(client: Client, urls: SqsQueueUrls) -> Self {
        Self { client, urls }
    }

    pub async fn from_env(urls: SqsQueueUrls) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(Client::new(&config), urls)
    }
}

#[async_trait]
impl QueueFabric for SqsQueueFabric {
    fn backend_name(&self) -> &'static str {
        "sqs"
    }

    async fn enqueue(&self, queue: QueueName, message: QueueMessage) -> Result<(), QueueError> {
        let body = serde_json::to_string(&message).map_err(|e| QueueError::Broker(e.to_string()))?;
        self.client
            .send_message()
            .queue_url(self.urls.url_for(queue))
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Broker(e.to_string()))?;
        Ok(())
    }

    async fn enqueue_after(
        &self,
        queue: QueueName,
        message: QueueMessage,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let body = serde_json::to_string(&message).map_err(|e| QueueError::Broker(e.to_string()))?;
        let delay_secs = delay.as_secs().min(900) as i32;
        if delay.as_secs() > 900 {
            warn!(
                requested_secs = delay.as_secs(),
                "SQS DelaySeconds capped at 900s; caller should re-chain enqueue_after for longer delays"
            );
        }
        self.client
            .send_message()
            .queue_url(self.urls.url_for(queue))
            .message_body(body)
            .delay_seconds(delay_secs)
            .send()
            .await
            .map_err(|e| QueueError::Broker(e.to_string()))?;
        Ok(())
    }

    async fn dequeue(&self, queue: QueueName, timeout: Duration) -> Result<Option<Delivery>, QueueError> {
        let wait_secs = timeout.as_secs().clamp(0, 20) as i32;
        let response = self
            .client
            .receive_message()
            .queue_url(self.urls.url_for(queue))
            .max_number_of_messages(1)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|e| QueueError::Broker(e.to_string()))?;

        let Some(sqs_message) = response.messages.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };
        let body = sqs_message.body.unwrap_or_default();
        let mut message: QueueMessage =
            serde_json::from_str(&body).map_err(|e| QueueError::Broker(e.to_string()))?;

        let approx_receive_count = sqs_message
            .attributes
            .as_ref()
            .and_then(|attrs: &HashMap<_, _>| {
                attrs.get(&aws_sdk_sqs::types::MessageSystemAttributeName::ApproximateReceiveCount)
            })
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(message.delivery_count + 1);
        message.delivery_count = approx_receive_count;

        let receipt = sqs_message.receipt_handle.unwrap_or_default();
        Ok(Some(Delivery { message, receipt }))
    }

    async fn ack(&self, queue: QueueName, delivery: &Delivery) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(self.urls.url_for(queue))
            .receipt_handle(&delivery.receipt)
            .send()
            .await
            .map_err(|e| QueueError::Broker(e.to_string()))?;
        Ok(())
    }

    async fn dead_letter(&self, _source_queue: QueueName, message: QueueMessage, reason: String) -> Result<(), QueueError> {
        let mut message = message;
        message.args["dead_letter_reason"] = serde_json::Value::String(reason);
        self.enqueue(QueueName::DeadLetter, message).await
    }

    async fn requeue_dead_letter(&self, source_queue: QueueName, task_id: &str) -> Result<bool, QueueError> {
        // SQS has no query-by-task-id primitive; operators requeue via the
        // AWS console/CLI redrive-policy tooling instead. Kept as an
        // explicit unsupported op so callers get a clear error rather than
        // a silent no-op.
        let _ = (source_queue, task_id);
        Err(QueueError::Broker(
            "requeue_dead_letter is not supported on the SQS backend; use queue redrive".into(),
        ))
    }

    async fn depth(&self, queue: QueueName) -> Result<QueueDepth, QueueError> {
        let response = self
            .client
            .get_queue_attributes()
            .queue_url(self.urls.url_for(queue))
            .attribute_names(aws_sdk_sqs::types::QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(aws_sdk_sqs::types::QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .attribute_names(aws_sdk_sqs::types::QueueAttributeName::ApproximateNumberOfMessagesDelayed)
            .send()
            .await
            .map_err(|e| QueueError::Broker(e.to_string()))?;

        let attrs = response.attributes.unwrap_or_default();
        let parse = |key: aws_sdk_sqs::types::QueueAttributeName| -> usize {
            attrs.get(&key).and_then(|v| v.parse().ok()).unwrap_or(0)
        };
        Ok(QueueDepth {
            ready: parse(aws_sdk_sqs::types::QueueAttributeName::ApproximateNumberOfMessages),
            in_flight: parse(aws_sdk_sqs::types::QueueAttributeName::ApproximateNumberOfMessagesNotVisible),
            delayed: parse(aws_sdk_sqs::types::QueueAttributeName::ApproximateNumberOfMessagesDelayed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_for_maps_every_queue_name_to_its_configured_url() {
        let urls = SqsQueueUrls {
            archive: "https://sqs/archive".to_string(),
            parse: "https://sqs/parse".to_string(),
            vectorize: "https://sqs/vectorize".to_string(),
            cleanup: "https://sqs/cleanup".to_string(),
            dead_letter: "https://sqs/dlq".to_string(),
        };
        assert_eq!(urls.url_for(QueueName::Archive), "https://sqs/archive");
        assert_eq!(urls.url_for(QueueName::Parse), "https://sqs/parse");
        assert_eq!(urls.url_for(QueueName::Vectorize), "https://sqs/vectorize");
        assert_eq!(urls.url_for(QueueName::Cleanup), "https://sqs/cleanup");
        assert_eq!(urls.url_for(QueueName::DeadLetter), "https://sqs/dlq");
    }
}
