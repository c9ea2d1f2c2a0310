//! Queue fabric errors.

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue saturated: {0} has reached its hard enqueue limit")]
    Saturated(String),

    #[error("unknown delivery receipt: {0}")]
    UnknownReceipt(String),

    #[error("broker error: {0}")]
    Broker(String),
}

impl QueueError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, QueueError::Broker(_))
    }
}

#[cfg(feature = "sqs")]
impl From<aws_sdk_sqs::error::SdkError<aws_sdk_sqs::operation::send_message::SendMessageError>>
    for QueueError
{
    fn from(
        err: aws_sdk_sqs::error::SdkError<aws_sdk_sqs::operation::send_message::SendMessageError>,
    ) -> Self {
        QueueError::Broker(err.to_string())
    }
}
