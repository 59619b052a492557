//! SQS access for the continuing and replay queues.

use async_trait::async_trait;
use aws_sdk_sqs::types::MessageAttributeValue;

use crate::error::{HandlerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttribute {
    pub name: String,
    /// `String` or `Number`
    pub data_type: &'static str,
    pub value: String,
}

impl MessageAttribute {
    pub fn string(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            data_type: "String",
            value: value.into(),
        }
    }

    pub fn number(name: &str, value: u64) -> Self {
        Self {
            name: name.to_string(),
            data_type: "Number",
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub queue_url: String,
    pub body: String,
    pub attributes: Vec<MessageAttribute>,
}

impl QueueMessage {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .map(|attribute| attribute.value.as_str())
    }
}

#[async_trait]
pub trait QueueSender: Send + Sync {
    async fn send(&self, message: QueueMessage) -> Result<()>;
}

pub struct SqsQueueSender {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueSender {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    /// Client configured from the Lambda environment
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::new(aws_sdk_sqs::Client::new(&config))
    }
}

#[async_trait]
impl QueueSender for SqsQueueSender {
    async fn send(&self, message: QueueMessage) -> Result<()> {
        let mut request = self
            .client
            .send_message()
            .queue_url(&message.queue_url)
            .message_body(message.body);

        for attribute in message.attributes {
            let value = MessageAttributeValue::builder()
                .data_type(attribute.data_type)
                .string_value(attribute.value)
                .build()
                .map_err(|e| HandlerError::Queue(e.to_string()))?;
            request = request.message_attributes(attribute.name, value);
        }

        let output = request
            .send()
            .await
            .map_err(|error| {
                HandlerError::Queue(format!(
                    "failed to send message to {}: {}",
                    message.queue_url,
                    aws_sdk_sqs::error::DisplayErrorContext(error)
                ))
            })?;

        tracing::debug!(
            queue_url = %message.queue_url,
            message_id = output.message_id().unwrap_or_default(),
            "message sent"
        );
        Ok(())
    }
}
