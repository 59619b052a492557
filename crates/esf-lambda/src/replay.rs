//! Replay handlers wired into the shippers.

use async_trait::async_trait;
use esf_config::{Input, OutputType};
use esf_shipper::{ReplayHandler, ReplayMessage, ShipperError};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

use crate::queue::{MessageAttribute, QueueMessage, QueueSender};

/// Sends rejected events to the replay queue, tagged with the input they
/// came from and the forwarder config in use.
pub struct SqsReplayHandler {
    sender: Arc<dyn QueueSender>,
    queue_url: String,
    config_yaml: String,
    event_input_id: String,
    event_input_type: String,
}

impl SqsReplayHandler {
    pub fn new(
        sender: Arc<dyn QueueSender>,
        queue_url: impl Into<String>,
        config_yaml: impl Into<String>,
        input: &Input,
    ) -> Self {
        Self {
            sender,
            queue_url: queue_url.into(),
            config_yaml: config_yaml.into(),
            event_input_id: input.id.clone(),
            event_input_type: input.input_type.to_string(),
        }
    }
}

#[async_trait]
impl ReplayHandler for SqsReplayHandler {
    async fn replay(
        &self,
        output_type: OutputType,
        output_args: Value,
        event_payload: Value,
    ) -> Result<(), ShipperError> {
        let message = ReplayMessage {
            output_type: output_type.to_string(),
            output_args,
            event_payload,
            event_input_id: self.event_input_id.clone(),
            event_input_type: self.event_input_type.clone(),
        };
        let body = serde_json::to_string(&message)?;

        self.sender
            .send(QueueMessage {
                queue_url: self.queue_url.clone(),
                body,
                attributes: vec![MessageAttribute::string("config", self.config_yaml.clone())],
            })
            .await
            .map_err(|e| ShipperError::Replay(e.to_string()))?;

        tracing::warn!(
            event_input_id = %message.event_input_id,
            event_input_type = %message.event_input_type,
            output_type = %message.output_type,
            "sent to replay queue"
        );
        Ok(())
    }
}

/// Counts events rejected while shipping a replayed message.
#[derive(Default)]
pub struct ReplayFailures {
    failed: Mutex<usize>,
}

impl ReplayFailures {
    pub fn count(&self) -> usize {
        *self.failed.lock()
    }
}

#[async_trait]
impl ReplayHandler for ReplayFailures {
    async fn replay(
        &self,
        output_type: OutputType,
        _output_args: Value,
        _event_payload: Value,
    ) -> Result<(), ShipperError> {
        tracing::warn!(output_type = %output_type, "replayed event failed to be shipped");
        *self.failed.lock() += 1;
        Ok(())
    }
}
