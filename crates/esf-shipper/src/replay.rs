//! Replay of events an output failed to ingest
//!
//! A shipper hands every rejected event to its replay handler together with
//! the output it was meant for. The Lambda wires a handler that sends a
//! [`ReplayMessage`] to the replay queue.

use async_trait::async_trait;
use esf_config::OutputType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[async_trait]
pub trait ReplayHandler: Send + Sync {
    async fn replay(
        &self,
        output_type: OutputType,
        output_args: Value,
        event_payload: Value,
    ) -> Result<()>;
}

/// Body of a message on the replay queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMessage {
    pub output_type: String,
    pub output_args: Value,
    pub event_payload: Value,
    pub event_input_id: String,
    pub event_input_type: String,
}

impl ReplayMessage {
    pub fn parse(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}
