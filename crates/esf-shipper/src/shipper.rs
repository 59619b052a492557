use async_trait::async_trait;
use esf_core::EventIdGenerator;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::replay::ReplayHandler;

/// An output that buffers events and ships them in batches.
#[async_trait]
pub trait Shipper: Send {
    async fn send(&mut self, event: Value) -> Result<()>;

    /// Ship everything buffered so far
    async fn flush(&mut self) -> Result<()>;

    fn set_event_id_generator(&mut self, generator: EventIdGenerator);

    fn set_replay_handler(&mut self, handler: Arc<dyn ReplayHandler>);
}
