use async_trait::async_trait;
use esf_core::EventIdGenerator;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;
use crate::replay::ReplayHandler;
use crate::shipper::Shipper;

/// Fans every event out to all outputs of an input.
#[derive(Default)]
pub struct CompositeShipper {
    shippers: Vec<Box<dyn Shipper>>,
}

impl CompositeShipper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shipper(&mut self, shipper: Box<dyn Shipper>) {
        self.shippers.push(shipper);
    }

    pub fn len(&self) -> usize {
        self.shippers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shippers.is_empty()
    }
}

#[async_trait]
impl Shipper for CompositeShipper {
    async fn send(&mut self, event: Value) -> Result<()> {
        for shipper in &mut self.shippers {
            shipper.send(event.clone()).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        for shipper in &mut self.shippers {
            shipper.flush().await?;
        }
        Ok(())
    }

    fn set_event_id_generator(&mut self, generator: EventIdGenerator) {
        for shipper in &mut self.shippers {
            shipper.set_event_id_generator(generator);
        }
    }

    fn set_replay_handler(&mut self, handler: Arc<dyn ReplayHandler>) {
        for shipper in &mut self.shippers {
            shipper.set_replay_handler(handler.clone());
        }
    }
}
