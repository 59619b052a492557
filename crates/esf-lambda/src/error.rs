//! Handler errors and the Lambda error policy.

use esf_core::{StorageError, TriggerError};
use esf_shipper::ShipperError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error("config file: {0}")]
    ConfigFile(String),

    #[error("input config: {0}")]
    InputConfig(String),

    #[error("output config: {0}")]
    OutputConfig(String),

    /// At least one replayed event was rejected again
    #[error("{0} replayed events failed to be shipped")]
    ReplayFailed(usize),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Shipper(#[from] ShipperError),

    #[error("sqs: {0}")]
    Queue(String),
}

impl HandlerError {
    /// Fatal errors are returned to the Lambda platform so the trigger's
    /// retry and redrive settings apply. Anything else is logged and the
    /// invocation succeeds.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HandlerError::Trigger(_)
                | HandlerError::ConfigFile(_)
                | HandlerError::InputConfig(_)
                | HandlerError::OutputConfig(_)
                | HandlerError::ReplayFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HandlerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors() {
        assert!(HandlerError::Trigger(TriggerError::NotSupported).is_fatal());
        assert!(HandlerError::ConfigFile("missing".into()).is_fatal());
        assert!(HandlerError::InputConfig("not input set".into()).is_fatal());
        assert!(HandlerError::OutputConfig("bad args".into()).is_fatal());
        assert!(HandlerError::ReplayFailed(1).is_fatal());

        assert!(!HandlerError::Shipper(ShipperError::EmptyIndex).is_fatal());
        assert!(!HandlerError::Queue("throttled".into()).is_fatal());
    }

    #[test]
    fn trigger_error_message() {
        assert_eq!(
            HandlerError::Trigger(TriggerError::NotSupported).to_string(),
            "Not supported trigger"
        );
    }
}
