//! Trigger detection
//!
//! The function is bound to several event sources at once. The first record
//! of the invocation payload decides which handler runs and where the
//! forwarder configuration is read from.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Not supported trigger")]
    NotSupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerType {
    /// S3 notifications delivered through SQS, including continued messages
    S3Sqs,
    KinesisDataStream,
    /// Events sent back to the replay queue after a failed shipment
    ReplaySqs,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::S3Sqs => "s3-sqs",
            TriggerType::KinesisDataStream => "kinesis-data-stream",
            TriggerType::ReplaySqs => "replay-sqs",
        }
    }

    fn from_event_source(event_source: &str) -> Option<Self> {
        match event_source {
            "aws:sqs" => Some(TriggerType::S3Sqs),
            "aws:kinesis" => Some(TriggerType::KinesisDataStream),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the forwarder YAML is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// The `config` message attribute of the first record
    Payload,
    /// The object referenced by `S3_CONFIG_FILE`
    S3File,
}

/// Keys that identify a replay queue message body
const REPLAY_BODY_KEYS: [&str; 3] = ["output_type", "output_args", "event_payload"];

pub fn detect_trigger(event: &Value) -> Result<(TriggerType, ConfigSource), TriggerError> {
    let first = event
        .get("Records")
        .and_then(Value::as_array)
        .and_then(|records| records.first())
        .ok_or(TriggerError::NotSupported)?;

    if let Some(body) = first.get("body").and_then(Value::as_str) {
        if is_replay_body(body) {
            return Ok((TriggerType::ReplaySqs, ConfigSource::Payload));
        }
    }

    let trigger_type = first
        .get("eventSource")
        .and_then(Value::as_str)
        .and_then(TriggerType::from_event_source)
        .ok_or(TriggerError::NotSupported)?;

    match trigger_type {
        TriggerType::KinesisDataStream => {
            if first.pointer("/kinesis/data").is_none() {
                return Err(TriggerError::NotSupported);
            }
            Ok((trigger_type, ConfigSource::S3File))
        }
        _ => {
            let continued = first
                .get("messageAttributes")
                .and_then(|attributes| attributes.get("originalEventSource"))
                .is_some();
            if continued {
                Ok((trigger_type, ConfigSource::Payload))
            } else {
                Ok((trigger_type, ConfigSource::S3File))
            }
        }
    }
}

fn is_replay_body(body: &str) -> bool {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => REPLAY_BODY_KEYS.iter().all(|key| map.contains_key(*key)),
        _ => false,
    }
}
