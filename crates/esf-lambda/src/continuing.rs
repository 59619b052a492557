//! Handing unfinished S3 notifications to the continuing queue.
//!
//! The continued message keeps the identity of the message it was cut from
//! and the offset to resume the first remaining object at.

use esf_core::{message_attribute, S3Event, S3EventRecord, SqsMessage};

use crate::error::Result;
use crate::queue::{MessageAttribute, QueueMessage, QueueSender};

pub const ATTR_CONFIG: &str = "config";
pub const ATTR_ORIGINAL_MESSAGE_ID: &str = "originalMessageId";
pub const ATTR_ORIGINAL_SENT_TIMESTAMP: &str = "originalSentTimestamp";
pub const ATTR_ORIGINAL_EVENT_SOURCE: &str = "originalEventSource";
pub const ATTR_ORIGINAL_LAST_ENDING_OFFSET: &str = "originalLastEndingOffset";

pub struct Continuation<'a> {
    pub queue_url: &'a str,
    pub config_yaml: &'a str,
    /// Id of the input the notifications belong to
    pub event_input_id: &'a str,
}

impl Continuation<'_> {
    /// Send `remaining` S3 records of `record`, resuming the first one at
    /// `last_ending_offset`.
    pub async fn send(
        &self,
        sender: &dyn QueueSender,
        record: &SqsMessage,
        remaining: &[S3EventRecord],
        last_ending_offset: u64,
    ) -> Result<()> {
        let mut notification = S3Event::default();
        notification.records = remaining.to_vec();
        let body = serde_json::to_string(&notification)?;

        let message_id = message_attribute(record, ATTR_ORIGINAL_MESSAGE_ID)
            .or(record.message_id.as_deref())
            .unwrap_or_default()
            .to_string();
        let sent_timestamp = message_attribute(record, ATTR_ORIGINAL_SENT_TIMESTAMP)
            .or_else(|| record.attributes.get("SentTimestamp").map(String::as_str))
            .unwrap_or_default()
            .to_string();

        let message = QueueMessage {
            queue_url: self.queue_url.to_string(),
            body,
            attributes: vec![
                MessageAttribute::string(ATTR_CONFIG, self.config_yaml),
                MessageAttribute::string(ATTR_ORIGINAL_MESSAGE_ID, message_id.clone()),
                MessageAttribute::string(ATTR_ORIGINAL_SENT_TIMESTAMP, sent_timestamp),
                MessageAttribute::string(ATTR_ORIGINAL_EVENT_SOURCE, self.event_input_id),
                MessageAttribute::number(ATTR_ORIGINAL_LAST_ENDING_OFFSET, last_ending_offset),
            ],
        };
        sender.send(message).await?;

        tracing::info!(
            original_message_id = %message_id,
            remaining_records = remaining.len(),
            last_ending_offset,
            "sent to continuing queue"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueSender;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<QueueMessage>>);

    #[async_trait]
    impl QueueSender for Recorder {
        async fn send(&self, message: QueueMessage) -> Result<()> {
            self.0.lock().push(message);
            Ok(())
        }
    }

    fn s3_record(key: &str) -> S3EventRecord {
        serde_json::from_value(json!({
            "awsRegion": "eu-central-1",
            "eventTime": "2022-04-15T10:00:00.000Z",
            "userIdentity": {"principalId": "AWS:1"},
            "requestParameters": {"sourceIPAddress": "127.0.0.1"},
            "s3": {"bucket": {"name": "b", "arn": "arn:aws:s3:::b"}, "object": {"key": key}},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn carries_original_identity_and_offset() {
        let record: SqsMessage = serde_json::from_value(json!({
            "messageId": "m-1",
            "body": "{}",
            "attributes": {"SentTimestamp": "1650000000000"},
        }))
        .unwrap();
        let recorder = Recorder::default();
        let continuation = Continuation {
            queue_url: "https://sqs.eu-central-1.amazonaws.com/1/continuing",
            config_yaml: "inputs: []",
            event_input_id: "arn:aws:sqs:eu-central-1:1:notifications",
        };

        continuation
            .send(&recorder, &record, &[s3_record("a.log"), s3_record("b.log")], 42)
            .await
            .unwrap();

        let sent = recorder.0.lock();
        let message = &sent[0];
        assert_eq!(message.attribute(ATTR_ORIGINAL_MESSAGE_ID), Some("m-1"));
        assert_eq!(message.attribute(ATTR_ORIGINAL_SENT_TIMESTAMP), Some("1650000000000"));
        assert_eq!(
            message.attribute(ATTR_ORIGINAL_EVENT_SOURCE),
            Some("arn:aws:sqs:eu-central-1:1:notifications")
        );
        assert_eq!(message.attribute(ATTR_ORIGINAL_LAST_ENDING_OFFSET), Some("42"));
        assert_eq!(message.attribute(ATTR_CONFIG), Some("inputs: []"));

        let offset = message
            .attributes
            .iter()
            .find(|a| a.name == ATTR_ORIGINAL_LAST_ENDING_OFFSET)
            .unwrap();
        assert_eq!(offset.data_type, "Number");

        let body: S3Event = serde_json::from_str(&message.body).unwrap();
        assert_eq!(body.records.len(), 2);
        assert_eq!(body.records[0].s3.object.key.as_deref(), Some("a.log"));
    }
}
