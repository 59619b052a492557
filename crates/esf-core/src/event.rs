//! Event documents produced from log lines
//!
//! Every event has an `@timestamp` set at read time and a `fields` object
//! holding the message and where it came from. Shippers add their own
//! metadata on top.

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

/// Location of a line inside an S3 object
#[derive(Debug, Clone, Copy)]
pub struct S3Origin<'a> {
    pub bucket_name: &'a str,
    pub bucket_arn: &'a str,
    /// Decoded object key
    pub object_key: &'a str,
    pub region: &'a str,
}

/// Location of a line inside a Kinesis record
#[derive(Debug, Clone, Copy)]
pub struct KinesisOrigin<'a> {
    pub stream_arn: &'a str,
    pub stream_type: &'a str,
    pub stream_name: &'a str,
    pub partition_key: &'a str,
    pub sequence_number: &'a str,
    pub region: &'a str,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn s3_event(message: &str, offset: u64, origin: &S3Origin<'_>) -> Value {
    json!({
        "@timestamp": timestamp(),
        "fields": {
            "message": message,
            "log": {
                "offset": offset,
                "file": {
                    "path": format!(
                        "https://{}.s3.{}.amazonaws.com/{}",
                        origin.bucket_name, origin.region, origin.object_key
                    ),
                },
            },
            "aws": {
                "s3": {
                    "bucket": {"name": origin.bucket_name, "arn": origin.bucket_arn},
                    "object": {"key": origin.object_key},
                },
            },
            "cloud": {"provider": "aws", "region": origin.region},
        },
    })
}

pub fn kinesis_event(message: &str, offset: u64, origin: &KinesisOrigin<'_>) -> Value {
    json!({
        "@timestamp": timestamp(),
        "fields": {
            "message": message,
            "log": {
                "offset": offset,
                "file": {"path": origin.stream_arn},
            },
            "aws": {
                "kinesis": {
                    "type": origin.stream_type,
                    "name": origin.stream_name,
                    "partition_key": origin.partition_key,
                    "sequence_number": origin.sequence_number,
                },
            },
            "cloud": {"provider": "aws", "region": origin.region},
        },
    })
}

/// The raw message of an event, used as `event.original`
pub fn event_message(event: &Value) -> Option<&str> {
    event.pointer("/fields/message").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_id::{kinesis_record_id, s3_object_id};

    #[test]
    fn s3_event_carries_origin() {
        let origin = S3Origin {
            bucket_name: "logs",
            bucket_arn: "arn:aws:s3:::logs",
            object_key: "app/file.log",
            region: "eu-central-1",
        };
        let event = s3_event("hello", 12, &origin);

        assert_eq!(event_message(&event), Some("hello"));
        assert_eq!(event["fields"]["log"]["offset"], 12);
        assert_eq!(
            event["fields"]["log"]["file"]["path"],
            "https://logs.s3.eu-central-1.amazonaws.com/app/file.log"
        );
        assert_eq!(event["fields"]["cloud"]["region"], "eu-central-1");
        assert!(event["@timestamp"].as_str().unwrap().ends_with('Z'));
        assert!(s3_object_id(&event).is_some());
    }

    #[test]
    fn kinesis_event_is_addressable() {
        let origin = KinesisOrigin {
            stream_arn: "arn:aws:kinesis:eu-central-1:1:stream/app-logs",
            stream_type: "stream",
            stream_name: "app-logs",
            partition_key: "pk",
            sequence_number: "4959",
            region: "eu-central-1",
        };
        let event = kinesis_event("line", 0, &origin);
        assert_eq!(event["fields"]["aws"]["kinesis"]["name"], "app-logs");
        assert!(kinesis_record_id(&event).is_some());
    }
}
