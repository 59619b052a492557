//! Lambda payload types for the SQS and Kinesis triggers
//!
//! The payloads come from `aws_lambda_events`; this module adds the lookups
//! the forwarder needs on top of them.

use percent_encoding::percent_decode_str;

pub use aws_lambda_events::kinesis::{KinesisEvent, KinesisEventRecord};
pub use aws_lambda_events::s3::{S3Event, S3EventRecord};
pub use aws_lambda_events::sqs::{SqsEvent, SqsMessage};

/// String value of a message attribute
pub fn message_attribute<'a>(message: &'a SqsMessage, name: &str) -> Option<&'a str> {
    message
        .message_attributes
        .get(name)
        .and_then(|attribute| attribute.string_value.as_deref())
}

/// Object key of an S3 notification record with S3's form encoding
/// (`+` for spaces, `%XX`) removed
pub fn object_key(record: &S3EventRecord) -> String {
    decode_object_key(record.s3.object.key.as_deref().unwrap_or_default())
}

pub fn decode_object_key(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}
