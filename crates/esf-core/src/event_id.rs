//! Deterministic document ids
//!
//! Ids are stable across retries so a replayed or continued event that was
//! already indexed is rejected by Elasticsearch as a conflict instead of
//! being duplicated.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Derives the `_id` of a forwarded event, `None` when the event lacks the
/// fields the generator needs.
pub type EventIdGenerator = fn(&Value) -> Option<String>;

fn hashed_id(src: &str, offset: u64) -> String {
    let digest = hex::encode(Sha256::digest(src.as_bytes()));
    format!("{}-{:012}", &digest[..10], offset)
}

fn offset(event: &Value) -> Option<u64> {
    event.pointer("/fields/log/offset").and_then(Value::as_u64)
}

/// Id of a line read from an S3 object: bucket arn, object key and offset.
pub fn s3_object_id(event: &Value) -> Option<String> {
    let offset = offset(event)?;
    let bucket_arn = event.pointer("/fields/aws/s3/bucket/arn")?.as_str()?;
    let object_key = event.pointer("/fields/aws/s3/object/key")?.as_str()?;

    Some(hashed_id(&format!("{bucket_arn}{object_key}"), offset))
}

/// Id of a line decoded from a Kinesis record.
pub fn kinesis_record_id(event: &Value) -> Option<String> {
    let offset = offset(event)?;
    let kinesis = event.pointer("/fields/aws/kinesis")?;
    let stream_type = kinesis.get("type")?.as_str()?;
    let stream_name = kinesis.get("name")?.as_str()?;
    let sequence_number = kinesis.get("sequence_number")?.as_str()?;

    Some(hashed_id(
        &format!("{stream_type}{stream_name}-{sequence_number}"),
        offset,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn s3_id_has_hash_prefix_and_padded_offset() {
        let event = json!({
            "fields": {
                "log": {"offset": 10},
                "aws": {"s3": {
                    "bucket": {"arn": "arn:aws:s3:::bucket"},
                    "object": {"key": "file.log"},
                }},
            }
        });

        let id = s3_object_id(&event).unwrap();
        let expected_prefix =
            &hex::encode(Sha256::digest("arn:aws:s3:::bucketfile.log".as_bytes()))[..10];
        assert_eq!(id, format!("{expected_prefix}-000000000010"));
        assert_eq!(id.len(), 10 + 1 + 12);
    }

    #[test]
    fn kinesis_id_uses_stream_and_sequence() {
        let event = json!({
            "fields": {
                "log": {"offset": 0},
                "aws": {"kinesis": {
                    "type": "stream",
                    "name": "app-logs",
                    "sequence_number": "4959",
                }},
            }
        });

        let id = kinesis_record_id(&event).unwrap();
        let expected_prefix = &hex::encode(Sha256::digest("streamapp-logs-4959".as_bytes()))[..10];
        assert_eq!(id, format!("{expected_prefix}-000000000000"));
    }

    #[test]
    fn same_line_same_id() {
        let event = json!({
            "fields": {
                "log": {"offset": 42},
                "aws": {"s3": {"bucket": {"arn": "a"}, "object": {"key": "k"}}},
            }
        });
        assert_eq!(s3_object_id(&event), s3_object_id(&event.clone()));
    }

    #[test]
    fn missing_fields_yield_none() {
        assert_eq!(s3_object_id(&json!({"fields": {"log": {"offset": 1}}})), None);
        assert_eq!(kinesis_record_id(&json!({})), None);
    }
}
