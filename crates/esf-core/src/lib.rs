//! Shared building blocks for the forwarder
//!
//! Lambda payload types, trigger detection, ARN helpers, event ids,
//! dataset discovery and line-oriented S3 object storage.

pub mod arn;
pub mod dataset;
pub mod event;
pub mod event_id;
pub mod lambda_event;
pub mod storage;
pub mod trigger;

pub use arn::{
    bucket_name_from_arn, kinesis_stream_from_arn, parse_s3_uri, ArnError, KinesisStream,
};
pub use dataset::{dataset_from_s3_key, s3_key_from_lambda_event, GENERIC_DATASET};
pub use event::{event_message, kinesis_event, s3_event, KinesisOrigin, S3Origin};
pub use event_id::{kinesis_record_id, s3_object_id, EventIdGenerator};
pub use lambda_event::{
    decode_object_key, message_attribute, object_key, KinesisEvent, KinesisEventRecord, S3Event,
    S3EventRecord, SqsEvent, SqsMessage,
};
pub use storage::{
    LogLine, ObjectLines, OperatorProvider, S3OperatorFactory, S3Storage, StorageError,
};
pub use trigger::{detect_trigger, ConfigSource, TriggerError, TriggerType};
