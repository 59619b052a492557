use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use base64::Engine;
use esf_config::{Platform, RuntimeConfig};
use esf_core::storage::Result as StorageResult;
use esf_core::OperatorProvider;
use esf_lambda::{
    deadline_in, handle_event, HandlerError, LambdaState, QueueMessage, QueueSender,
    ATTR_CONFIG, ATTR_ORIGINAL_EVENT_SOURCE, ATTR_ORIGINAL_LAST_ENDING_OFFSET,
    ATTR_ORIGINAL_MESSAGE_ID,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use httpmock::prelude::*;
use opendal::services::Memory;
use opendal::Operator;
use parking_lot::Mutex;
use serde_json::{json, Value};

const QUEUE_ARN: &str = "arn:aws:sqs:eu-central-1:123456789012:s3-notifications";
const STREAM_ARN: &str = "arn:aws:kinesis:eu-central-1:123456789012:stream/app-logs";
const CONTINUE_URL: &str = "https://sqs.eu-central-1.amazonaws.com/123456789012/continuing";
const REPLAY_URL: &str = "https://sqs.eu-central-1.amazonaws.com/123456789012/replay";
const OBJECT: &[u8] = b"first line\n\nsecond line\nthird line\n";

struct MemoryProvider(Operator);

impl OperatorProvider for MemoryProvider {
    fn operator(&self, _bucket: &str) -> StorageResult<Operator> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct RecordingQueue(Mutex<Vec<QueueMessage>>);

#[async_trait]
impl QueueSender for RecordingQueue {
    async fn send(&self, message: QueueMessage) -> Result<(), HandlerError> {
        self.0.lock().push(message);
        Ok(())
    }
}

struct Harness {
    server: MockServer,
    operator: Operator,
    queue: Arc<RecordingQueue>,
    state: LambdaState,
}

fn forwarder_config(es_url: &str) -> String {
    format!(
        r#"
inputs:
  - type: "s3-sqs"
    id: "{QUEUE_ARN}"
    tags: ["env:test"]
    outputs:
      - type: "elasticsearch"
        args:
          elasticsearch_url: "{es_url}"
          api_key: "a2V5"
  - type: "kinesis-data-stream"
    id: "{STREAM_ARN}"
    outputs:
      - type: "elasticsearch"
        args:
          elasticsearch_url: "{es_url}"
          api_key: "a2V5"
          es_index_or_datastream_name: "logs-kinesis-default"
"#
    )
}

impl Harness {
    async fn new() -> Self {
        let server = MockServer::start_async().await;
        let operator = Operator::new(Memory::default()).unwrap().finish();
        operator
            .write("esf/config.yaml", forwarder_config(&server.base_url()))
            .await
            .unwrap();
        operator
            .write("AWSLogs/1/vpcflowlogs/flow.log", OBJECT.to_vec())
            .await
            .unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(OBJECT).unwrap();
        operator
            .write("AWSLogs/1/vpcflowlogs/flow.log.gz", encoder.finish().unwrap())
            .await
            .unwrap();

        let queue = Arc::new(RecordingQueue::default());
        let mut config = RuntimeConfig::from_platform_defaults(Platform::Local);
        config.queues.continue_url = Some(CONTINUE_URL.to_string());
        config.queues.replay_url = Some(REPLAY_URL.to_string());
        config.forwarder.config_file = Some("s3://config-bucket/esf/config.yaml".to_string());

        let state = LambdaState {
            config,
            operators: Arc::new(MemoryProvider(operator.clone())),
            queue: queue.clone(),
        };

        Self {
            server,
            operator,
            queue,
            state,
        }
    }

    fn sent(&self) -> Vec<QueueMessage> {
        self.queue.0.lock().clone()
    }
}

fn far_deadline() -> SystemTime {
    deadline_in(Duration::from_secs(900))
}

fn s3_sqs_event(key: &str, attributes: Value) -> Value {
    let notification = json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "eu-central-1",
            "eventTime": "2022-04-15T10:00:00.000Z",
            "eventName": "ObjectCreated:Put",
            "userIdentity": {"principalId": "AWS:AIDAEXAMPLE"},
            "requestParameters": {"sourceIPAddress": "127.0.0.1"},
            "responseElements": {},
            "s3": {
                "s3SchemaVersion": "1.0",
                "bucket": {"name": "data-bucket", "arn": "arn:aws:s3:::data-bucket"},
                "object": {"key": key, "size": OBJECT.len()},
            },
        }]
    });
    json!({
        "Records": [{
            "messageId": "message-1",
            "receiptHandle": "handle",
            "body": notification.to_string(),
            "attributes": {"SentTimestamp": "1650000000000"},
            "messageAttributes": attributes,
            "eventSource": "aws:sqs",
            "eventSourceARN": QUEUE_ARN,
            "awsRegion": "eu-central-1",
        }]
    })
}

fn bulk_ok() -> Value {
    json!({"errors": false, "items": []})
}

#[tokio::test]
async fn s3_notification_is_shipped() {
    let harness = Harness::new().await;
    let bulk = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .body_contains(r#""_index":"logs-aws.vpcflow-default""#)
                .body_contains("first line")
                .body_contains("third line")
                .body_contains("env:test");
            then.status(200).json_body(bulk_ok());
        })
        .await;

    let event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log", json!({}));
    let response = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap();

    assert_eq!(response, "completed");
    bulk.assert_hits_async(1).await;
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn gzip_objects_are_inflated() {
    let harness = Harness::new().await;
    let bulk = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .body_contains("first line")
                .body_contains("third line")
                .body_contains("flow.log.gz");
            then.status(200).json_body(bulk_ok());
        })
        .await;

    let event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log.gz", json!({}));
    let response = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap();

    assert_eq!(response, "completed");
    bulk.assert_hits_async(1).await;
}

#[tokio::test]
async fn running_out_of_time_hands_over_to_the_continuing_queue() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(200).json_body(bulk_ok());
        })
        .await;

    let event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log", json!({}));
    let response = handle_event(&event, SystemTime::now(), &harness.state)
        .await
        .unwrap();
    assert_eq!(response, "continuing");

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    let message = &sent[0];
    assert_eq!(message.queue_url, CONTINUE_URL);
    assert_eq!(message.attribute(ATTR_ORIGINAL_EVENT_SOURCE), Some(QUEUE_ARN));
    assert_eq!(message.attribute(ATTR_ORIGINAL_MESSAGE_ID), Some("message-1"));
    // just past "first line\n"
    assert_eq!(message.attribute(ATTR_ORIGINAL_LAST_ENDING_OFFSET), Some("11"));
    assert!(message
        .attribute(ATTR_CONFIG)
        .unwrap()
        .contains("kinesis-data-stream"));

    let body: Value = serde_json::from_str(&message.body).unwrap();
    assert_eq!(
        body["Records"][0]["s3"]["object"]["key"],
        "AWSLogs/1/vpcflowlogs/flow.log"
    );
}

#[tokio::test]
async fn continued_message_resumes_at_the_last_offset() {
    let harness = Harness::new().await;
    let first_line = harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/_bulk").body_contains("first line");
            then.status(200).json_body(bulk_ok());
        })
        .await;
    let remaining = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .body_contains("second line")
                .body_contains("third line");
            then.status(200).json_body(bulk_ok());
        })
        .await;

    let attributes = json!({
        "config": {"stringValue": forwarder_config(&harness.server.base_url()), "dataType": "String"},
        "originalEventSource": {"stringValue": QUEUE_ARN, "dataType": "String"},
        "originalMessageId": {"stringValue": "message-0", "dataType": "String"},
        "originalLastEndingOffset": {"stringValue": "11", "dataType": "Number"},
    });
    let mut event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log", attributes);
    // continued messages come from the continuing queue, not the input queue
    event["Records"][0]["eventSourceARN"] =
        json!("arn:aws:sqs:eu-central-1:123456789012:continuing");

    let response = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap();

    assert_eq!(response, "completed");
    first_line.assert_hits_async(0).await;
    remaining.assert_hits_async(1).await;
}

#[tokio::test]
async fn rejected_events_go_to_the_replay_queue() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(200).json_body(json!({
                "errors": true,
                "items": [
                    {"create": {"status": 201}},
                    {"create": {"status": 201}},
                    {"create": {"status": 400, "error": {"type": "mapper_parsing_exception"}}},
                ]
            }));
        })
        .await;

    let event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log", json!({}));
    let response = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap();
    assert_eq!(response, "completed");

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].queue_url, REPLAY_URL);
    assert!(sent[0].attribute(ATTR_CONFIG).is_some());

    let body: Value = serde_json::from_str(&sent[0].body).unwrap();
    assert_eq!(body["output_type"], "elasticsearch");
    assert_eq!(body["event_input_id"], QUEUE_ARN);
    assert_eq!(body["event_input_type"], "s3-sqs");
    assert_eq!(body["event_payload"]["fields"]["message"], "third line");
    assert_eq!(
        body["output_args"]["es_index_or_datastream_name"],
        "logs-aws.vpcflow-default"
    );
}

fn replay_event(harness: &Harness) -> Value {
    let body = json!({
        "output_type": "elasticsearch",
        "output_args": {
            "elasticsearch_url": harness.server.base_url(),
            "api_key": "a2V5",
            "es_index_or_datastream_name": "logs-aws.vpcflow-default",
        },
        "event_payload": {
            "@timestamp": "2022-01-01T00:00:00.000000Z",
            "fields": {
                "message": "third line",
                "log": {"offset": 24},
                "aws": {"s3": {
                    "bucket": {"name": "data-bucket", "arn": "arn:aws:s3:::data-bucket"},
                    "object": {"key": "AWSLogs/1/vpcflowlogs/flow.log"},
                }},
            },
        },
        "event_input_id": QUEUE_ARN,
        "event_input_type": "s3-sqs",
    });
    json!({
        "Records": [{
            "messageId": "replay-1",
            "body": body.to_string(),
            "messageAttributes": {
                "config": {
                    "stringValue": forwarder_config(&harness.server.base_url()),
                    "dataType": "String",
                },
            },
            "eventSource": "aws:sqs",
            "eventSourceARN": "arn:aws:sqs:eu-central-1:123456789012:replay",
        }]
    })
}

#[tokio::test]
async fn replayed_event_is_shipped_again() {
    let harness = Harness::new().await;
    let bulk = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .body_contains(r#""dataset":"aws.vpcflow""#)
                .body_contains("third line");
            then.status(200).json_body(bulk_ok());
        })
        .await;

    let response = handle_event(&replay_event(&harness), far_deadline(), &harness.state)
        .await
        .unwrap();

    assert_eq!(response, "replayed");
    bulk.assert_hits_async(1).await;
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn replay_rejected_again_fails_the_invocation() {
    let harness = Harness::new().await;
    harness
        .server
        .mock_async(|when, then| {
            when.method(POST).path("/_bulk");
            then.status(200).json_body(json!({
                "errors": true,
                "items": [{"create": {"status": 400, "error": {"type": "mapper_parsing_exception"}}}]
            }));
        })
        .await;

    let err = handle_event(&replay_event(&harness), far_deadline(), &harness.state)
        .await
        .unwrap_err();

    assert!(matches!(err, HandlerError::ReplayFailed(1)));
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn kinesis_records_are_shipped() {
    let harness = Harness::new().await;
    let bulk = harness
        .server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/_bulk")
                .body_contains(r#""_index":"logs-kinesis-default""#)
                .body_contains("kinesis one")
                .body_contains("kinesis two")
                .body_contains(r#""name":"app-logs""#);
            then.status(200).json_body(bulk_ok());
        })
        .await;

    let data = base64::engine::general_purpose::STANDARD.encode("kinesis one\nkinesis two\n");
    let event = json!({
        "Records": [{
            "eventSource": "aws:kinesis",
            "eventSourceARN": STREAM_ARN,
            "awsRegion": "eu-central-1",
            "kinesis": {
                "data": data,
                "sequenceNumber": "49590338271490256608559692538361571095921575989136588898",
                "partitionKey": "pk",
                "approximateArrivalTimestamp": 1650000000.5,
            },
        }]
    });

    let response = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap();
    assert_eq!(response, "completed");
    bulk.assert_hits_async(1).await;
}

#[tokio::test]
async fn unsupported_trigger_is_fatal() {
    let harness = Harness::new().await;
    let err = handle_event(&json!({"Records": []}), far_deadline(), &harness.state)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.to_string(), "Not supported trigger");
}

#[tokio::test]
async fn unknown_input_is_fatal() {
    let harness = Harness::new().await;
    let mut event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log", json!({}));
    event["Records"][0]["eventSourceARN"] = json!("arn:aws:sqs:eu-central-1:1:unknown");

    let err = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap_err();
    assert!(matches!(err, HandlerError::InputConfig(_)));
}

#[tokio::test]
async fn missing_config_file_is_fatal() {
    let mut harness = Harness::new().await;
    harness.state.config.forwarder.config_file = Some("s3://config-bucket/missing.yaml".into());

    let event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log", json!({}));
    let err = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap_err();
    assert!(matches!(err, HandlerError::ConfigFile(_)));
}

#[tokio::test]
async fn missing_object_is_reported_in_the_response() {
    let harness = Harness::new().await;
    harness.operator.delete("AWSLogs/1/vpcflowlogs/flow.log").await.unwrap();

    let event = s3_sqs_event("AWSLogs/1/vpcflowlogs/flow.log", json!({}));
    let response = handle_event(&event, far_deadline(), &harness.state)
        .await
        .unwrap();
    assert!(response.starts_with("exception raised: "), "{response}");
}
