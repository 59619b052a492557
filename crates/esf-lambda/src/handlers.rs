// Trigger handlers
//
// One invocation carries records of a single trigger type. S3 notifications
// are read line by line and may be continued on another invocation; Kinesis
// records are shipped whole; replayed events are shipped one by one and fail
// the invocation when rejected again.

use bytes::Bytes;
use esf_config::{ForwarderConfig, Input, InputType};
use esf_core::storage::split_lines;
use esf_core::{
    detect_trigger, kinesis_event, kinesis_record_id, kinesis_stream_from_arn, message_attribute,
    object_key, parse_s3_uri, s3_event, s3_object_id, ConfigSource, EventIdGenerator,
    KinesisEvent, KinesisOrigin, S3Event, S3Origin, S3Storage, SqsEvent, SqsMessage, TriggerType,
};
use esf_shipper::{CompositeShipper, ReplayMessage, Shipper, ShipperFactory};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::continuing::{
    Continuation, ATTR_CONFIG, ATTR_ORIGINAL_EVENT_SOURCE, ATTR_ORIGINAL_LAST_ENDING_OFFSET,
};
use crate::error::{HandlerError, Result};
use crate::replay::{ReplayFailures, SqsReplayHandler};
use crate::response::{exception_response, HandlerResponse};
use crate::LambdaState;

/// Handle one invocation and apply the error policy: fatal errors are
/// returned, any other error is logged and reported in the response.
pub async fn handle_event(
    event: &Value,
    deadline: SystemTime,
    state: &LambdaState,
) -> Result<String> {
    match process_event(event, deadline, state).await {
        Ok(response) => Ok(response.to_string()),
        Err(err) if err.is_fatal() => {
            tracing::error!(error = %err, "exception raised");
            Err(err)
        }
        Err(err) => {
            tracing::error!(error = %err, "exception raised");
            Ok(exception_response(&err))
        }
    }
}

async fn process_event(
    event: &Value,
    deadline: SystemTime,
    state: &LambdaState,
) -> Result<HandlerResponse> {
    let (trigger_type, config_source) = detect_trigger(event)?;
    tracing::info!(trigger_type = %trigger_type, "trigger");

    match trigger_type {
        TriggerType::ReplaySqs => handle_replay(event).await,
        TriggerType::S3Sqs => {
            let (config, config_yaml) = load_forwarder_config(event, config_source, state).await?;
            handle_s3_sqs(event, &config, &config_yaml, deadline, state).await
        }
        TriggerType::KinesisDataStream => {
            let (config, config_yaml) = load_forwarder_config(event, config_source, state).await?;
            handle_kinesis(event, &config, &config_yaml, state).await
        }
    }
}

async fn load_forwarder_config(
    event: &Value,
    config_source: ConfigSource,
    state: &LambdaState,
) -> Result<(ForwarderConfig, String)> {
    let config_yaml = match config_source {
        ConfigSource::Payload => config_yaml_from_payload(event)?,
        ConfigSource::S3File => config_yaml_from_s3(state).await?,
    };
    let config = ForwarderConfig::parse(&config_yaml)
        .map_err(|e| HandlerError::ConfigFile(format!("{e:#}")))?;
    Ok((config, config_yaml))
}

fn config_yaml_from_payload(event: &Value) -> Result<String> {
    event
        .pointer("/Records/0/messageAttributes/config/stringValue")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HandlerError::ConfigFile("missing config message attribute".to_string()))
}

async fn config_yaml_from_s3(state: &LambdaState) -> Result<String> {
    let config_file = state
        .config
        .forwarder
        .config_file
        .as_deref()
        .ok_or_else(|| HandlerError::ConfigFile("S3_CONFIG_FILE is not set".to_string()))?;

    let (bucket_name, object_key) =
        parse_s3_uri(config_file).map_err(|e| HandlerError::ConfigFile(e.to_string()))?;
    tracing::info!(bucket_name = %bucket_name, object_key = %object_key, "config file");

    let operator = state
        .operators
        .operator(&bucket_name)
        .map_err(|e| HandlerError::ConfigFile(e.to_string()))?;
    S3Storage::new(operator, object_key)
        .get_as_string()
        .await
        .map_err(|e| HandlerError::ConfigFile(e.to_string()))
}

fn event_id_generator(input_type: InputType) -> EventIdGenerator {
    match input_type {
        InputType::S3Sqs => s3_object_id,
        InputType::KinesisDataStream => kinesis_record_id,
    }
}

/// Resolve the input an event belongs to and build its shippers.
fn shipper_for_input<'a>(
    config: &'a ForwarderConfig,
    config_yaml: &str,
    input_type: InputType,
    input_id: &str,
    lambda_event: &Value,
    state: &LambdaState,
) -> Result<(CompositeShipper, &'a Input)> {
    let input = config
        .get_input_by_type_and_id(input_type, input_id)
        .ok_or_else(|| {
            tracing::error!(input_id, "no input set");
            HandlerError::InputConfig("not input set".to_string())
        })?;
    tracing::info!(input_type = %input.input_type, input_id = %input.id, "input");

    let mut composite = CompositeShipper::new();
    for output in &input.outputs {
        tracing::info!(output_type = %output.output_type(), "setting shipper");
        let mut shipper = ShipperFactory::create_from_output(output, &input.tags)
            .map_err(|e| HandlerError::OutputConfig(e.to_string()))?;
        shipper.discover_dataset(lambda_event);
        composite.add_shipper(Box::new(shipper));
    }

    match &state.config.queues.replay_url {
        Some(replay_url) => composite.set_replay_handler(Arc::new(SqsReplayHandler::new(
            state.queue.clone(),
            replay_url.clone(),
            config_yaml,
            input,
        ))),
        None => tracing::warn!("SQS_REPLAY_URL is not set: failed events will only be logged"),
    }
    composite.set_event_id_generator(event_id_generator(input_type));

    Ok((composite, input))
}

fn remaining_time(deadline: SystemTime) -> Duration {
    deadline
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO)
}

async fn handle_s3_sqs(
    event: &Value,
    config: &ForwarderConfig,
    config_yaml: &str,
    deadline: SystemTime,
    state: &LambdaState,
) -> Result<HandlerResponse> {
    let sqs_event: SqsEvent = serde_json::from_value(event.clone())?;
    let first = &sqs_event.records[0];
    let input_id = message_attribute(first, ATTR_ORIGINAL_EVENT_SOURCE)
        .or(first.event_source_arn.as_deref())
        .unwrap_or_default()
        .to_string();

    let (mut shipper, input) = shipper_for_input(
        config,
        config_yaml,
        InputType::S3Sqs,
        &input_id,
        event,
        state,
    )?;
    let grace_period = state.config.lambda.completion_grace_period();

    for (sqs_index, record) in sqs_event.records.iter().enumerate() {
        let notification = s3_notification(record)?;
        let resume_offset = resume_offset(record);

        for (s3_index, s3_record) in notification.records.iter().enumerate() {
            let range_start = if s3_index == 0 { resume_offset } else { 0 };
            let bucket_name = s3_record.s3.bucket.name.as_deref().ok_or_else(|| {
                HandlerError::InvalidRecord("s3 notification without bucket name".to_string())
            })?;
            let object_key = object_key(s3_record);
            let region = s3_record
                .aws_region
                .as_deref()
                .filter(|region| !region.is_empty())
                .unwrap_or(state.config.storage.region.as_str());
            tracing::info!(
                bucket_name = %bucket_name,
                object_key = %object_key,
                range_start,
                "processing s3 object"
            );

            let operator = state.operators.operator(bucket_name)?;
            let mut lines = S3Storage::new(operator, object_key.clone())
                .get_by_lines(range_start)
                .await?;
            let origin = S3Origin {
                bucket_name,
                bucket_arn: s3_record.s3.bucket.arn.as_deref().unwrap_or_default(),
                object_key: &object_key,
                region,
            };

            while let Some(line) = lines.next_line().await? {
                if !line.is_blank() {
                    let message = String::from_utf8_lossy(&line.data);
                    shipper
                        .send(s3_event(&message, line.starting_offset(), &origin))
                        .await?;
                }

                if remaining_time(deadline) < grace_period {
                    shipper.flush().await?;
                    continue_later(
                        state,
                        config_yaml,
                        &input.id,
                        &sqs_event,
                        sqs_index,
                        &notification,
                        s3_index,
                        line.ending_offset,
                    )
                    .await?;
                    return Ok(HandlerResponse::Continuing);
                }
            }
        }
    }

    shipper.flush().await?;
    Ok(HandlerResponse::Completed)
}

fn s3_notification(record: &SqsMessage) -> Result<S3Event> {
    Ok(serde_json::from_str(record.body.as_deref().unwrap_or_default())?)
}

fn resume_offset(record: &SqsMessage) -> u64 {
    message_attribute(record, ATTR_ORIGINAL_LAST_ENDING_OFFSET)
        .and_then(|offset| offset.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Send the unfinished part of the current SQS record, then every following
/// record of the batch, to the continuing queue.
#[allow(clippy::too_many_arguments)]
async fn continue_later(
    state: &LambdaState,
    config_yaml: &str,
    event_input_id: &str,
    sqs_event: &SqsEvent,
    sqs_index: usize,
    notification: &S3Event,
    s3_index: usize,
    last_ending_offset: u64,
) -> Result<()> {
    let queue_url = state
        .config
        .queues
        .continue_url
        .as_deref()
        .ok_or_else(|| HandlerError::Queue("SQS_CONTINUE_URL is not set".to_string()))?;
    let continuation = Continuation {
        queue_url,
        config_yaml,
        event_input_id,
    };

    continuation
        .send(
            state.queue.as_ref(),
            &sqs_event.records[sqs_index],
            &notification.records[s3_index..],
            last_ending_offset,
        )
        .await?;

    for record in &sqs_event.records[sqs_index + 1..] {
        let notification = s3_notification(record)?;
        continuation
            .send(
                state.queue.as_ref(),
                record,
                &notification.records,
                resume_offset(record),
            )
            .await?;
    }

    Ok(())
}

async fn handle_kinesis(
    event: &Value,
    config: &ForwarderConfig,
    config_yaml: &str,
    state: &LambdaState,
) -> Result<HandlerResponse> {
    let kinesis: KinesisEvent = serde_json::from_value(event.clone())?;
    let input_id = kinesis.records[0]
        .event_source_arn
        .clone()
        .unwrap_or_default();

    let (mut shipper, _input) = shipper_for_input(
        config,
        config_yaml,
        InputType::KinesisDataStream,
        &input_id,
        event,
        state,
    )?;

    for record in &kinesis.records {
        let stream_arn = record.event_source_arn.as_deref().unwrap_or_default();
        let stream = kinesis_stream_from_arn(stream_arn)
            .map_err(|e| HandlerError::InvalidRecord(e.to_string()))?;

        let region = record
            .aws_region
            .as_deref()
            .filter(|region| !region.is_empty())
            .unwrap_or(stream.region.as_str());
        let origin = KinesisOrigin {
            stream_arn,
            stream_type: &stream.stream_type,
            stream_name: &stream.name,
            partition_key: &record.kinesis.partition_key,
            sequence_number: &record.kinesis.sequence_number,
            region,
        };

        let data = Bytes::from(record.kinesis.data.0.clone());
        for line in split_lines(&data, 0) {
            if line.is_blank() {
                continue;
            }
            let message = String::from_utf8_lossy(&line.data);
            shipper
                .send(kinesis_event(&message, line.starting_offset(), &origin))
                .await?;
        }
    }

    shipper.flush().await?;
    Ok(HandlerResponse::Completed)
}

async fn handle_replay(event: &Value) -> Result<HandlerResponse> {
    let sqs_event: SqsEvent = serde_json::from_value(event.clone())?;

    for record in &sqs_event.records {
        let config_yaml = message_attribute(record, ATTR_CONFIG).ok_or_else(|| {
            HandlerError::ConfigFile("missing config message attribute".to_string())
        })?;
        let config = ForwarderConfig::parse(config_yaml)
            .map_err(|e| HandlerError::ConfigFile(format!("{e:#}")))?;

        let message: ReplayMessage =
            serde_json::from_str(record.body.as_deref().unwrap_or_default())?;
        let input_type: InputType = message
            .event_input_type
            .parse()
            .map_err(|e| HandlerError::InputConfig(format!("{e}")))?;
        let input = config
            .get_input_by_type_and_id(input_type, &message.event_input_id)
            .ok_or_else(|| {
                tracing::error!(input_id = %message.event_input_id, "no input set");
                HandlerError::InputConfig("not input set".to_string())
            })?;

        let mut shipper = ShipperFactory::create_from_replay(
            &message.output_type,
            &message.output_args,
            &input.tags,
        )
        .map_err(|e| HandlerError::OutputConfig(e.to_string()))?;
        shipper.discover_dataset(&Value::Null);
        shipper.set_event_id_generator(event_id_generator(input_type));
        let failures = Arc::new(ReplayFailures::default());
        shipper.set_replay_handler(failures.clone());

        shipper.send(message.event_payload).await?;
        shipper.flush().await?;

        if failures.count() > 0 {
            return Err(HandlerError::ReplayFailed(failures.count()));
        }
        tracing::info!(
            input_id = %message.event_input_id,
            output_type = %message.output_type,
            "event replayed"
        );
    }

    Ok(HandlerResponse::Replayed)
}
