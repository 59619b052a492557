// AWS Lambda runtime adapter
//
// Forwards S3 notifications (via SQS), Kinesis records and replayed events
// to the configured outputs.
//
// Philosophy: Use lambda_runtime's provided tokio
// We don't add our own tokio - lambda_runtime provides it

use esf_config::{init_tracing, RuntimeConfig};
use esf_core::{OperatorProvider, S3OperatorFactory};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod continuing;
mod error;
mod handlers;
mod queue;
mod replay;
mod response;

pub use continuing::{
    ATTR_CONFIG, ATTR_ORIGINAL_EVENT_SOURCE, ATTR_ORIGINAL_LAST_ENDING_OFFSET,
    ATTR_ORIGINAL_MESSAGE_ID, ATTR_ORIGINAL_SENT_TIMESTAMP,
};
pub use error::HandlerError;
pub use handlers::handle_event;
pub use queue::{MessageAttribute, QueueMessage, QueueSender, SqsQueueSender};
pub use response::HandlerResponse;

/// Clients built once per cold start and shared by every invocation
pub struct LambdaState {
    pub config: RuntimeConfig,
    pub operators: Arc<dyn OperatorProvider>,
    pub queue: Arc<dyn QueueSender>,
}

async fn handle_request(
    event: LambdaEvent<Value>,
    state: Arc<LambdaState>,
) -> Result<String, Error> {
    let (payload, context) = event.into_parts();
    let deadline = UNIX_EPOCH + Duration::from_millis(context.deadline);

    tracing::debug!(request_id = %context.request_id, "invocation");
    Ok(handle_event(&payload, deadline, &state).await?)
}

/// Lambda runtime entry point
pub async fn run() -> Result<(), Error> {
    let config = RuntimeConfig::load()
        .map_err(|e| Error::from(format!("Failed to load configuration: {e:#}")))?;
    init_tracing(&config.log, std::io::stdout);

    tracing::info!(
        continue_url = config.queues.continue_url.as_deref().unwrap_or_default(),
        replay_url = config.queues.replay_url.as_deref().unwrap_or_default(),
        config_file = config.forwarder.config_file.as_deref().unwrap_or_default(),
        completion_grace_period_ms = config.lambda.completion_grace_period_ms,
        "Lambda runtime - using lambda_runtime's tokio + OpenDAL S3"
    );

    let operators = Arc::new(S3OperatorFactory::new(
        config.storage.region.clone(),
        config.storage.endpoint.clone(),
    ));
    let queue = Arc::new(SqsQueueSender::from_env().await);

    let state = Arc::new(LambdaState {
        config,
        operators,
        queue,
    });

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let state = state.clone();
        async move { handle_request(event, state).await }
    }))
    .await
}

/// Deadline helper for callers that only know the remaining time
pub fn deadline_in(remaining: Duration) -> SystemTime {
    SystemTime::now() + remaining
}
