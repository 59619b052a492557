//! Elasticsearch output
//!
//! Events become `create` actions against a data stream or index. The data
//! stream name either comes from the output args or is derived from the S3
//! key of the notification being processed.

use async_trait::async_trait;
use esf_config::{ElasticsearchArgs, OutputType};
use esf_core::{dataset_from_s3_key, event_message, s3_key_from_lambda_event, EventIdGenerator};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::bulk::{BulkClient, HttpBulkClient};
use crate::error::{Result, ShipperError};
use crate::replay::ReplayHandler;
use crate::shipper::Shipper;

const DATA_STREAM_PREFIX: &str = "logs-";
const DEFAULT_NAMESPACE: &str = "default";

/// A buffered action with the event it was built from
struct PendingAction {
    action: Value,
    event: Value,
}

pub struct ElasticsearchShipper {
    client: Arc<dyn BulkClient>,
    args: ElasticsearchArgs,
    tags: Vec<String>,

    index: String,
    dataset: String,
    namespace: String,

    pending: Vec<PendingAction>,
    pending_bytes: usize,

    event_id_generator: Option<EventIdGenerator>,
    replay_handler: Option<Arc<dyn ReplayHandler>>,
}

impl ElasticsearchShipper {
    /// Shipper talking to the cluster described by `args`
    pub fn from_args(args: ElasticsearchArgs, tags: Vec<String>) -> Result<Self> {
        let client = HttpBulkClient::from_args(&args)?;
        tracing::debug!(bulk_url = client.bulk_url(), "elasticsearch client ready");
        Ok(Self::new(args, tags, Arc::new(client)))
    }

    pub fn new(args: ElasticsearchArgs, tags: Vec<String>, client: Arc<dyn BulkClient>) -> Self {
        let index = args.es_index_or_datastream_name.clone().unwrap_or_default();
        Self {
            client,
            args,
            tags,
            index,
            dataset: String::new(),
            namespace: String::new(),
            pending: Vec::new(),
            pending_bytes: 0,
            event_id_generator: None,
            replay_handler: None,
        }
    }

    /// Resolve dataset, namespace and target index.
    ///
    /// A configured `logs-<dataset>-<namespace>` name is split into its
    /// parts; any other configured name is used as is. Without a configured
    /// name the dataset is derived from the S3 key in `lambda_event`.
    pub fn discover_dataset(&mut self, lambda_event: &Value) {
        match self.args.es_index_or_datastream_name.as_deref() {
            Some(name) if !name.is_empty() => {
                if let Some(rest) = name.strip_prefix(DATA_STREAM_PREFIX) {
                    let (dataset, namespace) =
                        rest.split_once('-').unwrap_or((rest, DEFAULT_NAMESPACE));
                    self.dataset = dataset.to_string();
                    self.namespace = namespace.to_string();
                } else {
                    self.dataset.clear();
                    self.namespace.clear();
                }
                self.index = name.to_string();
            }
            _ => {
                let dataset = s3_key_from_lambda_event(lambda_event)
                    .map(|key| dataset_from_s3_key(&key))
                    .unwrap_or(esf_core::GENERIC_DATASET);
                self.dataset = dataset.to_string();
                self.namespace = DEFAULT_NAMESPACE.to_string();
                self.index = format!("{DATA_STREAM_PREFIX}{}-{}", self.dataset, self.namespace);
            }
        }

        tracing::debug!(
            index = %self.index,
            dataset = %self.dataset,
            namespace = %self.namespace,
            "dataset discovered"
        );
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pending_actions(&self) -> usize {
        self.pending.len()
    }

    fn build_action(&self, event: &Value) -> Result<Value> {
        let mut action = event.clone();
        let fields = action.as_object_mut().ok_or(ShipperError::InvalidEvent)?;
        let original = event_message(event).unwrap_or_default();

        fields.insert("_op_type".into(), json!("create"));
        fields.insert("_index".into(), json!(self.index));
        if let Some(id) = self.event_id_generator.and_then(|generate| generate(event)) {
            fields.insert("_id".into(), json!(id));
        }

        let mut tags = vec![
            "preserve_original_event".to_string(),
            "forwarded".to_string(),
        ];
        if self.dataset.is_empty() {
            fields.insert("event".into(), json!({ "original": original }));
        } else {
            fields.insert(
                "data_stream".into(),
                json!({
                    "type": "logs",
                    "dataset": self.dataset,
                    "namespace": self.namespace,
                }),
            );
            fields.insert(
                "event".into(),
                json!({ "dataset": self.dataset, "original": original }),
            );
            tags.push(self.dataset.replace('.', "-"));
        }
        tags.extend(self.tags.iter().cloned());
        fields.insert("tags".into(), json!(tags));

        Ok(action)
    }

    /// Output args sent along with replayed events, pinned to the index
    /// resolved for this invocation.
    fn replay_args(&self) -> Result<Value> {
        let mut args = self.args.clone();
        args.es_index_or_datastream_name = Some(self.index.clone());
        Ok(serde_json::to_value(args)?)
    }

    async fn handle_failures(&self, failed: Vec<PendingAction>) -> Result<()> {
        let Some(handler) = &self.replay_handler else {
            for pending in &failed {
                let event_id = pending.action.get("_id").and_then(Value::as_str);
                tracing::error!(
                    index = %self.index,
                    event_id = event_id.unwrap_or_default(),
                    "elasticsearch shipper failed to ingest event and no replay handler is set"
                );
            }
            return Ok(());
        };

        let output_args = self.replay_args()?;
        for pending in failed {
            handler
                .replay(OutputType::Elasticsearch, output_args.clone(), pending.event)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Shipper for ElasticsearchShipper {
    async fn send(&mut self, event: Value) -> Result<()> {
        if self.index.is_empty() {
            return Err(ShipperError::EmptyIndex);
        }

        let action = self.build_action(&event)?;
        self.pending_bytes += serde_json::to_vec(&action)?.len();
        self.pending.push(PendingAction { action, event });

        if self.pending.len() >= self.args.batch_max_actions
            || self.pending_bytes >= self.args.batch_max_bytes
        {
            self.flush().await?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let pending = std::mem::take(&mut self.pending);
        self.pending_bytes = 0;

        let actions: Vec<Value> = pending.iter().map(|p| p.action.clone()).collect();
        let failed = match self.client.bulk(&actions).await {
            Ok(failures) if failures.is_empty() => {
                tracing::debug!(index = %self.index, count = actions.len(), "bulk request shipped");
                return Ok(());
            }
            Ok(failures) => {
                for failure in &failures {
                    tracing::warn!(
                        index = %self.index,
                        status = failure.status,
                        error = %failure.error,
                        "elasticsearch rejected event"
                    );
                }
                let positions: Vec<usize> = failures.iter().map(|f| f.position).collect();
                pending
                    .into_iter()
                    .enumerate()
                    .filter(|(position, _)| positions.contains(position))
                    .map(|(_, pending)| pending)
                    .collect()
            }
            Err(err) => {
                tracing::error!(
                    index = %self.index,
                    count = actions.len(),
                    error = %err,
                    "bulk request failed"
                );
                pending
            }
        };

        self.handle_failures(failed).await
    }

    fn set_event_id_generator(&mut self, generator: EventIdGenerator) {
        self.event_id_generator = Some(generator);
    }

    fn set_replay_handler(&mut self, handler: Arc<dyn ReplayHandler>) {
        self.replay_handler = Some(handler);
    }
}
