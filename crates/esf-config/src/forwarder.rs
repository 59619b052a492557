// Forwarder configuration: which event sources are forwarded where.
//
// The YAML document is stored in S3 (S3_CONFIG_FILE) and travels with
// continuing and replayed messages as the `config` message attribute.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const DEFAULT_BATCH_MAX_ACTIONS: usize = 500;
pub const DEFAULT_BATCH_MAX_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputType {
    #[serde(rename = "s3-sqs")]
    S3Sqs,
    #[serde(rename = "kinesis-data-stream")]
    KinesisDataStream,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::S3Sqs => "s3-sqs",
            InputType::KinesisDataStream => "kinesis-data-stream",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InputType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s3-sqs" => Ok(InputType::S3Sqs),
            "kinesis-data-stream" => Ok(InputType::KinesisDataStream),
            _ => bail!(
                "Unsupported input type: {}. Supported: s3-sqs, kinesis-data-stream",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Elasticsearch,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Elasticsearch => "elasticsearch",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "elasticsearch" => Ok(OutputType::Elasticsearch),
            _ => bail!("Unsupported output type: {}. Supported: elasticsearch", s),
        }
    }
}

/// Parsed forwarder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwarderConfig {
    pub inputs: Vec<Input>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Input {
    #[serde(rename = "type")]
    pub input_type: InputType,
    /// ARN of the event source (SQS queue or Kinesis stream)
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "lowercase")]
pub enum Output {
    Elasticsearch(ElasticsearchArgs),
}

impl Output {
    pub fn output_type(&self) -> OutputType {
        match self {
            Output::Elasticsearch(_) => OutputType::Elasticsearch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticsearchArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub es_index_or_datastream_name: Option<String>,
    #[serde(default = "default_batch_max_actions")]
    pub batch_max_actions: usize,
    #[serde(default = "default_batch_max_bytes")]
    pub batch_max_bytes: usize,
}

fn default_batch_max_actions() -> usize {
    DEFAULT_BATCH_MAX_ACTIONS
}

fn default_batch_max_bytes() -> usize {
    DEFAULT_BATCH_MAX_BYTES
}

impl ElasticsearchArgs {
    pub fn validate(&self) -> Result<()> {
        match (&self.elasticsearch_url, &self.cloud_id) {
            (Some(_), Some(_)) => {
                bail!("elasticsearch output: only one of elasticsearch_url and cloud_id can be set")
            }
            (None, None) => {
                bail!("elasticsearch output: one of elasticsearch_url or cloud_id must be set")
            }
            (Some(url), None) if url.trim().is_empty() => {
                bail!("elasticsearch output: elasticsearch_url must not be empty")
            }
            (None, Some(cloud_id)) if cloud_id.trim().is_empty() => {
                bail!("elasticsearch output: cloud_id must not be empty")
            }
            _ => {}
        }

        let has_api_key = self.api_key.as_deref().is_some_and(|k| !k.is_empty());
        let has_basic = self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.is_some();
        if !has_api_key && !has_basic {
            bail!("elasticsearch output: either api_key or username and password must be set");
        }

        Ok(())
    }
}

impl Input {
    pub fn output_types(&self) -> Vec<OutputType> {
        self.outputs.iter().map(Output::output_type).collect()
    }

    pub fn get_output_by_type(&self, output_type: OutputType) -> Option<&Output> {
        self.outputs
            .iter()
            .find(|output| output.output_type() == output_type)
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            bail!("input of type {}: id must not be empty", self.input_type);
        }
        if self.outputs.is_empty() {
            bail!("input {}: at least one output must be set", self.id);
        }

        let mut seen = HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.output_type()) {
                bail!(
                    "input {}: duplicated output type {}",
                    self.id,
                    output.output_type()
                );
            }
            match output {
                Output::Elasticsearch(args) => args
                    .validate()
                    .with_context(|| format!("input {}", self.id))?,
            }
        }

        Ok(())
    }
}

impl ForwarderConfig {
    /// Parse and validate a forwarder YAML document
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: ForwarderConfig =
            serde_yaml::from_str(yaml).context("Failed to parse forwarder config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            bail!("forwarder config: no inputs defined");
        }

        let mut ids = HashSet::new();
        for input in &self.inputs {
            if !ids.insert(input.id.as_str()) {
                bail!("forwarder config: duplicated input id {}", input.id);
            }
            input.validate()?;
        }

        Ok(())
    }

    pub fn get_input_by_type_and_id(&self, input_type: InputType, id: &str) -> Option<&Input> {
        self.inputs
            .iter()
            .find(|input| input.input_type == input_type && input.id == id)
    }
}
