// esf-config - Configuration for the forwarder and its tooling
//
// Two kinds of configuration live here:
// 1. RuntimeConfig: how the process runs (logging, queue URLs, where the
//    forwarder config lives, storage endpoint). Loaded from, in priority order:
//    environment variables, a TOML file (ESF_CONFIG / ESF_CONFIG_CONTENT),
//    platform defaults.
// 2. ForwarderConfig: the user-supplied YAML describing inputs and outputs.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod env_overrides;
mod forwarder;
mod logging;
mod platform;
mod sources;
mod validation;

pub use env_overrides::{apply_env_overrides, EnvSource, ENV_PREFIX};
pub use forwarder::{
    ElasticsearchArgs, ForwarderConfig, Input, InputType, Output, OutputType,
    DEFAULT_BATCH_MAX_ACTIONS, DEFAULT_BATCH_MAX_BYTES,
};
pub use logging::{env_filter, init_tracing};
pub use platform::Platform;

/// Main runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub queues: QueueConfig,

    #[serde(default)]
    pub forwarder: ForwarderSourceConfig,

    #[serde(default)]
    pub lambda: LambdaConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(skip, default = "Platform::detect")]
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => anyhow::bail!("Unsupported log format: {}. Supported: text, json", s),
        }
    }
}

/// Queue endpoints injected by the deployment template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// URL of the continuing queue (SQS_CONTINUE_URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_url: Option<String>,

    /// URL of the replay queue (SQS_REPLAY_URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replay_url: Option<String>,
}

/// Where the forwarder YAML config is fetched from when the trigger
/// does not carry it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwarderSourceConfig {
    /// `s3://bucket/key` of the forwarder config (S3_CONFIG_FILE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaConfig {
    /// Remaining invocation time below which unfinished work is handed to
    /// the continuing queue.
    pub completion_grace_period_ms: u64,
}

impl LambdaConfig {
    pub fn completion_grace_period(&self) -> Duration {
        Duration::from_millis(self.completion_grace_period_ms)
    }
}

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            completion_grace_period_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        let platform = Platform::detect();
        sources::load_config(platform)
    }

    /// Load configuration for a specific platform (useful for testing)
    pub fn load_for_platform(platform: Platform) -> Result<Self> {
        sources::load_config(platform)
    }

    /// Load configuration starting from an explicit TOML file
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Platform defaults with no file or environment applied
    pub fn from_platform_defaults(platform: Platform) -> Self {
        let defaults = platform.defaults();
        Self {
            log: LogConfig {
                level: defaults.log_level.to_string(),
                format: defaults.log_format,
            },
            queues: QueueConfig::default(),
            forwarder: ForwarderSourceConfig::default(),
            lambda: LambdaConfig {
                completion_grace_period_ms: defaults.completion_grace_period_ms,
            },
            storage: StorageConfig::default(),
            platform,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("plain".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let lambda = LambdaConfig::default();
        assert_eq!(lambda.completion_grace_period(), Duration::from_secs(120));

        let log = LogConfig::default();
        assert_eq!(log.level, "info");
        assert_eq!(log.format, LogFormat::Text);
    }
}
