// Configuration source loading.
//
// Priority order:
// 1. Environment variables (ESF_* prefix, plus the raw template variables)
// 2. Config file path from ESF_CONFIG
// 3. Inline config content from ESF_CONFIG_CONTENT
// 4. Default config files (./esf.toml, ./.esf.toml)
// 5. Platform defaults (based on auto-detected Platform)

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::platform::Platform;
use crate::*;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Load configuration for the detected platform using process environment/file access.
pub fn load_config(platform: Platform) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::from_platform_defaults(platform);

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file path (for the CLI --config flag).
/// Starts with platform defaults, merges the file, then applies environment
/// overrides.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let file_config = parse_file_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    let mut config = RuntimeConfig::from_platform_defaults(Platform::detect());
    config.merge(file_config);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<FileConfig>> {
    if let Ok(path) = env::var("ESF_CONFIG") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config = parse_file_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    if let Ok(content) = env::var("ESF_CONFIG_CONTENT") {
        let config = parse_file_config(&content)
            .context("Failed to parse inline config from ESF_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in &["./esf.toml", "./.esf.toml"] {
        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            let config = parse_file_config(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?;
            return Ok(Some(config));
        }
    }

    Ok(None)
}

pub(crate) fn parse_file_config(content: &str) -> Result<FileConfig> {
    Ok(toml::from_str(content)?)
}

/// TOML file contents. Every leaf is optional so a file only overrides what
/// it mentions.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    #[serde(default)]
    log: FileLogConfig,
    #[serde(default)]
    queues: QueueConfig,
    #[serde(default)]
    forwarder: ForwarderSourceConfig,
    #[serde(default)]
    lambda: FileLambdaConfig,
    #[serde(default)]
    storage: FileStorageConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLogConfig {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileLambdaConfig {
    completion_grace_period_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileStorageConfig {
    region: Option<String>,
    endpoint: Option<String>,
}

impl RuntimeConfig {
    pub(crate) fn merge(&mut self, file: FileConfig) {
        if let Some(level) = file.log.level {
            self.log.level = level;
        }
        if let Some(format) = file.log.format {
            self.log.format = format;
        }
        if file.queues.continue_url.is_some() {
            self.queues.continue_url = file.queues.continue_url;
        }
        if file.queues.replay_url.is_some() {
            self.queues.replay_url = file.queues.replay_url;
        }
        if file.forwarder.config_file.is_some() {
            self.forwarder.config_file = file.forwarder.config_file;
        }
        if let Some(grace) = file.lambda.completion_grace_period_ms {
            self.lambda.completion_grace_period_ms = grace;
        }
        if let Some(region) = file.storage.region {
            self.storage.region = region;
        }
        if file.storage.endpoint.is_some() {
            self.storage.endpoint = file.storage.endpoint;
        }
    }
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}
