use crate::{LogFormat, RuntimeConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "ESF_";

/// Abstraction over environment-variable lookups so tests (and callers that
/// already hold their environment) can supply their own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the ESF_ prefix.
    /// Used for the variables wired by the deployment template
    /// (SQS_CONTINUE_URL, SQS_REPLAY_URL, S3_CONFIG_FILE) and AWS_REGION.
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.log.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.log.format = format
            .parse::<LogFormat>()
            .context("Invalid ESF_LOG_FORMAT value")?;
    }

    // Queues wired by the template
    if let Some(url) = get_raw_env_string(env, "SQS_CONTINUE_URL") {
        config.queues.continue_url = Some(url);
    }
    if let Some(url) = get_raw_env_string(env, "SQS_REPLAY_URL") {
        config.queues.replay_url = Some(url);
    }

    // Forwarder config location
    if let Some(uri) = get_raw_env_string(env, "S3_CONFIG_FILE") {
        config.forwarder.config_file = Some(uri);
    }

    // Lambda
    if let Some(val) = get_env_u64(env, "COMPLETION_GRACE_PERIOD_MS")? {
        config.lambda.completion_grace_period_ms = val;
    }

    // Storage
    if let Some(region) = get_raw_env_string(env, "AWS_REGION") {
        config.storage.region = region;
    }
    if let Some(endpoint) = get_env_string(env, "S3_ENDPOINT") {
        config.storage.endpoint = Some(endpoint);
    }

    Ok(())
}

/// Empty values count as unset: SAM renders an unset parameter as "".
fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|v| !v.is_empty())
}

fn get_raw_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get_raw(key).filter(|v| !v.is_empty())
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}
