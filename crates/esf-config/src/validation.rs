// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

/// Function timeout declared in the deployment template, in milliseconds.
const FUNCTION_TIMEOUT_MS: u64 = 900_000;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_log_config(&config.log)?;
    validate_lambda_config(&config.lambda)?;
    validate_queue_config(&config.queues)?;
    validate_forwarder_source(&config.forwarder)?;

    if config.platform == Platform::Lambda {
        validate_lambda_requirements(config)?;
    }

    Ok(())
}

fn validate_log_config(config: &LogConfig) -> Result<()> {
    if config.level.trim().is_empty() {
        bail!("log.level must not be empty");
    }
    Ok(())
}

fn validate_lambda_config(config: &LambdaConfig) -> Result<()> {
    if config.completion_grace_period_ms == 0 {
        bail!("lambda.completion_grace_period_ms must be greater than 0");
    }

    if config.completion_grace_period_ms >= FUNCTION_TIMEOUT_MS {
        bail!(
            "lambda.completion_grace_period_ms must be lower than the function timeout ({} ms)",
            FUNCTION_TIMEOUT_MS
        );
    }

    if config.completion_grace_period_ms > FUNCTION_TIMEOUT_MS / 2 {
        warn!(
            completion_grace_period_ms = config.completion_grace_period_ms,
            "lambda.completion_grace_period_ms leaves less than half of the invocation for shipping"
        );
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<()> {
    for (name, url) in [
        ("queues.continue_url", &config.continue_url),
        ("queues.replay_url", &config.replay_url),
    ] {
        if let Some(url) = url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                bail!("{} must be an http(s) queue URL, got '{}'", name, url);
            }
        }
    }
    Ok(())
}

fn validate_forwarder_source(config: &ForwarderSourceConfig) -> Result<()> {
    if let Some(uri) = &config.config_file {
        if !uri.starts_with("s3://") {
            bail!("forwarder.config_file must be an s3:// URI, got '{}'", uri);
        }
    }
    Ok(())
}

fn validate_lambda_requirements(config: &RuntimeConfig) -> Result<()> {
    if config.queues.continue_url.is_none() {
        bail!("SQS_CONTINUE_URL is required when running on AWS Lambda");
    }
    if config.queues.replay_url.is_none() {
        bail!("SQS_REPLAY_URL is required when running on AWS Lambda");
    }
    if config.forwarder.config_file.is_none() {
        warn!("S3_CONFIG_FILE is not set; only continued and replayed events can be processed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_lambda_config() {
        assert!(validate_lambda_config(&LambdaConfig::default()).is_ok());

        let zero = LambdaConfig {
            completion_grace_period_ms: 0,
        };
        assert!(validate_lambda_config(&zero).is_err());

        let too_long = LambdaConfig {
            completion_grace_period_ms: FUNCTION_TIMEOUT_MS,
        };
        assert!(validate_lambda_config(&too_long).is_err());
    }

    #[test]
    fn test_validate_queue_urls() {
        let valid = QueueConfig {
            continue_url: Some("https://sqs.us-east-1.amazonaws.com/123/continuing".into()),
            replay_url: None,
        };
        assert!(validate_queue_config(&valid).is_ok());

        let invalid = QueueConfig {
            continue_url: None,
            replay_url: Some("arn:aws:sqs:us-east-1:123:replay".into()),
        };
        let err = validate_queue_config(&invalid).unwrap_err();
        assert!(err.to_string().contains("queues.replay_url"));
    }

    #[test]
    fn test_lambda_requires_queue_urls() {
        let mut config = RuntimeConfig::from_platform_defaults(Platform::Lambda);
        assert!(validate_config(&config).is_err());

        config.queues.continue_url = Some("https://sqs.us-east-1.amazonaws.com/1/c".into());
        config.queues.replay_url = Some("https://sqs.us-east-1.amazonaws.com/1/r".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_file_must_be_s3_uri() {
        let config = ForwarderSourceConfig {
            config_file: Some("/etc/esf/config.yaml".into()),
        };
        assert!(validate_forwarder_source(&config).is_err());
    }
}
