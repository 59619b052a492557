// Platform detection based on environment variables
//
// - AWS Lambda: AWS_LAMBDA_FUNCTION_NAME env var present
// - Local: anything else (CLI, tests, local invocation)

use crate::LogFormat;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Local,
    Lambda,
}

impl Platform {
    /// Auto-detect the current platform based on environment variables
    pub fn detect() -> Self {
        if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
            Platform::Lambda
        } else {
            Platform::Local
        }
    }

    /// Get platform-specific defaults
    pub fn defaults(&self) -> PlatformDefaults {
        match self {
            Platform::Local => PlatformDefaults {
                log_level: "info",
                log_format: LogFormat::Text,
                completion_grace_period_ms: 120_000,
            },
            // CloudWatch Logs ingests one JSON object per line
            Platform::Lambda => PlatformDefaults {
                log_level: "info",
                log_format: LogFormat::Json,
                completion_grace_period_ms: 120_000,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlatformDefaults {
    pub log_level: &'static str,
    pub log_format: LogFormat,
    pub completion_grace_period_ms: u64,
}
