//! Error types for shipping events.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShipperError {
    #[error("Elasticsearch index cannot be empty")]
    EmptyIndex,

    #[error("Event must be a JSON object")]
    InvalidEvent,

    #[error("Invalid cloud_id: {0}")]
    InvalidCloudId(String),

    #[error("Invalid output args: {0}")]
    InvalidOutput(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Bulk request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Bulk request returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to encode bulk request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to replay event: {0}")]
    Replay(String),
}

pub type Result<T> = std::result::Result<T, ShipperError>;
