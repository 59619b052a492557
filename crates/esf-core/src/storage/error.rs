//! Error types for object storage reads.

use thiserror::Error;

/// Errors that can occur while reading objects
#[derive(Debug, Error)]
pub enum StorageError {
    /// The operator for a bucket could not be built
    #[error("Failed to create S3 operator for bucket {bucket}: {source}")]
    Operator {
        bucket: String,
        #[source]
        source: opendal::Error,
    },

    /// Metadata or content request failed
    #[error("Failed to read s3 object {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: opendal::Error,
    },

    /// Content stream broke off midway
    #[error("Failed to stream s3 object {key}: {source}")]
    Stream {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Content is not valid UTF-8
    #[error("Object {key} is not valid UTF-8")]
    InvalidUtf8 { key: String },

    /// Gzip stream is corrupt or truncated
    #[error("Failed to inflate object {key}: {source}")]
    Inflate {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn read(key: &str, source: opendal::Error) -> Self {
        Self::Read {
            key: key.to_string(),
            source,
        }
    }
}

/// Result type alias for StorageError
pub type Result<T> = std::result::Result<T, StorageError>;
