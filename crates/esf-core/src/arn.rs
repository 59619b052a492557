//! Helpers for S3 URIs and AWS ARNs

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArnError {
    #[error("Invalid s3 uri provided: `{0}`")]
    InvalidS3Uri(String),
    #[error("Invalid kinesis stream arn provided: `{0}`")]
    InvalidKinesisArn(String),
}

/// Split `s3://bucket/some/key` into `("bucket", "some/key")`.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String), ArnError> {
    let rest = s3_uri
        .strip_prefix("s3://")
        .ok_or_else(|| ArnError::InvalidS3Uri(s3_uri.to_string()))?;

    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(ArnError::InvalidS3Uri(s3_uri.to_string())),
    }
}

/// `arn:aws:s3:::bucket-name` -> `bucket-name`
pub fn bucket_name_from_arn(bucket_arn: &str) -> &str {
    bucket_arn.rsplit(':').next().unwrap_or(bucket_arn)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KinesisStream {
    pub name: String,
    /// Resource type segment of the ARN, `stream` for data streams
    pub stream_type: String,
    pub region: String,
}

/// `arn:aws:kinesis:eu-west-1:123456789012:stream/app-logs`
pub fn kinesis_stream_from_arn(stream_arn: &str) -> Result<KinesisStream, ArnError> {
    let invalid = || ArnError::InvalidKinesisArn(stream_arn.to_string());

    let components: Vec<&str> = stream_arn.split(':').collect();
    if components.len() < 6 {
        return Err(invalid());
    }

    let (stream_type, name) = components[components.len() - 1]
        .split_once('/')
        .ok_or_else(invalid)?;

    Ok(KinesisStream {
        name: name.to_string(),
        stream_type: stream_type.to_string(),
        region: components[3].to_string(),
    })
}
