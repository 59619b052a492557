//! Line oriented reads of S3 objects through OpenDAL.
//!
//! Objects are streamed: gzip content is inflated chunk by chunk and split
//! into lines as it arrives, so memory use does not grow with the object.

use std::collections::HashMap;
use std::io::Write;

use bytes::Bytes;
use flate2::write::MultiGzDecoder;
use futures_util::TryStreamExt;
use opendal::layers::RetryLayer;
use opendal::{FuturesBytesStream, Operator};
use parking_lot::Mutex;

use super::error::{Result, StorageError};
use super::lines::{LineSplitter, LogLine};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_CONTENT_TYPE: &str = "application/x-gzip";
/// Ten attempts in total per S3 request
pub const S3_MAX_RETRIES: usize = 9;
/// Compressed bytes handed to the decoder at once
const INFLATE_CHUNK: usize = 64 * 1024;

/// Hands out an operator bound to a bucket.
pub trait OperatorProvider: Send + Sync {
    fn operator(&self, bucket: &str) -> Result<Operator>;
}

/// Builds S3 operators on first use and caches them per bucket.
///
/// OpenDAL discovers AWS credentials from the environment (the Lambda
/// execution role in production).
pub struct S3OperatorFactory {
    region: String,
    endpoint: Option<String>,
    operators: Mutex<HashMap<String, Operator>>,
}

impl S3OperatorFactory {
    pub fn new(region: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            region: region.into(),
            endpoint,
            operators: Mutex::new(HashMap::new()),
        }
    }
}

impl OperatorProvider for S3OperatorFactory {
    fn operator(&self, bucket: &str) -> Result<Operator> {
        let mut operators = self.operators.lock();
        if let Some(operator) = operators.get(bucket) {
            return Ok(operator.clone());
        }

        let mut builder = opendal::services::S3::default()
            .bucket(bucket)
            .region(&self.region);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .map_err(|source| StorageError::Operator {
                bucket: bucket.to_string(),
                source,
            })?
            .layer(retry_layer())
            .finish();

        tracing::debug!(bucket, region = %self.region, "S3 operator initialized");
        operators.insert(bucket.to_string(), operator.clone());
        Ok(operator)
    }
}

pub fn retry_layer() -> RetryLayer {
    RetryLayer::new().with_jitter().with_max_times(S3_MAX_RETRIES)
}

/// A single object in a bucket
pub struct S3Storage {
    operator: Operator,
    key: String,
}

impl S3Storage {
    pub fn new(operator: Operator, key: impl Into<String>) -> Self {
        Self {
            operator,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whole object decoded as UTF-8
    pub async fn get_as_string(&self) -> Result<String> {
        tracing::debug!(object_key = %self.key, "get_as_string");
        let content = self.read_all().await?;
        String::from_utf8(content.to_vec()).map_err(|_| StorageError::InvalidUtf8 {
            key: self.key.clone(),
        })
    }

    /// Lines of the object starting at `range_start`.
    ///
    /// Gzip objects are inflated on the fly; offsets always refer to the
    /// decompressed content so they can be used to resume a read.
    pub async fn get_by_lines(&self, range_start: u64) -> Result<ObjectLines> {
        let metadata = self
            .operator
            .stat(&self.key)
            .await
            .map_err(|e| StorageError::read(&self.key, e))?;
        let content_type = metadata.content_type().unwrap_or_default();
        let content_length = metadata.content_length();

        tracing::debug!(
            object_key = %self.key,
            content_type = %content_type,
            content_length,
            range_start,
            "get_by_lines"
        );

        let gzip = content_length >= GZIP_MAGIC.len() as u64
            && self
                .operator
                .read_with(&self.key)
                .range(0..GZIP_MAGIC.len() as u64)
                .await
                .map_err(|e| StorageError::read(&self.key, e))?
                .to_bytes()
                .starts_with(&GZIP_MAGIC);

        if gzip {
            let chunks = self.stream(0).await?;
            return Ok(ObjectLines::new(
                self.key.clone(),
                chunks,
                Some(MultiGzDecoder::new(Vec::new())),
                0,
                range_start,
            ));
        }

        if content_type == GZIP_CONTENT_TYPE {
            tracing::warn!(
                object_key = %self.key,
                "object declared as gzip has no gzip header, reading it as plain text"
            );
        }
        if range_start >= content_length {
            tracing::info!(
                object_key = %self.key,
                range_start,
                content_length,
                "requested content past the end of the object: skip it"
            );
            return Ok(ObjectLines::exhausted(self.key.clone(), range_start));
        }

        // plain content is fetched from the resume offset on
        let chunks = self.stream(range_start).await?;
        Ok(ObjectLines::new(
            self.key.clone(),
            chunks,
            None,
            range_start,
            range_start,
        ))
    }

    async fn stream(&self, from: u64) -> Result<FuturesBytesStream> {
        self.operator
            .reader(&self.key)
            .await
            .map_err(|e| StorageError::read(&self.key, e))?
            .into_bytes_stream(from..)
            .await
            .map_err(|e| StorageError::read(&self.key, e))
    }

    async fn read_all(&self) -> Result<Bytes> {
        let buffer = self
            .operator
            .read(&self.key)
            .await
            .map_err(|e| StorageError::read(&self.key, e))?;
        Ok(buffer.to_bytes())
    }
}

/// Lines of one object, read as the content streams in
pub struct ObjectLines {
    key: String,
    /// `None` once the content is exhausted
    chunks: Option<FuturesBytesStream>,
    decoder: Option<MultiGzDecoder<Vec<u8>>>,
    /// Fetched content not yet handed to the decoder
    compressed: Bytes,
    splitter: LineSplitter,
    range_start: u64,
}

impl std::fmt::Debug for ObjectLines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectLines")
            .field("key", &self.key)
            .field("range_start", &self.range_start)
            .finish_non_exhaustive()
    }
}

impl ObjectLines {
    fn new(
        key: String,
        chunks: FuturesBytesStream,
        decoder: Option<MultiGzDecoder<Vec<u8>>>,
        offset: u64,
        range_start: u64,
    ) -> Self {
        Self {
            key,
            chunks: Some(chunks),
            decoder,
            compressed: Bytes::new(),
            splitter: LineSplitter::new(offset),
            range_start,
        }
    }

    fn exhausted(key: String, range_start: u64) -> Self {
        Self {
            key,
            chunks: None,
            decoder: None,
            compressed: Bytes::new(),
            splitter: LineSplitter::new(range_start),
            range_start,
        }
    }

    /// Next line starting at or after the requested range start
    pub async fn next_line(&mut self) -> Result<Option<LogLine>> {
        loop {
            let eof = self.chunks.is_none();
            match self.splitter.next_line(eof) {
                Some(line) if line.starting_offset() >= self.range_start => return Ok(Some(line)),
                Some(_) => continue,
                None if eof => return Ok(None),
                None => self.fill().await?,
            }
        }
    }

    /// Every remaining line
    pub async fn collect(mut self) -> Result<Vec<LogLine>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Hand the next piece of content to the splitter, or mark the content
    /// exhausted.
    async fn fill(&mut self) -> Result<()> {
        if self.compressed.is_empty() {
            let Some(chunks) = self.chunks.as_mut() else {
                return Ok(());
            };
            let next = chunks
                .try_next()
                .await
                .map_err(|source| StorageError::Stream {
                    key: self.key.clone(),
                    source,
                })?;
            match next {
                Some(chunk) => self.compressed = chunk,
                None => return self.finish(),
            }
        }

        match self.decoder.as_mut() {
            Some(decoder) => {
                let input = self
                    .compressed
                    .split_to(self.compressed.len().min(INFLATE_CHUNK));
                decoder
                    .write_all(&input)
                    .and_then(|()| decoder.flush())
                    .map_err(|source| StorageError::Inflate {
                        key: self.key.clone(),
                        source,
                    })?;
                let inflated = std::mem::take(decoder.get_mut());
                self.splitter.push(&inflated);
            }
            None => {
                let chunk = std::mem::take(&mut self.compressed);
                self.splitter.push(&chunk);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.chunks = None;
        if let Some(mut decoder) = self.decoder.take() {
            decoder.try_finish().map_err(|source| StorageError::Inflate {
                key: self.key.clone(),
                source,
            })?;
            let inflated = std::mem::take(decoder.get_mut());
            self.splitter.push(&inflated);
        }

        let content_length = self.splitter.end_offset();
        if self.range_start > 0 && self.range_start >= content_length {
            tracing::info!(
                object_key = %self.key,
                range_start = self.range_start,
                content_length,
                "requested content past the end of the object: skip it"
            );
        }
        Ok(())
    }
}
