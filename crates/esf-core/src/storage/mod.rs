//! Object storage access
//!
//! Objects are streamed through OpenDAL and split into lines. Each line
//! records the offset just past it so an interrupted read can resume.

mod error;
mod lines;
mod s3;

pub use error::{Result, StorageError};
pub use lines::{split_lines, LineSplitter, LogLine};
pub use s3::{
    retry_layer, ObjectLines, OperatorProvider, S3OperatorFactory, S3Storage, S3_MAX_RETRIES,
};
