// Invocation results returned to the Lambda platform

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerResponse {
    /// Every record was shipped
    Completed,
    /// Unfinished work was handed to the continuing queue
    Continuing,
    /// Replayed events were shipped
    Replayed,
}

impl HandlerResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerResponse::Completed => "completed",
            HandlerResponse::Continuing => "continuing",
            HandlerResponse::Replayed => "replayed",
        }
    }
}

impl fmt::Display for HandlerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response for errors that are logged instead of failing the invocation
pub fn exception_response(error: &impl fmt::Display) -> String {
    format!("exception raised: {error}")
}
