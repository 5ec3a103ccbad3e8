use thiserror::Error;
use tickflow_types::{response::codes, Response};

/// Failures surfaced by domain handlers. The router converts these to
/// response envelopes at the boundary; nothing escapes to the transport.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl RealtimeError {
    pub fn code(&self) -> i32 {
        match self {
            Self::BadRequest(_) => codes::BAD_REQUEST,
            Self::NotFound(_) => codes::NOT_FOUND,
            Self::Payload(_) => codes::INTERNAL,
        }
    }

    pub fn into_response(self) -> Response {
        Response::error(self.code(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RealtimeError>;
