use posflow_events::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker closed")]
    Closed,

    #[error("network error: {0}")]
    Http(String),

    #[error("ingest rejected event (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("cannot encode event: {0}")]
    Encode(#[from] WireError),

    #[error("send cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}
