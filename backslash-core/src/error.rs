use http::StatusCode;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Occurs when `backslash.toml` fails to load.
    #[error("failed to load backslash.toml: {0}")]
    LoadError(String),
    /// Occurs when a required configuration value is missing.
    #[error("the specified key \"{0}\" not found in backslash configuration")]
    ValueNotFound(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build http request: {0}")]
    Request(#[from] http::Error),
    #[error("failed to decode json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection could not be established or broke mid-exchange.
    #[error("connection error: {0}")]
    Connection(String),
    /// A single attempt did not complete within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Any non-2xx response.
    #[error("{method} {url}: {status}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("maximum number of retries exceeded for {method} {url} (last error: {last})")]
    RetriesExhausted {
        method: String,
        url: String,
        last: String,
    },

    #[error("request parameters too large ({size} bytes, limit is {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("query returned objects of type \"{found}\" but earlier pages returned \"{expected}\"")]
    InconsistentQueryType { expected: String, found: String },
    #[error("query page contains multiple data keys: {0}")]
    MultipleDataKeys(String),
    #[error("refreshed object has id {found} but {expected} was expected")]
    IdentityMismatch {
        expected: serde_json::Value,
        found: serde_json::Value,
    },
    #[error("{0} is not supported")]
    Unsupported(&'static str),
    #[error("index {index} out of range for query of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("field \"{0}\" not found")]
    FieldNotFound(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Whether a retry within the retry window may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Connection(_) | Error::Timeout(_) => true,
            Error::Status { status, .. } => {
                matches!(*status, StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT)
            }
            _ => false,
        }
    }

    /// HTTP status of a terminal status error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
