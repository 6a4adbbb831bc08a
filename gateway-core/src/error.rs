use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// The gateway core's error taxonomy.
///
/// Each variant maps to exactly one HTTP status at the response boundary;
/// see [`Error::into_response`]. Never leaks internal detail in the body.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No source produced the requested object.
    #[error("not found")]
    NotFound,

    /// Object is on a blocklist by id or hash.
    #[error("blocked")]
    Blocked,

    /// Requested range lies outside the object's bounds.
    #[error("range not satisfiable")]
    RangeUnsatisfiable,

    /// `Range` header could not be parsed.
    #[error("malformed range header")]
    MalformedRange,

    /// A cryptographic check failed on a chunk fetched from a peer.
    ///
    /// Retriable against another peer; never surfaced to the client as-is.
    #[error("chunk validation failed: {0}")]
    ValidationFailed(String),

    /// An individual peer request failed (network, timeout, HTTP >= 400).
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),

    /// The trusted node could not be reached during a peer list refresh.
    #[error("peer refresh failed: {0}")]
    PeerRefresh(String),

    /// Every configured source failed.
    #[error("all sources failed")]
    AllSourcesFailed { sources: Vec<String> },

    /// Originated from a client disconnect or upstream abort.
    #[error("cancelled")]
    Cancelled,

    /// Upstream signalled an irrecoverable condition mid-stream.
    #[error("permanent error: {0}")]
    PermanentError(String),

    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Data or chunk store I/O failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Error::NotFound | Error::AllSourcesFailed { .. } => {
                (StatusCode::NOT_FOUND, "Not Found")
            }
            Error::Blocked => (StatusCode::NOT_FOUND, "Not Found"),
            Error::RangeUnsatisfiable => {
                (StatusCode::RANGE_NOT_SATISFIABLE, "Range not satisfiable")
            }
            Error::MalformedRange => (StatusCode::BAD_REQUEST, "Malformed 'range' header"),
            Error::ValidationFailed(_) | Error::PeerUnavailable(_) => {
                // Absorbed at the peer loop in normal operation; reaching the HTTP
                // boundary means every retry was already exhausted.
                (StatusCode::NOT_FOUND, "Not Found")
            }
            Error::Cancelled => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            Error::PeerRefresh(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            Error::PermanentError(_)
            | Error::Config(_)
            | Error::Storage(_)
            | Error::Io(_)
            | Error::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        };

        (status, message).into_response()
    }
}
