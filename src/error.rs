//! Error types

/// Failures of the event source underneath a stream
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The provider reported an error inside the stream
    #[error("provider error: {0}")]
    Provider(String),

    #[error("stream read error: {0}")]
    Read(String),
}

/// Errors surfaced to callers
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{env_var} not found in environment (provider {provider})")]
    MissingCredential { provider: String, env_var: String },

    /// The event source failed mid-stream; `partial_text` holds every content
    /// delta received before the failure
    #[error("stream failed: {source}")]
    TransportFailure {
        partial_text: String,
        #[source]
        source: TransportError,
    },

    /// An event could not be classified. Decoders produce this; adapters turn
    /// it into [`Event::Other`](crate::Event::Other).
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    /// The caller stopped consuming before the stream ended
    #[error("stream cancelled")]
    Cancelled { partial_text: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Discriminant of [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingCredential,
    TransportFailure,
    MalformedEvent,
    Cancelled,
    InvalidRequest,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingCredential { .. } => ErrorKind::MissingCredential,
            Error::TransportFailure { .. } => ErrorKind::TransportFailure,
            Error::MalformedEvent { .. } => ErrorKind::MalformedEvent,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Text accumulated before a mid-stream failure or cancellation
    pub fn partial_text(&self) -> Option<&str> {
        match self {
            Error::TransportFailure { partial_text, .. } | Error::Cancelled { partial_text } => {
                Some(partial_text)
            }
            _ => None,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Failure before any content arrived
    pub(crate) fn transport(source: TransportError) -> Self {
        Error::TransportFailure {
            partial_text: String::new(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
