use thiserror::Error;

/// Categorizes errors for caller decision-making.
///
/// This is a lightweight, cloneable representation of the error type
/// that can be logged or matched on without holding the full error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// WebSocket protocol error
    WebSocket,
    /// Connection failed (timeout, refused, etc.)
    ConnectionFailed,
    /// REST collaborator error
    Api,
    /// Outbound message could not be encoded
    Encode,
    /// Client is shutting down
    ShuttingDown,
}

/// Errors that can occur in matchmaking-client
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A single connection attempt failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// REST transport failure (DNS, TLS, timeout, body decoding)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// REST call returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Outbound message could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Client is shutting down
    #[error("Matchmaking client is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WebSocket(_) => ErrorKind::WebSocket,
            Error::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Error::Http(_) | Error::Api { .. } => ErrorKind::Api,
            Error::Encode(_) => ErrorKind::Encode,
            Error::ShuttingDown => ErrorKind::ShuttingDown,
        }
    }
}

/// Inbound message decoding failures.
///
/// These never close the connection; the offending message is dropped.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is not a `{type, payload}` JSON envelope
    #[error("Malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The payload does not match the shape expected for its type
    #[error("Malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// User-visible connection failure surfaced through the queue snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The reconnect budget for this queuing episode ran out
    #[error("Lost connection to matchmaking after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },
}
