//! Error types for the telemetry pipeline.

use thiserror::Error;

/// Errors raised by a broker transport.
///
/// None of these are fatal to a monitoring session: the connection manager
/// turns them into [`ConnectionState`](vitalwatch_types::ConnectionState)
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The socket could not be opened or failed while in use.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The handshake did not complete within the connect timeout.
    #[error("Handshake timed out")]
    Timeout,

    /// The broker refused the connection (bad credentials, client id, ...).
    #[error("Broker rejected connection: {0}")]
    Rejected(String),

    /// An established link went away.
    #[error("Connection dropped: {0}")]
    Dropped(String),

    /// A subscribe/unsubscribe request could not be queued.
    #[error("Request failed: {0}")]
    Request(String),

    /// The endpoint cannot be used by this transport.
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),
}

impl TransportError {
    /// Whether retrying the same endpoint can ever succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, TransportError::Endpoint(_))
    }
}

/// Errors produced when a payload cannot be turned into a telemetry sample.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// The object carries none of the known readings.
    #[error("Payload carries no readings")]
    NoReadings,
}

/// Errors produced when parsing a broker URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The URL has no `scheme://` prefix.
    #[error("missing scheme in '{0}'")]
    MissingScheme(String),

    /// The scheme is not one of `wss`, `ws`, `mqtts`, `mqtt`.
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    /// The URL has no host.
    #[error("missing host in '{0}'")]
    MissingHost(String),

    /// The port is not a valid number.
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}
