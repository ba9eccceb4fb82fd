//! Error types for adapters.

use thiserror::Error;
use vitalwatch_core::TransportError;

/// Errors raised while setting up or driving a broker client.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The broker refused the connection.
    #[error("Broker refused connection: {0}")]
    Refused(String),

    /// Network or protocol failure.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The client's request queue is closed or full.
    #[error("Client request failed: {0}")]
    Client(String),
}

impl From<AdapterError> for TransportError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Refused(reason) => TransportError::Rejected(reason),
            AdapterError::Connection(reason) => TransportError::Connection(reason),
            AdapterError::Client(reason) => TransportError::Request(reason),
        }
    }
}

#[cfg(feature = "mqtt")]
impl From<rumqttc::ConnectionError> for AdapterError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        match err {
            rumqttc::ConnectionError::ConnectionRefused(code) => {
                AdapterError::Refused(format!("{:?}", code))
            }
            other => AdapterError::Connection(other.to_string()),
        }
    }
}

#[cfg(feature = "mqtt")]
impl From<rumqttc::ClientError> for AdapterError {
    fn from(err: rumqttc::ClientError) -> Self {
        AdapterError::Client(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_transport_errors() {
        assert_eq!(
            TransportError::from(AdapterError::Refused("NotAuthorized".into())),
            TransportError::Rejected("NotAuthorized".into())
        );
        assert_eq!(
            TransportError::from(AdapterError::Client("queue full".into())),
            TransportError::Request("queue full".into())
        );
    }

    #[cfg(feature = "mqtt")]
    #[test]
    fn refused_connack_is_a_rejection() {
        let err = rumqttc::ConnectionError::ConnectionRefused(
            rumqttc::ConnectReturnCode::BadUserNamePassword,
        );
        assert!(matches!(AdapterError::from(err), AdapterError::Refused(code) if code == "BadUserNamePassword"));

        let err = rumqttc::ConnectionError::RequestsDone;
        assert!(matches!(AdapterError::from(err), AdapterError::Connection(_)));
    }
}
