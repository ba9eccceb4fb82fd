//! Transport abstraction between the connection manager and a broker client.
//!
//! A [`Connector`] builds one [`Transport`] per connection attempt; the
//! connection manager drives it from a single background task. Concrete MQTT
//! transports live in `vitalwatch-adapters`; [`ChannelBroker`] is an
//! in-memory implementation for tests and synthetic feeds.

mod channel;

pub use channel::{ChannelBroker, ChannelTransport};

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::options::{Credentials, Endpoint, QoS, SessionOptions};

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw message body.
    pub payload: Bytes,
    /// When the transport received the message.
    pub received_at: SystemTime,
}

impl InboundMessage {
    /// Create a message stamped with the current time.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: SystemTime::now(),
        }
    }

    /// Receipt time in milliseconds since the Unix epoch.
    pub fn received_ms(&self) -> u64 {
        self.received_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Something that happened on an established link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A published message arrived.
    Message(InboundMessage),
    /// Protocol traffic with no meaning to the pipeline (acks, pings).
    Ignored,
}

/// One link to a broker.
///
/// Implementations must make [`next_event`](Transport::next_event)
/// cancellation safe: the driver polls it inside `tokio::select!`.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Complete the connection handshake.
    async fn handshake(&mut self) -> Result<(), TransportError>;

    /// Wait for the next event. An error means the link is gone.
    async fn next_event(&mut self) -> Result<LinkEvent, TransportError>;

    /// Queue a subscription request.
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Queue an unsubscribe request.
    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Tear the link down without waiting for the broker.
    async fn close(&mut self);
}

/// Factory for transports.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Build a link for one connection attempt. Does not perform I/O.
    fn open(
        &self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
        options: &SessionOptions,
        client_id: &str,
    ) -> Result<Self::Transport, TransportError>;
}
