//! MQTT transport built on rumqttc.
//!
//! Each connection attempt gets its own `AsyncClient`/`EventLoop` pair. The
//! event loop is polled only by the connection driver: once for the
//! handshake, then continuously for inbound publishes. rumqttc's own
//! reconnect-on-poll behaviour is never relied upon.
//!
//! Requests only reach the wire while the event loop is polled, so
//! `unsubscribe` and `close` keep polling until their packet has gone out,
//! bounded by [`FLUSH_TIMEOUT`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use vitalwatch_adapters::mqtt::MqttConnector;
//!
//! let connector = MqttConnector::builder()
//!     .request_capacity(16)
//!     .max_packet_size(64 * 1024)
//!     .build();
//! ```

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS as MqttQoS, Transport as MqttWire,
};
use tracing::{debug, trace};
use vitalwatch_core::{
    Connector, Credentials, Endpoint, InboundMessage, LinkEvent, QoS, Scheme, SessionOptions,
    Transport, TransportError,
};

use crate::AdapterError;

const DEFAULT_REQUEST_CAPACITY: usize = 10;

/// How long `unsubscribe` and `close` wait for their packet to be written.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds rumqttc clients for the connection manager.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    request_capacity: usize,
    max_packet_size: Option<usize>,
}

impl MqttConnector {
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder for configuring the connector.
    pub fn builder() -> MqttConnectorBuilder {
        MqttConnectorBuilder::default()
    }

    /// rumqttc options for one connection attempt.
    pub fn mqtt_options(
        &self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
        options: &SessionOptions,
        client_id: &str,
    ) -> MqttOptions {
        let host = match endpoint.scheme() {
            // The websocket transport takes the whole URL as the host
            Scheme::Wss | Scheme::Ws => websocket_url(endpoint),
            Scheme::Mqtts | Scheme::Mqtt => endpoint.host().to_string(),
        };

        let mut mqtt = MqttOptions::new(client_id, host, endpoint.port());
        mqtt.set_keep_alive(options.keepalive);
        mqtt.set_clean_session(options.clean_session);
        if let Some(credentials) = credentials {
            mqtt.set_credentials(credentials.username(), credentials.password());
        }
        if let Some(size) = self.max_packet_size {
            mqtt.set_max_packet_size(size, size);
        }

        let wire = match endpoint.scheme() {
            Scheme::Wss => MqttWire::wss_with_default_config(),
            Scheme::Ws => MqttWire::Ws,
            Scheme::Mqtts => MqttWire::tls_with_default_config(),
            Scheme::Mqtt => MqttWire::Tcp,
        };
        mqtt.set_transport(wire);
        mqtt
    }
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MqttConnector {
    type Transport = MqttTransport;

    fn open(
        &self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
        options: &SessionOptions,
        client_id: &str,
    ) -> Result<MqttTransport, TransportError> {
        let mqtt = self.mqtt_options(endpoint, credentials, options, client_id);
        let (client, eventloop) = AsyncClient::new(mqtt, self.request_capacity);
        debug!("Opened MQTT client {} for {}", client_id, endpoint);
        Ok(MqttTransport { client, eventloop })
    }
}

/// Builder for MqttConnector.
#[derive(Debug, Default)]
pub struct MqttConnectorBuilder {
    request_capacity: Option<usize>,
    max_packet_size: Option<usize>,
}

impl MqttConnectorBuilder {
    /// Capacity of the client's outgoing request queue (default: 10).
    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = Some(capacity);
        self
    }

    /// Largest packet accepted or sent, in bytes.
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = Some(size);
        self
    }

    pub fn build(self) -> MqttConnector {
        MqttConnector {
            request_capacity: self.request_capacity.unwrap_or(DEFAULT_REQUEST_CAPACITY).max(1),
            max_packet_size: self.max_packet_size,
        }
    }
}

/// One rumqttc client and its event loop.
pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
}

#[async_trait]
impl Transport for MqttTransport {
    async fn handshake(&mut self) -> Result<(), TransportError> {
        loop {
            match self.eventloop.poll().await.map_err(AdapterError::from)? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(AdapterError::Refused(format!("{:?}", code)).into()),
                    };
                }
                event => trace!("Handshake event: {:?}", event),
            }
        }
    }

    async fn next_event(&mut self) -> Result<LinkEvent, TransportError> {
        loop {
            match self.eventloop.poll().await.map_err(AdapterError::from)? {
                Event::Incoming(Packet::Publish(publish)) => {
                    return Ok(LinkEvent::Message(InboundMessage {
                        topic: publish.topic,
                        payload: publish.payload,
                        received_at: SystemTime::now(),
                    }));
                }
                Event::Incoming(Packet::Disconnect) => {
                    return Err(TransportError::Dropped("broker sent disconnect".to_string()));
                }
                event => trace!("Link event: {:?}", event),
            }
        }
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, map_qos(qos))
            .map_err(AdapterError::from)?;
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(AdapterError::from)?;
        self.flush_until(|out| matches!(out, Outgoing::Unsubscribe(_)))
            .await
    }

    async fn close(&mut self) {
        if let Err(err) = self.client.try_disconnect() {
            debug!("Disconnect not queued: {}", err);
            return;
        }
        if let Err(err) = self.flush_until(|out| matches!(out, Outgoing::Disconnect)).await {
            debug!("Disconnect not sent: {}", err);
        }
    }
}

impl MqttTransport {
    /// Poll the event loop until an outgoing packet matching `sent` is written.
    ///
    /// Inbound publishes seen meanwhile are dropped.
    async fn flush_until(&mut self, sent: fn(&Outgoing) -> bool) -> Result<(), TransportError> {
        match tokio::time::timeout(FLUSH_TIMEOUT, self.poll_until(sent)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn poll_until(&mut self, sent: fn(&Outgoing) -> bool) -> Result<(), TransportError> {
        loop {
            match self.eventloop.poll().await.map_err(AdapterError::from)? {
                Event::Outgoing(outgoing) if sent(&outgoing) => return Ok(()),
                event => trace!("Flush event: {:?}", event),
            }
        }
    }
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport").finish()
    }
}

fn map_qos(qos: QoS) -> MqttQoS {
    match qos {
        QoS::AtMostOnce => MqttQoS::AtMostOnce,
        QoS::AtLeastOnce => MqttQoS::AtLeastOnce,
        QoS::ExactlyOnce => MqttQoS::ExactlyOnce,
    }
}

fn websocket_url(endpoint: &Endpoint) -> String {
    let host = endpoint.host();
    let host = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    format!(
        "{}://{}:{}{}",
        endpoint.scheme().as_str(),
        host,
        endpoint.port(),
        endpoint.path()
    )
}
