//! # vitalwatch-core
//!
//! Real-time telemetry ingestion: one broker connection, one telemetry
//! topic, a live reading per metric and a bounded pressure trend.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vitalwatch_core::{ChannelBroker, Endpoint, MonitoringSession, SessionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let endpoint = Endpoint::parse("wss://broker.example.com:8884/mqtt").unwrap();
//!     let broker = ChannelBroker::new();
//!     let mut session = MonitoringSession::new(broker.clone(), SessionConfig::new(endpoint));
//!
//!     session.start();
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!
//!     broker.publish("telemetry", r#"{"bpm": 72, "pressureVolt": 1.21}"#);
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!
//!     println!("{:?}", session.live_reading());
//!     session.stop();
//! }
//! ```
//!
//! ## Pieces
//!
//! - [`ConnectionManager`]: connection lifecycle, flat-interval retries
//! - [`SubscriptionController`]: subscribes on every `Connected`, routes messages
//! - [`codec`]: payload decoding and validation
//! - [`TelemetryStore`] / [`SlidingWindow`]: live state and the bounded trend
//! - [`MonitoringSession`]: start/stop over all of the above
//!
//! Broker clients plug in through [`Connector`] and [`Transport`]; MQTT lives
//! in `vitalwatch-adapters`.

pub mod codec;
mod connection;
mod error;
mod options;
mod session;
mod store;
mod subscription;
mod transport;
mod window;

pub use connection::{ConnectionEvent, ConnectionHandle, ConnectionManager, Registration};
pub use error::{DecodeError, EndpointError, TransportError};
pub use options::{Credentials, Endpoint, QoS, Scheme, SessionOptions};
pub use session::{MonitoringSession, SessionConfig};
pub use store::{Generation, IngestStats, TelemetryStore};
pub use subscription::{Routed, SubscriptionController};
pub use transport::{ChannelBroker, ChannelTransport, Connector, InboundMessage, LinkEvent, Transport};
pub use window::SlidingWindow;

// Re-export types for convenience
pub use vitalwatch_types::{
    ConnectionState, LiveReading, PressurePoint, RestartPolicy, SessionStatus, TelemetrySample,
    DEFAULT_WINDOW_CAPACITY, TELEMETRY_TOPIC,
};
