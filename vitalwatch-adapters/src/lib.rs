//! # vitalwatch-adapters
//!
//! Broker clients that plug into [`vitalwatch_core`] through its
//! [`Connector`](vitalwatch_core::Connector) seam.
//!
//! ## Supported Brokers
//!
//! - **MQTT 3.1.1** (`mqtt` feature) - over `mqtt://`, `mqtts://`, `ws://` and
//!   `wss://`, using rumqttc
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vitalwatch_adapters::mqtt::MqttConnector;
//! use vitalwatch_core::{Endpoint, MonitoringSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = Endpoint::parse("wss://broker.hivemq.com:8884/mqtt")?;
//!     let mut session = MonitoringSession::new(MqttConnector::new(), SessionConfig::new(endpoint));
//!
//!     session.start();
//!     tokio::signal::ctrl_c().await?;
//!     session.stop();
//!     Ok(())
//! }
//! ```

pub mod error;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use error::AdapterError;

// Re-export the seam for convenience
pub use vitalwatch_core::{Connector, Transport, TransportError};
