//! # vitalwatch
//!
//! Live vital-sign telemetry monitor. Subscribes to a broker topic on which
//! devices publish heart rate, oxygen saturation and pressure readings, and
//! keeps the latest value of each plus a bounded pressure trend.
//!
//! ## Architecture
//!
//! ```text
//!  stdin ──▶ app (toggle/quit) ──▶ MonitoringSession ──▶ status line ──▶ stdout
//!                                        │
//!                                        │ Connector
//!                                        ▼
//!                                  MqttConnector ◀── wss / ws / mqtts / mqtt
//! ```
//!
//! - **[`app`]**: live toggle and keyboard commands over a session
//! - **[`settings`]**: layered configuration (defaults, TOML file, environment)
//! - **[`status`]**: text rendering of readings and the pressure sparkline
//!
//! ## Usage
//!
//! ```bash
//! # Monitor the default broker
//! vitalwatch
//!
//! # Use a config file and a different broker
//! vitalwatch --config vitalwatch.toml --url wss://my-cluster.example.cloud:8884/mqtt
//! ```
//!
//! ### As a library
//!
//! ```
//! use vitalwatch::App;
//! use vitalwatch_core::{ChannelBroker, Endpoint, MonitoringSession, SessionConfig};
//!
//! let endpoint = Endpoint::parse("wss://broker.example.com:8884/mqtt").unwrap();
//! let session = MonitoringSession::new(ChannelBroker::new(), SessionConfig::new(endpoint));
//! let mut app = App::new(session);
//! assert_eq!(app.status_line(), "[paused] HR — | SpO2 — | Pressure —");
//!
//! // Going live spawns the connection driver, so it needs a runtime
//! # tokio_test::block_on(async {
//! app.handle_command("l");
//! assert!(app.is_live());
//! app.handle_command("q");
//! assert!(!app.running);
//! # });
//! ```

pub mod app;
pub mod settings;
pub mod status;

// Re-export main types for convenience
pub use app::App;
pub use settings::Settings;
