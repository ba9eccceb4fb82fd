//! Monitoring session: start/stop lifecycle over one broker connection.
//!
//! A session wires the pieces together:
//!
//! ```text
//! ConnectionManager ──events──▶ SubscriptionController ──Routed──▶ ingest task ──▶ TelemetryStore
//! ```
//!
//! The store is the only shared state. Readers take snapshots through the
//! session's view methods; the ingest task is the only writer.

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitalwatch_types::{
    ConnectionState, LiveReading, PressurePoint, RestartPolicy, SessionStatus,
    DEFAULT_WINDOW_CAPACITY, TELEMETRY_TOPIC,
};

use crate::connection::{ConnectionEvent, ConnectionHandle, ConnectionManager};
use crate::options::{Credentials, Endpoint, SessionOptions};
use crate::store::{Generation, IngestStats, TelemetryStore};
use crate::subscription::{Routed, SubscriptionController};
use crate::transport::Connector;

/// Everything a session needs to know up front.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub credentials: Option<Credentials>,
    pub options: SessionOptions,
    /// Topic carrying telemetry payloads.
    pub topic: String,
    /// Number of pressure points kept for the trend.
    pub window_capacity: NonZeroUsize,
    pub restart_policy: RestartPolicy,
}

impl SessionConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            credentials: None,
            options: SessionOptions::default(),
            topic: TELEMETRY_TOPIC.to_string(),
            window_capacity: NonZeroUsize::new(DEFAULT_WINDOW_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            restart_policy: RestartPolicy::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_window_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.window_capacity = capacity;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }
}

struct Running {
    handle: ConnectionHandle,
    controller: Arc<SubscriptionController>,
    task: JoinHandle<()>,
}

/// A telemetry monitoring session.
///
/// # Example
///
/// ```rust
/// use vitalwatch_core::{ChannelBroker, Endpoint, MonitoringSession, SessionConfig};
/// use vitalwatch_types::SessionStatus;
///
/// # tokio_test::block_on(async {
/// let endpoint = Endpoint::parse("wss://broker.example.com:8884/mqtt").unwrap();
/// let mut session = MonitoringSession::new(ChannelBroker::new(), SessionConfig::new(endpoint));
///
/// session.start();
/// assert_eq!(session.status(), SessionStatus::Starting);
///
/// session.stop();
/// assert_eq!(session.status(), SessionStatus::Stopped);
/// # });
/// ```
pub struct MonitoringSession<C: Connector> {
    config: SessionConfig,
    manager: ConnectionManager<C>,
    store: Arc<TelemetryStore>,
    running: Option<Running>,
    started_before: bool,
}

impl<C: Connector> MonitoringSession<C> {
    pub fn new(connector: C, config: SessionConfig) -> Self {
        let store = Arc::new(TelemetryStore::new(config.window_capacity));
        Self {
            manager: ConnectionManager::new(connector),
            config,
            store,
            running: None,
            started_before: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        self.manager.connector()
    }

    /// Start monitoring. A no-op while already started.
    ///
    /// Returns immediately; connection progress shows up in
    /// [`status`](Self::status). Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.running.is_some() {
            debug!("Session already started");
            return;
        }

        let reset = self.config.restart_policy == RestartPolicy::Reset;
        let generation = self.store.open(reset);

        let handle = self.manager.connect(
            &self.config.endpoint,
            self.config.credentials.as_ref(),
            &self.config.options,
        );
        let (controller, events) = SubscriptionController::attach(handle.clone(), &self.config.topic);
        let task = tokio::spawn(ingest(controller.clone(), self.store.clone(), generation, events));

        info!(
            "Monitoring '{}' on {}",
            self.config.topic, self.config.endpoint
        );
        self.running = Some(Running {
            handle,
            controller,
            task,
        });
        self.started_before = true;
    }

    /// Stop monitoring. A no-op while stopped.
    ///
    /// Once this returns, the live reading and pressure window no longer
    /// change.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.store.close();
        running.controller.detach();
        self.manager.disconnect(&running.handle);
        running.task.abort();
        info!("Monitoring stopped");
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    pub fn status(&self) -> SessionStatus {
        match &self.running {
            None => SessionStatus::Stopped,
            Some(_) if !self.store.is_observed() => SessionStatus::Starting,
            Some(running) => SessionStatus::Running(running.handle.state()),
        }
    }

    /// State of the underlying connection.
    ///
    /// `Idle` before the first start, `Disconnected` while stopped after that.
    pub fn connection_state(&self) -> ConnectionState {
        match &self.running {
            Some(running) => running.handle.state(),
            None if self.started_before => ConnectionState::Disconnected,
            None => ConnectionState::Idle,
        }
    }

    /// Receiver for connection state changes while started.
    pub fn watch_connection(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.running.as_ref().map(|r| r.handle.watch_state())
    }

    pub fn live_reading(&self) -> LiveReading {
        self.store.live_reading()
    }

    /// Pressure trend, oldest to newest.
    pub fn pressure_snapshot(&self) -> Vec<PressurePoint> {
        self.store.pressure_snapshot()
    }

    pub fn stats(&self) -> IngestStats {
        self.store.stats()
    }
}

impl<C: Connector> Drop for MonitoringSession<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn ingest(
    controller: Arc<SubscriptionController>,
    store: Arc<TelemetryStore>,
    generation: Generation,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    while let Some(event) = events.recv().await {
        match controller.route(event) {
            Routed::State(state) => {
                debug!("Connection {}", state);
                store.mark_observed(generation);
            }
            Routed::Sample {
                sample,
                received_ms,
            } => {
                store.apply(generation, &sample, received_ms);
            }
            Routed::Empty => {
                debug!("Telemetry message carried no readings");
                store.record_empty(generation);
            }
            Routed::Undecodable(err) => {
                warn!("Discarding telemetry message: {}", err);
                store.record_decode_failure(generation);
            }
            Routed::Foreign(topic) => {
                debug!("Ignoring message on '{}'", topic);
                store.record_ignored(generation);
            }
            Routed::Detached => break,
        }
    }
}
