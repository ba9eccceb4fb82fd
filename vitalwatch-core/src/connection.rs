//! Connection manager: owns the single broker connection of a session.
//!
//! Each connection is driven by one background task that performs the
//! handshake, pumps inbound events, executes subscribe/unsubscribe commands
//! and retries on a flat interval when the link goes away.
//!
//! ```text
//!   Idle ──▶ Connecting ──▶ Connected ──(drop)──▶ Reconnecting ──▶ Connected
//!               │                                     │
//!               └──(timeout / refused)──▶ Failed ◀────┘
//!                                           │ retry after reconnect_period
//!                                           ▼
//!                                      Reconnecting
//!
//!   any state ──(close)──▶ Disconnected
//! ```
//!
//! Observers get the current state through a `watch` channel (single
//! current value) and ordered [`ConnectionEvent`]s through
//! [`ConnectionHandle::listen`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use vitalwatch_types::ConnectionState;

use crate::error::TransportError;
use crate::options::{Credentials, Endpoint, QoS, SessionOptions};
use crate::transport::{Connector, InboundMessage, LinkEvent, Transport};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// An event delivered to connection listeners, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection moved to a new state.
    State(ConnectionState),
    /// A message arrived on a subscribed topic.
    Message(InboundMessage),
}

#[derive(Debug)]
enum Command {
    Subscribe { topic: String, qos: QoS },
    Unsubscribe(String),
    Close,
}

/// Owns at most one live connection and hands out handles to it.
///
/// # Example
///
/// ```rust
/// use vitalwatch_core::{ChannelBroker, ConnectionManager, Endpoint, SessionOptions};
///
/// # tokio_test::block_on(async {
/// let mut manager = ConnectionManager::new(ChannelBroker::new());
/// let endpoint = Endpoint::parse("wss://broker.example.com:8884/mqtt").unwrap();
///
/// let handle = manager.connect(&endpoint, None, &SessionOptions::default());
/// let again = manager.connect(&endpoint, None, &SessionOptions::default());
/// assert_eq!(handle.id(), again.id());
///
/// manager.disconnect(&handle);
/// manager.disconnect(&handle); // no-op
/// # });
/// ```
pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    active: Option<ConnectionHandle>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            active: None,
        }
    }

    /// The connector used to open links.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a connection, or return the one already open.
    ///
    /// Never fails synchronously: handshake problems surface as state
    /// transitions on the returned handle. Must be called from within a
    /// Tokio runtime.
    pub fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: Option<&Credentials>,
        options: &SessionOptions,
    ) -> ConnectionHandle {
        if let Some(handle) = &self.active {
            if !handle.is_closed() {
                debug!("Reusing connection {} to {}", handle.id(), endpoint);
                return handle.clone();
            }
        }

        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            id,
            state_tx,
            listeners: Mutex::new(Listeners::default()),
            closed: AtomicBool::new(false),
        });
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        info!("Connection {} connecting to {}", id, endpoint);
        let driver = Driver {
            connector: self.connector.clone(),
            endpoint: endpoint.clone(),
            credentials: credentials.cloned(),
            options: options.clone(),
            shared: shared.clone(),
            commands: commands_rx,
        };
        tokio::spawn(driver.run());

        let handle = ConnectionHandle {
            shared,
            commands: commands_tx,
        };
        self.active = Some(handle.clone());
        handle
    }

    /// Close a connection. Closing an already-closed handle is a no-op.
    pub fn disconnect(&mut self, handle: &ConnectionHandle) {
        handle.close();
        if self.active.as_ref().map(|a| a.id()) == Some(handle.id()) {
            self.active = None;
        }
    }

    /// The open connection, if any.
    pub fn active(&self) -> Option<&ConnectionHandle> {
        self.active.as_ref()
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.close();
        }
    }
}

impl<C: Connector> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("active", &self.active)
            .finish()
    }
}

/// Cheap, cloneable reference to one connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl ConnectionHandle {
    /// Process-unique id of this connection.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Receiver that always holds the current state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Register a listener.
    ///
    /// The receiver first yields the current state, then every later state
    /// change and inbound message in order. The listener stays registered
    /// until the returned [`Registration`] is dropped or the connection is
    /// closed.
    pub fn listen(&self) -> (Registration, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.shared.listeners.lock();
        listeners.next_id += 1;
        let id = listeners.next_id;

        let _ = tx.send(ConnectionEvent::State(self.state()));
        if !self.is_closed() {
            listeners.senders.insert(id, tx);
        }

        let registration = Registration {
            id,
            shared: Arc::downgrade(&self.shared),
        };
        (registration, rx)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().senders.len()
    }

    /// Ask the driver to subscribe to `topic`.
    ///
    /// Returns false if the connection is closed. Requests that reach the
    /// driver while no link is established are discarded.
    pub fn subscribe(&self, topic: &str, qos: QoS) -> bool {
        self.send(Command::Subscribe {
            topic: topic.to_string(),
            qos,
        })
    }

    /// Ask the driver to unsubscribe from `topic`.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        self.send(Command::Unsubscribe(topic.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Close the connection and release every listener. Idempotent.
    pub fn close(&self) {
        {
            let mut listeners = self.shared.listeners.lock();
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.shared.state_tx.send_replace(ConnectionState::Disconnected);
            listeners.broadcast(ConnectionEvent::State(ConnectionState::Disconnected));
            listeners.senders.clear();
        }

        let _ = self.commands.send(Command::Close);
        info!("Connection {} closed", self.shared.id);
    }

    fn send(&self, command: Command) -> bool {
        if self.is_closed() {
            return false;
        }
        self.commands.send(command).is_ok()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Keeps a listener registered; dropping it deregisters the listener.
#[derive(Debug)]
pub struct Registration {
    id: u64,
    shared: Weak<Shared>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.listeners.lock().senders.remove(&self.id);
        }
    }
}

#[derive(Debug)]
struct Shared {
    id: u64,
    state_tx: watch::Sender<ConnectionState>,
    listeners: Mutex<Listeners>,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct Listeners {
    next_id: u64,
    senders: BTreeMap<u64, mpsc::UnboundedSender<ConnectionEvent>>,
}

impl Listeners {
    fn broadcast(&mut self, event: ConnectionEvent) {
        self.senders.retain(|_, tx| tx.send(event.clone()).is_ok());
    }
}

impl Shared {
    /// Publish a state change. Ignored once the connection is closed.
    fn transition(&self, state: ConnectionState) {
        let mut listeners = self.listeners.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let changed = self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!("Connection {} is now {}", self.id, state);
            listeners.broadcast(ConnectionEvent::State(state));
        }
    }

    fn dispatch(&self, message: InboundMessage) {
        let mut listeners = self.listeners.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        listeners.broadcast(ConnectionEvent::Message(message));
    }
}

enum Attempt {
    /// The owner closed the connection.
    Closed,
    /// An established link went away.
    Dropped(TransportError),
    /// The link could not be established.
    Failed(TransportError),
}

struct Driver<C: Connector> {
    connector: Arc<C>,
    endpoint: Endpoint,
    credentials: Option<Credentials>,
    options: SessionOptions,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                self.shared.transition(ConnectionState::Reconnecting);
            }

            let client_id = self.options.client_id();
            debug!(
                "Connection {} attempt {} to {} as {}",
                self.shared.id, attempt, self.endpoint, client_id
            );

            match self.attempt(&client_id).await {
                Attempt::Closed => break,
                Attempt::Dropped(err) => {
                    warn!("Connection {} to {} dropped: {}", self.shared.id, self.endpoint, err);
                    self.shared.transition(ConnectionState::Reconnecting);
                }
                Attempt::Failed(err) => {
                    warn!("Connection {} to {} failed: {}", self.shared.id, self.endpoint, err);
                    self.shared.transition(ConnectionState::Failed);
                    if !err.is_recoverable() {
                        self.wait_for_close().await;
                        break;
                    }
                }
            }

            if !self.pause(self.options.reconnect_period).await {
                break;
            }
        }

        debug!("Connection {} driver stopped", self.shared.id);
    }

    async fn attempt(&mut self, client_id: &str) -> Attempt {
        let mut transport = match self.connector.open(
            &self.endpoint,
            self.credentials.as_ref(),
            &self.options,
            client_id,
        ) {
            Ok(transport) => transport,
            Err(err) => return Attempt::Failed(err),
        };

        let outcome = {
            let handshake = tokio::time::timeout(self.options.connect_timeout, transport.handshake());
            tokio::pin!(handshake);
            loop {
                tokio::select! {
                    biased;
                    command = self.commands.recv() => match command {
                        Some(Command::Close) | None => return Attempt::Closed,
                        Some(other) => debug!("Discarding {:?} during handshake", other),
                    },
                    result = &mut handshake => break result,
                }
            }
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Attempt::Failed(err),
            Err(_) => return Attempt::Failed(TransportError::Timeout),
        }

        info!("Connection {} established to {} as {}", self.shared.id, self.endpoint, client_id);
        self.shared.transition(ConnectionState::Connected);
        self.pump(&mut transport).await
    }

    async fn pump(&mut self, transport: &mut C::Transport) -> Attempt {
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Subscribe { topic, qos }) => {
                        match transport.subscribe(&topic, qos).await {
                            Ok(()) => debug!("Connection {} subscribed to {}", self.shared.id, topic),
                            Err(err) => warn!("Subscribe to {} failed: {}", topic, err),
                        }
                    }
                    Some(Command::Unsubscribe(topic)) => {
                        match transport.unsubscribe(&topic).await {
                            Ok(()) => debug!("Connection {} unsubscribed from {}", self.shared.id, topic),
                            Err(err) => warn!("Unsubscribe from {} failed: {}", topic, err),
                        }
                    }
                    Some(Command::Close) | None => {
                        transport.close().await;
                        return Attempt::Closed;
                    }
                },
                event = transport.next_event() => match event {
                    Ok(LinkEvent::Message(message)) => self.shared.dispatch(message),
                    Ok(LinkEvent::Ignored) => {}
                    Err(err) => return Attempt::Dropped(err),
                },
            }
        }
    }

    /// Sleep for `period`, returning false if the connection is closed meanwhile.
    async fn pause(&mut self, period: Duration) -> bool {
        let sleep = tokio::time::sleep(period);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Close) | None => return false,
                    Some(other) => debug!("Discarding {:?} while disconnected", other),
                },
                _ = &mut sleep => return true,
            }
        }
    }

    async fn wait_for_close(&mut self) {
        while let Some(command) = self.commands.recv().await {
            if matches!(command, Command::Close) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EndpointError;
    use crate::transport::{ChannelBroker, ChannelTransport};
    use std::sync::atomic::AtomicUsize;

    fn endpoint() -> Endpoint {
        Endpoint::parse("wss://broker.test:8884/mqtt").unwrap()
    }

    async fn wait_for_state(handle: &ConnectionHandle, state: ConnectionState) {
        let mut rx = handle.watch_state();
        tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == state))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reaches_connected() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker.clone());

        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());
        assert_eq!(handle.state(), ConnectionState::Connecting);

        wait_for_state(&handle, ConnectionState::Connected).await;
        assert_eq!(broker.connections_opened(), 1);
        assert!(broker.client_ids()[0].starts_with("web-"));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_reuses_open_connection() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker.clone());

        let first = manager.connect(&endpoint(), None, &SessionOptions::default());
        let second = manager.connect(&endpoint(), None, &SessionOptions::default());
        wait_for_state(&first, ConnectionState::Connected).await;

        assert_eq!(first.id(), second.id());
        assert_eq!(broker.connections_opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_after_disconnect_opens_new_connection() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker.clone());

        let first = manager.connect(&endpoint(), None, &SessionOptions::default());
        manager.disconnect(&first);
        let second = manager.connect(&endpoint(), None, &SessionOptions::default());

        assert_ne!(first.id(), second.id());
        assert!(manager.active().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker.clone());
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());
        wait_for_state(&handle, ConnectionState::Connected).await;
        let (_registration, _events) = handle.listen();
        assert_eq!(handle.listener_count(), 1);

        manager.disconnect(&handle);
        manager.disconnect(&handle);
        handle.close();

        assert!(handle.is_closed());
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(handle.listener_count(), 0);
        assert!(manager.active().is_none());
        assert!(!handle.subscribe("telemetry", QoS::AtMostOnce));

        // Driver tears the link down
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(broker.open_links(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn listener_sees_current_state_then_changes() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker.clone());
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());

        let (_registration, mut events) = handle.listen();
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::State(ConnectionState::Connecting))
        );
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::State(ConnectionState::Connected))
        );

        manager.disconnect(&handle);
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::State(ConnectionState::Disconnected))
        );
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_registration_deregisters() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker);
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());

        let (first, _rx1) = handle.listen();
        let (second, _rx2) = handle.listen();
        assert_eq!(handle.listener_count(), 2);

        drop(first);
        assert_eq!(handle.listener_count(), 1);
        drop(second);
        assert_eq!(handle.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn messages_reach_listeners_after_subscribe() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker.clone());
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());
        wait_for_state(&handle, ConnectionState::Connected).await;

        let (_registration, mut events) = handle.listen();
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::State(ConnectionState::Connected))
        );

        assert!(handle.subscribe("telemetry", QoS::AtMostOnce));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(broker.subscriber_count("telemetry"), 1);

        broker.publish("telemetry", r#"{"bpm":72}"#);
        match events.recv().await {
            Some(ConnectionEvent::Message(message)) => {
                assert_eq!(message.topic, "telemetry");
                assert_eq!(&message.payload[..], br#"{"bpm":72}"#);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_timeout_fails_then_retries_with_fresh_client_id() {
        let broker = ChannelBroker::new();
        broker.stall_handshakes();
        let mut manager = ConnectionManager::new(broker.clone());
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());

        let started = tokio::time::Instant::now();
        wait_for_state(&handle, ConnectionState::Failed).await;
        assert!(started.elapsed() >= Duration::from_millis(5000));

        broker.accept_handshakes();
        wait_for_state(&handle, ConnectionState::Connected).await;

        let ids = broker.client_ids();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_handshake_is_retried_on_flat_interval() {
        let broker = ChannelBroker::new();
        broker.refuse_handshakes("bad credentials");
        let mut manager = ConnectionManager::new(broker.clone());
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());

        wait_for_state(&handle, ConnectionState::Failed).await;
        tokio::time::sleep(Duration::from_millis(2000 * 3 + 100)).await;

        // First attempt plus one per reconnect period, no backoff growth
        assert_eq!(broker.connections_opened(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_link_reconnects() {
        let broker = ChannelBroker::new();
        let mut manager = ConnectionManager::new(broker.clone());
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());
        wait_for_state(&handle, ConnectionState::Connected).await;

        broker.drop_links();
        wait_for_state(&handle, ConnectionState::Reconnecting).await;

        let dropped_at = tokio::time::Instant::now();
        wait_for_state(&handle, ConnectionState::Connected).await;
        assert!(dropped_at.elapsed() >= Duration::from_millis(2000));
        assert_eq!(broker.connections_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_while_disconnected_is_discarded() {
        let broker = ChannelBroker::new();
        broker.stall_handshakes();
        let mut manager = ConnectionManager::new(broker.clone());
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());

        assert!(handle.subscribe("telemetry", QoS::AtMostOnce));
        broker.accept_handshakes();
        wait_for_state(&handle, ConnectionState::Connected).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(broker.subscribe_requests("telemetry"), 0);
    }

    struct BrokenConnector {
        attempts: AtomicUsize,
    }

    impl Connector for BrokenConnector {
        type Transport = ChannelTransport;

        fn open(
            &self,
            endpoint: &Endpoint,
            _credentials: Option<&Credentials>,
            _options: &SessionOptions,
            _client_id: &str,
        ) -> Result<ChannelTransport, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(EndpointError::UnsupportedScheme(endpoint.scheme().as_str().to_string()).into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_error_is_terminal_until_disconnect() {
        let mut manager = ConnectionManager::new(BrokenConnector {
            attempts: AtomicUsize::new(0),
        });
        let handle = manager.connect(&endpoint(), None, &SessionOptions::default());

        wait_for_state(&handle, ConnectionState::Failed).await;
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(handle.state(), ConnectionState::Failed);
        assert_eq!(manager.connector().attempts.load(Ordering::SeqCst), 1);

        manager.disconnect(&handle);
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }
}
