//! In-memory broker.
//!
//! Models just enough of a pub/sub broker to exercise the pipeline without a
//! network: per-link subscription sets, at-most-once delivery to subscribed
//! links, link drops and refused or stalled handshakes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connector, InboundMessage, LinkEvent, Transport};
use crate::error::TransportError;
use crate::options::{Credentials, Endpoint, QoS, SessionOptions};

/// An in-process broker that implements [`Connector`].
///
/// Clones share the same broker.
///
/// # Example
///
/// ```rust
/// use vitalwatch_core::ChannelBroker;
///
/// let broker = ChannelBroker::new();
/// // Nobody is subscribed yet, so nothing is delivered
/// assert_eq!(broker.publish("telemetry", r#"{"bpm":72}"#), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Debug, Default)]
struct BrokerState {
    next_link: u64,
    links: BTreeMap<u64, LinkSlot>,
    handshake: HandshakeMode,
    client_ids: Vec<String>,
    subscribe_requests: BTreeMap<String, usize>,
    unsubscribe_requests: BTreeMap<String, usize>,
}

#[derive(Debug)]
struct LinkSlot {
    tx: mpsc::UnboundedSender<LinkSignal>,
    subscriptions: BTreeSet<String>,
    established: bool,
}

#[derive(Debug)]
enum LinkSignal {
    Deliver(InboundMessage),
    Drop(String),
}

#[derive(Debug, Clone, Default)]
enum HandshakeMode {
    #[default]
    Accept,
    Reject(String),
    Stall,
}

impl ChannelBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a message.
    ///
    /// Returns the number of links it was delivered to.
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let state = self.state.lock();

        let mut delivered = 0;
        for link in state.links.values() {
            if !link.established || !link.subscriptions.contains(topic) {
                continue;
            }
            let message = InboundMessage::new(topic, payload.clone());
            if link.tx.send(LinkSignal::Deliver(message)).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Drop every open link, as if the network went away.
    pub fn drop_links(&self) {
        let mut state = self.state.lock();
        for (_, link) in std::mem::take(&mut state.links) {
            let _ = link.tx.send(LinkSignal::Drop("link dropped by broker".to_string()));
        }
    }

    /// Refuse subsequent handshakes with the given reason.
    pub fn refuse_handshakes(&self, reason: impl Into<String>) {
        self.state.lock().handshake = HandshakeMode::Reject(reason.into());
    }

    /// Never complete subsequent handshakes.
    pub fn stall_handshakes(&self) {
        self.state.lock().handshake = HandshakeMode::Stall;
    }

    /// Accept subsequent handshakes (the default).
    pub fn accept_handshakes(&self) {
        self.state.lock().handshake = HandshakeMode::Accept;
    }

    /// Total subscribe requests seen for `topic`.
    pub fn subscribe_requests(&self, topic: &str) -> usize {
        self.state.lock().subscribe_requests.get(topic).copied().unwrap_or(0)
    }

    /// Total unsubscribe requests seen for `topic`.
    pub fn unsubscribe_requests(&self, topic: &str) -> usize {
        self.state.lock().unsubscribe_requests.get(topic).copied().unwrap_or(0)
    }

    /// Number of open links currently subscribed to `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .lock()
            .links
            .values()
            .filter(|link| link.subscriptions.contains(topic))
            .count()
    }

    /// Number of links currently open.
    pub fn open_links(&self) -> usize {
        self.state.lock().links.len()
    }

    /// Client ids of every link ever opened, in order.
    pub fn client_ids(&self) -> Vec<String> {
        self.state.lock().client_ids.clone()
    }

    /// Number of links ever opened.
    pub fn connections_opened(&self) -> usize {
        self.state.lock().client_ids.len()
    }

    fn remove_link(&self, id: u64) {
        self.state.lock().links.remove(&id);
    }
}

impl Connector for ChannelBroker {
    type Transport = ChannelTransport;

    fn open(
        &self,
        _endpoint: &Endpoint,
        _credentials: Option<&Credentials>,
        _options: &SessionOptions,
        client_id: &str,
    ) -> Result<ChannelTransport, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        state.next_link += 1;
        let id = state.next_link;
        state.links.insert(
            id,
            LinkSlot {
                tx,
                subscriptions: BTreeSet::new(),
                established: false,
            },
        );
        state.client_ids.push(client_id.to_string());

        Ok(ChannelTransport {
            broker: self.clone(),
            id,
            rx,
        })
    }
}

/// A link to a [`ChannelBroker`].
#[derive(Debug)]
pub struct ChannelTransport {
    broker: ChannelBroker,
    id: u64,
    rx: mpsc::UnboundedReceiver<LinkSignal>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn handshake(&mut self) -> Result<(), TransportError> {
        let mode = self.broker.state.lock().handshake.clone();
        match mode {
            HandshakeMode::Accept => {
                let mut state = self.broker.state.lock();
                match state.links.get_mut(&self.id) {
                    Some(link) => {
                        link.established = true;
                        Ok(())
                    }
                    None => Err(TransportError::Dropped("link closed during handshake".to_string())),
                }
            }
            HandshakeMode::Reject(reason) => Err(TransportError::Rejected(reason)),
            HandshakeMode::Stall => std::future::pending().await,
        }
    }

    async fn next_event(&mut self) -> Result<LinkEvent, TransportError> {
        match self.rx.recv().await {
            Some(LinkSignal::Deliver(message)) => Ok(LinkEvent::Message(message)),
            Some(LinkSignal::Drop(reason)) => Err(TransportError::Dropped(reason)),
            None => Err(TransportError::Dropped("broker closed the link".to_string())),
        }
    }

    async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), TransportError> {
        let mut state = self.broker.state.lock();
        *state.subscribe_requests.entry(topic.to_string()).or_default() += 1;
        match state.links.get_mut(&self.id) {
            Some(link) => {
                link.subscriptions.insert(topic.to_string());
                Ok(())
            }
            None => Err(TransportError::Request("link is closed".to_string())),
        }
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let mut state = self.broker.state.lock();
        *state.unsubscribe_requests.entry(topic.to_string()).or_default() += 1;
        if let Some(link) = state.links.get_mut(&self.id) {
            link.subscriptions.remove(topic);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.broker.remove_link(self.id);
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.broker.remove_link(self.id);
    }
}
