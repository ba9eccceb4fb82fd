//! Topic subscription and message routing for one connection.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use vitalwatch_types::{ConnectionState, TelemetrySample};

use crate::codec;
use crate::connection::{ConnectionEvent, ConnectionHandle, Registration};
use crate::error::DecodeError;
use crate::options::QoS;

/// What the controller made of one connection event.
#[derive(Debug)]
pub enum Routed {
    /// A connection state notice.
    State(ConnectionState),
    /// A decoded sample from the telemetry topic.
    Sample {
        sample: TelemetrySample,
        received_ms: u64,
    },
    /// A well-formed object on the telemetry topic with no usable reading.
    Empty,
    /// A message on the telemetry topic that could not be decoded.
    Undecodable(DecodeError),
    /// A message on some other topic.
    Foreign(String),
    /// The controller is detached; the event was dropped.
    Detached,
}

/// Subscribes to the telemetry topic whenever the connection comes up and
/// turns inbound messages into samples.
///
/// Holds the connection listener registration; [`detach`](Self::detach)
/// (or dropping the controller) releases it.
#[derive(Debug)]
pub struct SubscriptionController {
    handle: ConnectionHandle,
    topic: String,
    registration: Mutex<Option<Registration>>,
}

impl SubscriptionController {
    /// Register on `handle` and return the controller with its event stream.
    pub fn attach(
        handle: ConnectionHandle,
        topic: &str,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (registration, events) = handle.listen();
        debug!("Attached to connection {} for '{}'", handle.id(), topic);

        let controller = Arc::new(Self {
            handle,
            topic: topic.to_string(),
            registration: Mutex::new(Some(registration)),
        });
        (controller, events)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_attached(&self) -> bool {
        self.registration.lock().is_some()
    }

    /// Route one event.
    ///
    /// Every `Connected` notice issues a subscribe request, since each new
    /// link starts with a clean session.
    pub fn route(&self, event: ConnectionEvent) -> Routed {
        if !self.is_attached() {
            return Routed::Detached;
        }

        match event {
            ConnectionEvent::State(state) => {
                if state.is_connected() {
                    debug!("Subscribing to '{}'", self.topic);
                    self.handle.subscribe(&self.topic, QoS::AtMostOnce);
                }
                Routed::State(state)
            }
            ConnectionEvent::Message(message) => {
                if message.topic != self.topic {
                    return Routed::Foreign(message.topic);
                }
                match codec::decode(&message.payload) {
                    Ok(sample) => Routed::Sample {
                        sample,
                        received_ms: message.received_ms(),
                    },
                    Err(DecodeError::NoReadings) => Routed::Empty,
                    Err(err) => Routed::Undecodable(err),
                }
            }
        }
    }

    /// Unsubscribe and deregister. Idempotent.
    pub fn detach(&self) {
        let Some(registration) = self.registration.lock().take() else {
            return;
        };
        self.handle.unsubscribe(&self.topic);
        drop(registration);
        debug!("Detached from connection {}", self.handle.id());
    }
}

impl Drop for SubscriptionController {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::options::{Endpoint, SessionOptions};
    use crate::transport::{ChannelBroker, InboundMessage};
    use std::time::Duration;

    async fn connected(broker: &ChannelBroker) -> (ConnectionManager<ChannelBroker>, ConnectionHandle) {
        let mut manager = ConnectionManager::new(broker.clone());
        let endpoint = Endpoint::parse("mqtt://broker.test").unwrap();
        let handle = manager.connect(&endpoint, None, &SessionOptions::default());
        let mut state = handle.watch_state();
        state.wait_for(|s| s.is_connected()).await.unwrap();
        (manager, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn connected_notice_subscribes() {
        let broker = ChannelBroker::new();
        let (_manager, handle) = connected(&broker).await;

        let (controller, mut events) = SubscriptionController::attach(handle.clone(), "telemetry");
        assert_eq!(handle.listener_count(), 1);

        let event = events.recv().await.unwrap();
        assert!(matches!(
            controller.route(event),
            Routed::State(ConnectionState::Connected)
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(broker.subscribe_requests("telemetry"), 1);
        assert_eq!(broker.subscriber_count("telemetry"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn routes_messages_by_topic() {
        let broker = ChannelBroker::new();
        let (_manager, handle) = connected(&broker).await;
        let (controller, _events) = SubscriptionController::attach(handle, "telemetry");

        let sample = InboundMessage::new("telemetry", r#"{"bpm":64}"#);
        match controller.route(ConnectionEvent::Message(sample)) {
            Routed::Sample { sample, .. } => assert_eq!(sample.heart_rate_bpm, Some(64.0)),
            other => panic!("unexpected: {:?}", other),
        }

        let foreign = InboundMessage::new("alerts", r#"{"bpm":64}"#);
        assert!(matches!(
            controller.route(ConnectionEvent::Message(foreign)),
            Routed::Foreign(topic) if topic == "alerts"
        ));

        let wrong_type = InboundMessage::new("telemetry", r#"{"bpm":"fast"}"#);
        assert!(matches!(
            controller.route(ConnectionEvent::Message(wrong_type)),
            Routed::Empty
        ));

        let garbage = InboundMessage::new("telemetry", "{bpm:");
        assert!(matches!(
            controller.route(ConnectionEvent::Message(garbage)),
            Routed::Undecodable(DecodeError::Malformed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn detach_is_idempotent() {
        let broker = ChannelBroker::new();
        let (_manager, handle) = connected(&broker).await;
        let (controller, _events) = SubscriptionController::attach(handle.clone(), "telemetry");

        controller.detach();
        controller.detach();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!controller.is_attached());
        assert_eq!(handle.listener_count(), 0);
        assert_eq!(broker.unsubscribe_requests("telemetry"), 1);

        let late = InboundMessage::new("telemetry", r#"{"bpm":64}"#);
        assert!(matches!(
            controller.route(ConnectionEvent::Message(late)),
            Routed::Detached
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_controller_deregisters() {
        let broker = ChannelBroker::new();
        let (_manager, handle) = connected(&broker).await;
        let (controller, _events) = SubscriptionController::attach(handle.clone(), "telemetry");

        drop(controller);
        assert_eq!(handle.listener_count(), 0);
    }
}
