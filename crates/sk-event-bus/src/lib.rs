//! Event bus with typed pub/sub for the script engine
//!
//! The host fires events onto the bus; the script engine subscribes to
//! every event and runs the triggers registered for its descriptor.
//! Events can also arrive as JSON lines, see [`EventEnvelope`].

use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sk_core::{Context, Event, EventPayload, EventType};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Buffered events per channel before slow receivers start lagging
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("invalid event line: {0}")]
    InvalidLine(#[from] serde_json::Error),

    #[error("event line has an empty event type")]
    EmptyEventType,
}

pub type EventBusResult<T> = Result<T, EventBusError>;

/// Broadcast channels keyed by descriptor, plus one carrying every event
#[derive(Debug)]
pub struct EventBus {
    channels: DashMap<EventType, broadcast::Sender<Event>>,
    everything: broadcast::Sender<Event>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            everything: broadcast::channel(capacity).0,
            capacity,
        }
    }

    /// Receive events of one descriptor; `*` receives every event
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<Event> {
        let event_type = event_type.into();
        if event_type.is_any() {
            return self.subscribe_all();
        }
        trace!(event_type = %event_type, "New subscription");
        self.channels
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.everything.subscribe()
    }

    /// Receive the events whose payload decodes as `T`
    pub fn subscribe_to<T: EventPayload>(&self) -> Subscription<T> {
        Subscription {
            receiver: self.subscribe(T::EVENT_TYPE),
            _payload: PhantomData,
        }
    }

    /// Deliver `event`; returns how many receivers got it
    pub fn fire(&self, event: Event) -> usize {
        let mut delivered = 0;
        if let Some(channel) = self.channels.get(&event.event_type) {
            delivered += channel.send(event.clone()).unwrap_or(0);
        }
        let event_type = event.event_type.clone();
        delivered += self.everything.send(event).unwrap_or(0);
        debug!(event_type = %event_type, delivered, "Fired event");
        delivered
    }

    pub fn fire_payload<T: EventPayload>(&self, data: T, context: Context) -> usize {
        self.fire(Event::typed(data, context).into_untyped())
    }

    /// Descriptors with a dedicated channel
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Drop the channels nobody listens to any more
    pub fn prune(&self) -> usize {
        let before = self.channels.len();
        self.channels.retain(|_, channel| channel.receiver_count() > 0);
        before - self.channels.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed view of one descriptor's channel
pub struct Subscription<T> {
    receiver: broadcast::Receiver<Event>,
    _payload: PhantomData<T>,
}

impl<T: EventPayload> Subscription<T> {
    /// Next event whose payload decodes; others are skipped
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match event.decode::<T>() {
                Some(typed) => return Ok(typed),
                None => trace!(event_type = %event.event_type, "Skipping undecodable payload"),
            }
        }
    }
}

pub type SharedEventBus = Arc<EventBus>;

/// An event as delivered by an external source
///
/// ```json
/// {"event": "join", "data": {"player": "alex"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Decode one JSON line
    pub fn parse_line(line: &str) -> EventBusResult<Self> {
        let envelope: EventEnvelope = serde_json::from_str(line.trim())?;
        if envelope.event.trim().is_empty() {
            return Err(EventBusError::EmptyEventType);
        }
        Ok(envelope)
    }

    pub fn into_event(self, context: Context) -> Event {
        Event::new(self.event, self.data, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sk_core::events::ScriptLoadData;

    #[tokio::test]
    async fn test_subscribe_and_fire() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("join");

        bus.fire(Event::new("join", json!({"player": "alex"}), Context::new()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type.as_str(), "join");
        assert_eq!(received.data["player"], "alex");
    }

    #[tokio::test]
    async fn test_subscribe_all_sees_every_descriptor() {
        let bus = EventBus::new();
        let mut everything = bus.subscribe("*");

        bus.fire(Event::new("join", json!({}), Context::new()));
        bus.fire(Event::new("quit", json!({}), Context::new()));

        assert_eq!(everything.recv().await.unwrap().event_type.as_str(), "join");
        assert_eq!(everything.recv().await.unwrap().event_type.as_str(), "quit");
        assert_eq!(bus.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_typed_subscription() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_to::<ScriptLoadData>();

        bus.fire(Event::new("script_load", json!({"unexpected": true}), Context::new()));
        let delivered = bus.fire_payload(
            ScriptLoadData {
                script: "greet.sk".to_string(),
                triggers: 2,
            },
            Context::engine(),
        );
        assert_eq!(delivered, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.data.script, "greet.sk");
        assert_eq!(received.data.triggers, 2);
    }

    #[tokio::test]
    async fn test_descriptors_do_not_leak() {
        let bus = EventBus::new();
        let mut joins = bus.subscribe("join");
        let mut chats = bus.subscribe("Chat");

        bus.fire(Event::new("JOIN", json!({"player": "alex"}), Context::new()));

        assert_eq!(joins.recv().await.unwrap().data["player"], "alex");
        assert!(chats.try_recv().is_err());
        assert_eq!(bus.channel_count(), 2);
    }

    #[test]
    fn test_prune_drops_unused_channels() {
        let bus = EventBus::new();
        let kept = bus.subscribe("join");
        drop(bus.subscribe("quit"));

        assert_eq!(bus.prune(), 1);
        assert_eq!(bus.channel_count(), 1);
        assert_eq!(bus.fire(Event::new("join", json!({}), Context::new())), 1);
        drop(kept);
    }

    #[test]
    fn test_slow_subscriber_lags() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe_all();
        for i in 0..4 {
            bus.fire(Event::new("count", json!({ "i": i }), Context::new()));
        }

        tokio_test::block_on(async {
            assert!(matches!(
                rx.recv().await,
                Err(broadcast::error::RecvError::Lagged(2))
            ));
            assert_eq!(rx.recv().await.unwrap().data["i"], 2);
        });
    }

    #[test]
    fn test_envelope_parse_line() {
        let envelope = EventEnvelope::parse_line(r#"{"event": "Join", "data": {"player": "alex"}}"#)
            .unwrap();
        let event = envelope.into_event(Context::new());
        assert_eq!(event.event_type, EventType::new("join"));
        assert_eq!(event.field("player"), Some(&json!("alex")));

        let bare = EventEnvelope::parse_line(r#"{"event": "tick"}"#).unwrap();
        assert_eq!(bare.data, serde_json::Value::Null);

        assert!(matches!(
            EventEnvelope::parse_line(r#"{"event": " "}"#),
            Err(EventBusError::EmptyEventType)
        ));
        assert!(matches!(
            EventEnvelope::parse_line("not json"),
            Err(EventBusError::InvalidLine(_))
        ));
    }
}
