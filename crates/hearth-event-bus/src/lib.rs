//! Event bus with typed pub/sub for the hearth rule engine
//!
//! The EventBus is the broker between the host platform and the rule
//! engine: the platform publishes item state, command, and thing status
//! events, and trigger evaluation subscribes to them. Multiple worker
//! tasks may publish concurrently; delivery order is preserved per
//! subscriber channel.

use dashmap::DashMap;
use hearth_core::{Context, Event, EventData, EventType};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for event subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// The event bus for publishing and subscribing to events
///
/// Supports subscriptions to a specific event type, to all events, and
/// typed subscriptions that deserialize payloads on receipt.
pub struct EventBus {
    /// Map of event types to their broadcast senders
    channels: DashMap<EventType, broadcast::Sender<Event<serde_json::Value>>>,
    /// Sender for match-all subscribers
    match_all_sender: broadcast::Sender<Event<serde_json::Value>>,
    /// Channel capacity
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        Self {
            channels: DashMap::new(),
            match_all_sender,
            capacity,
        }
    }

    /// Subscribe to events of a specific type
    pub fn subscribe(
        &self,
        event_type: impl Into<EventType>,
    ) -> broadcast::Receiver<Event<serde_json::Value>> {
        let event_type = event_type.into();
        trace!(event_type = %event_type, "Subscribing to event type");

        if event_type.is_match_all() {
            return self.match_all_sender.subscribe();
        }

        self.channels
            .entry(event_type)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to a typed event, deserializing payloads on receipt
    pub fn subscribe_typed<T: EventData + serde::de::DeserializeOwned>(
        &self,
    ) -> TypedEventReceiver<T> {
        TypedEventReceiver::new(self.subscribe(T::event_type()))
    }

    /// Subscribe to all events
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event<serde_json::Value>> {
        self.match_all_sender.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Delivered to subscribers of the specific event type and to all
    /// match-all subscribers. Send errors mean no active receivers and
    /// are ignored.
    pub fn publish(&self, event: Event<serde_json::Value>) {
        debug!(event_type = %event.event_type, "Publishing event");

        if let Some(sender) = self.channels.get(&event.event_type) {
            let _ = sender.send(event.clone());
        }

        let _ = self.match_all_sender.send(event);
    }

    /// Publish a typed event payload
    pub fn publish_typed<T: EventData + serde::Serialize>(&self, data: T, context: Context) {
        let json_data = serde_json::to_value(&data).unwrap_or_default();
        self.publish(Event::new(T::event_type(), json_data, context));
    }

    /// Get the number of distinct event types with subscribers
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A receiver for typed events
///
/// Payloads that fail to deserialize are skipped rather than surfaced; a
/// malformed event on the bus cannot take down a subscriber.
pub struct TypedEventReceiver<T> {
    rx: broadcast::Receiver<Event<serde_json::Value>>,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: EventData + serde::de::DeserializeOwned> TypedEventReceiver<T> {
    fn new(rx: broadcast::Receiver<Event<serde_json::Value>>) -> Self {
        Self {
            rx,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Receive the next typed event
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if let Ok(data) = serde_json::from_value::<T>(event.data.clone()) {
                return Ok(Event {
                    event_type: event.event_type,
                    data,
                    time_fired: event.time_fired,
                    context: event.context,
                });
            }
            trace!(event_type = %event.event_type, "Skipping undeserializable payload");
        }
    }
}

/// Thread-safe shared handle to an EventBus
pub type SharedEventBus = Arc<EventBus>;
