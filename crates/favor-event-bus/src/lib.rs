//! Publish/subscribe of bafavorank events
//!
//! The state store fires `state_changed` on every sensor write and the
//! sensor writer fires `bafavorank_exp_updated` when a poll moves the
//! cumulative exp. The API's `/api/stream` route and the server's update log
//! are the listeners.

use dashmap::DashMap;
use favor_core::{Context, Event, EventData, EventType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// An event with its payload still as JSON
pub type RawEvent = Event<Value>;

/// Events a slow listener may fall behind by before it starts losing them
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub struct EventBus {
    /// One channel per event type, created on first subscription
    channels: DashMap<EventType, broadcast::Sender<RawEvent>>,
    /// Receives every event regardless of type
    everything: broadcast::Sender<RawEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (everything, _) = broadcast::channel(capacity);
        Self {
            channels: DashMap::new(),
            everything,
            capacity,
        }
    }

    /// Listen for one event type; `*` listens for all of them
    pub fn subscribe(&self, event_type: impl Into<EventType>) -> broadcast::Receiver<RawEvent> {
        let event_type = event_type.into();
        if event_type.is_match_all() {
            return self.subscribe_all();
        }

        trace!(%event_type, "New event listener");
        self.channels
            .entry(event_type)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<RawEvent> {
        self.everything.subscribe()
    }

    /// Listen for `T` events with the payload already decoded
    pub fn subscribe_typed<T>(&self) -> TypedReceiver<T>
    where
        T: EventData + DeserializeOwned,
    {
        TypedReceiver {
            inner: self.subscribe(T::event_type()),
            _data: PhantomData,
        }
    }

    pub fn fire(&self, event: RawEvent) {
        debug!(event_type = %event.event_type, "Firing event");

        // Sending only fails when nobody listens
        if let Some(channel) = self.channels.get(&event.event_type) {
            let _ = channel.send(event.clone());
        }
        let _ = self.everything.send(event);
    }

    pub fn fire_typed<T>(&self, data: T, context: Context)
    where
        T: EventData + Serialize,
    {
        match serde_json::to_value(&data) {
            Ok(value) => self.fire(Event::new(T::event_type(), value, context)),
            Err(e) => {
                warn!(event_type = T::event_type(), error = %e, "Event payload not serializable")
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver half of [`EventBus::subscribe_typed`]
pub struct TypedReceiver<T> {
    inner: broadcast::Receiver<RawEvent>,
    _data: PhantomData<fn() -> T>,
}

impl<T: EventData + DeserializeOwned> TypedReceiver<T> {
    /// Next event whose payload decodes as `T`
    ///
    /// Fails with `Lagged` when events were dropped and with `Closed` once
    /// the bus is gone.
    pub async fn recv(&mut self) -> Result<Event<T>, broadcast::error::RecvError> {
        loop {
            let event = self.inner.recv().await?;
            match serde_json::from_value::<T>(event.data.clone()) {
                Ok(data) => return Ok(event.map(|_| data)),
                Err(e) => trace!(event_type = %event.event_type, error = %e, "Skipping event"),
            }
        }
    }
}
