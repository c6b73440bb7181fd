//! Channel-keyed event bus built on tokio broadcast channels

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, warn};

use crate::types::EventEnvelope;

/// Capacity of each channel's broadcast buffer
pub const DEFAULT_CAPACITY: usize = 1000;

type Channels = HashMap<String, broadcast::Sender<EventEnvelope>>;

/// Event bus for publishing and subscribing to named channels.
///
/// Delivery is ordered per channel. Nothing is buffered for late
/// subscribers: a subscription only sees events published after it was
/// created.
#[derive(Clone)]
pub struct EventBus {
    channels: Arc<RwLock<Channels>>,
    capacity: usize,
    /// Number of events published (for monitoring)
    event_count: Arc<AtomicUsize>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with the given per-channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
            event_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Publish an envelope on its channel.
    ///
    /// Returns the number of subscribers that received it. With no
    /// subscriber the event is dropped and 0 is returned.
    pub fn publish(&self, envelope: EventEnvelope) -> usize {
        self.event_count.fetch_add(1, Ordering::Relaxed);
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        match channels.get(&envelope.channel) {
            Some(sender) => sender.send(envelope).unwrap_or(0),
            None => 0,
        }
    }

    /// Publish a raw payload on `channel`.
    pub fn publish_to(&self, channel: &str, payload: serde_json::Value) -> usize {
        self.publish(EventEnvelope::new(channel, payload))
    }

    /// Subscribe to `channel`.
    ///
    /// The subscription is live as soon as this returns, so an event
    /// published right after the call is never lost.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let receiver = {
            let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        debug!(channel = %channel, "Channel subscribed");

        Subscription {
            channel: channel.to_string(),
            receiver: Some(receiver),
            bus: self.clone(),
        }
    }

    /// Get the number of live subscriptions on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Get the number of channels with at least one subscription
    pub fn channel_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get the total number of events published
    pub fn event_count(&self) -> usize {
        self.event_count.load(Ordering::Relaxed)
    }

    /// Forget `channel` once its last subscription is gone.
    fn release(&self, channel: &str) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if channels
            .get(channel)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(channel);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channel_count", &self.channel_count())
            .field("event_count", &self.event_count())
            .finish()
    }
}

/// A live subscription to one channel.
///
/// Dropping it unsubscribes. [`Subscription::unsubscribe`] does the same
/// eagerly and may be called any number of times.
pub struct Subscription {
    channel: String,
    receiver: Option<broadcast::Receiver<EventEnvelope>>,
    bus: EventBus,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Wait for the next event. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "Subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving events. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            drop(receiver);
            self.bus.release(&self.channel);
            debug!(channel = %self.channel, "Channel unsubscribed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}
