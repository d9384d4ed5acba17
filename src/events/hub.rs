//! # Event Distribution Hub
//!
//! Fans messages published on the shared bus out to every live subscriber of this process.
//!
//! ## Overview
//!
//! Publishers anywhere in the platform send `(event_type, payload)` to the channel
//! `<prefix>.<event_type>`. Each hub holds exactly one pattern subscription on `<prefix>.*`
//! and re-emits every message it receives as an [`EventFrame`] to its registered
//! [`EventSink`]s. Publishing never writes to sinks directly, so every instance of the
//! service sees the same events whichever instance produced them.
//!
//! ## Delivery rules
//!
//! - Delivery iterates over a snapshot of the subscriber set; registering or unregistering
//!   while a broadcast is in flight never corrupts it.
//! - A failing sink only loses that frame. It stays registered until it unregisters.
//! - When the subscription drops, the hub reconnects with exponential backoff (reset after a
//!   successful connect). Messages published while disconnected are lost.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use platform_monitor::config::HubConfig;
//! use platform_monitor::events::EventHub;
//! use platform_monitor::test_helpers::InMemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(InMemoryStore::new());
//! let (hub, _subscription) = EventHub::start(bus, HubConfig::default());
//! let (handle, mut frames) = hub.register_channel();
//!
//! hub.publish("status", r#"{"severity":0}"#).await?;
//! let frame = frames.recv().await;
//! hub.unregister(&handle);
//! # Ok(())
//! # }
//! ```

use dashmap::DashMap;
use futures::StreamExt;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::frame::EventFrame;
use super::sink::{ChannelSink, EventSink};
use crate::clients::{BusMessage, MessageBus};
use crate::config::HubConfig;
use crate::error::MonitorResult;
use crate::metrics;

/// Opaque token identifying one registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(Uuid);

impl SubscriberHandle {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Point-in-time hub counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    pub subscribers: usize,
    pub messages_received: u64,
    pub frames_delivered: u64,
    pub delivery_failures: u64,
    pub reconnects: u64,
    pub connected: bool,
}

#[derive(Debug, Default)]
struct HubCounters {
    messages_received: AtomicU64,
    frames_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    reconnects: AtomicU64,
}

pub struct EventHub {
    bus: Arc<dyn MessageBus>,
    config: HubConfig,
    subscribers: DashMap<Uuid, Arc<dyn EventSink>>,
    counters: HubCounters,
    connected: watch::Sender<bool>,
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("channel_prefix", &self.config.channel_prefix)
            .field("subscribers", &self.subscribers.len())
            .field("connected", &*self.connected.borrow())
            .finish()
    }
}

impl EventHub {
    /// Create a hub without starting its subscription
    pub fn new(bus: Arc<dyn MessageBus>, config: HubConfig) -> Arc<Self> {
        let (connected, _) = watch::channel(false);
        Arc::new(Self {
            bus,
            config,
            subscribers: DashMap::new(),
            counters: HubCounters::default(),
            connected,
        })
    }

    /// Create a hub and start its single pattern subscription in the background
    pub fn start(bus: Arc<dyn MessageBus>, config: HubConfig) -> (Arc<Self>, JoinHandle<()>) {
        let hub = Self::new(bus, config);
        let handle = Arc::clone(&hub).spawn();
        (hub, handle)
    }

    /// Run the subscription loop until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_subscription().await })
    }

    pub fn channel_prefix(&self) -> &str {
        &self.config.channel_prefix
    }

    pub fn channel_for(&self, event_type: &str) -> String {
        format!("{}.{}", self.config.channel_prefix, event_type)
    }

    pub fn pattern(&self) -> String {
        format!("{}.*", self.config.channel_prefix)
    }

    /// Event type carried by `channel`, if it belongs to this hub's prefix
    pub fn event_type_for<'a>(&self, channel: &'a str) -> Option<&'a str> {
        channel
            .strip_prefix(self.config.channel_prefix.as_str())?
            .strip_prefix('.')
            .filter(|event_type| !event_type.is_empty())
    }

    pub fn register(&self, sink: Arc<dyn EventSink>) -> SubscriberHandle {
        let handle = SubscriberHandle(Uuid::new_v4());
        self.subscribers.insert(handle.0, sink);
        debug!(subscriber = %handle, total = self.subscribers.len(), "Subscriber registered");
        handle
    }

    /// Register a bounded channel subscriber sized by `hub.subscriber_buffer`
    pub fn register_channel(&self) -> (SubscriberHandle, mpsc::Receiver<String>) {
        let (sink, receiver) = ChannelSink::channel(self.config.subscriber_buffer);
        (self.register(Arc::new(sink)), receiver)
    }

    /// Remove a subscriber; returns false when it was already gone
    pub fn unregister(&self, handle: &SubscriberHandle) -> bool {
        let removed = self.subscribers.remove(&handle.0).is_some();
        if removed {
            debug!(subscriber = %handle, total = self.subscribers.len(), "Subscriber unregistered");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until the pattern subscription is live
    pub async fn ready(&self) {
        let mut connected = self.connected.subscribe();
        // the sender lives as long as the hub, so this only returns once connected
        let _ = connected.wait_for(|is_connected| *is_connected).await;
    }

    /// Publish to the bus; delivery to local sinks happens when the message comes back
    pub async fn publish(&self, event_type: &str, payload: &str) -> MonitorResult<()> {
        let channel = self.channel_for(event_type);
        self.bus.publish(&channel, payload).await
    }

    /// Write one frame to every subscriber registered at the time of the call
    ///
    /// Returns the number of subscribers that accepted the frame.
    pub async fn broadcast(&self, frame: &EventFrame) -> usize {
        let targets: Vec<(Uuid, Arc<dyn EventSink>)> = self
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut delivered = 0;
        for (id, sink) in targets {
            match sink.send(frame).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        subscriber = %id,
                        event_type = frame.event_type(),
                        error = %e,
                        "Failed to deliver frame to subscriber"
                    );
                }
            }
        }

        self.counters
            .frames_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        metrics::hub_frames_delivered_total().add(delivered as u64, &[]);
        delivered
    }

    async fn dispatch(&self, message: BusMessage) {
        self.counters.messages_received.fetch_add(1, Ordering::Relaxed);
        let Some(event_type) = self.event_type_for(&message.channel) else {
            debug!(channel = %message.channel, "Ignoring message outside the hub prefix");
            return;
        };
        let frame = EventFrame::new(event_type, message.payload);
        self.broadcast(&frame).await;
    }

    async fn run_subscription(&self) {
        let pattern = self.pattern();
        let mut backoff = self.config.initial_backoff();

        loop {
            match self.bus.psubscribe(&pattern).await {
                Ok(mut stream) => {
                    info!(pattern = %pattern, "Event hub subscribed");
                    self.connected.send_replace(true);
                    backoff = self.config.initial_backoff();

                    while let Some(message) = stream.next().await {
                        self.dispatch(message).await;
                    }

                    self.connected.send_replace(false);
                    warn!(pattern = %pattern, "Event hub subscription ended");
                }
                Err(e) => {
                    error!(pattern = %pattern, error = %e, "Event hub failed to subscribe");
                }
            }

            self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            debug!(backoff_ms = backoff.as_millis() as u64, "Event hub reconnecting");
            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff, self.config.max_backoff());
        }
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscribers.len(),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
            frames_delivered: self.counters.frames_delivered.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            reconnects: self.counters.reconnects.load(Ordering::Relaxed),
            connected: self.is_connected(),
        }
    }
}

/// Double the reconnect delay up to `max`
pub fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::test_helpers::{InMemoryStore, RecordingSink};

    fn hub() -> (Arc<EventHub>, Arc<InMemoryStore>) {
        let bus = Arc::new(InMemoryStore::new());
        (EventHub::new(bus.clone(), HubConfig::default()), bus)
    }

    #[test]
    fn test_channel_naming() {
        let (hub, _) = hub();
        assert_eq!(hub.channel_for("status"), "org.deltafi.ui.sse.status");
        assert_eq!(hub.pattern(), "org.deltafi.ui.sse.*");
        assert_eq!(hub.event_type_for("org.deltafi.ui.sse.errorCount"), Some("errorCount"));
        assert_eq!(hub.event_type_for("org.deltafi.ui.ssefoo"), None);
        assert_eq!(hub.event_type_for("org.deltafi.ui.sse."), None);
        assert_eq!(hub.event_type_for("other.status"), None);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let max = Duration::from_secs(30);
        assert_eq!(
            next_backoff(Duration::from_millis(500), max),
            Duration::from_secs(1)
        );
        assert_eq!(next_backoff(Duration::from_secs(20), max), max);
        assert_eq!(next_backoff(max, max), max);
    }

    #[tokio::test]
    async fn test_register_unregister_idempotent() {
        let (hub, _) = hub();
        let handle = hub.register(Arc::new(RecordingSink::new()));
        assert_eq!(hub.subscriber_count(), 1);
        assert!(hub.unregister(&handle));
        assert!(!hub.unregister(&handle));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let (hub, _) = hub();
        let healthy = Arc::new(RecordingSink::new());
        let broken = Arc::new(RecordingSink::failing(SinkError::Closed));
        hub.register(healthy.clone());
        hub.register(broken.clone());

        let delivered = hub.broadcast(&EventFrame::new("status", "{}")).await;

        assert_eq!(delivered, 1);
        assert_eq!(healthy.frames().len(), 1);
        // failed subscribers stay registered until they unregister themselves
        assert_eq!(hub.subscriber_count(), 2);
        assert_eq!(hub.stats().delivery_failures, 1);
    }

    #[tokio::test]
    async fn test_publish_goes_through_the_bus() {
        let (hub, bus) = hub();
        let sink = Arc::new(RecordingSink::new());
        hub.register(sink.clone());

        hub.publish("status", "{}").await.unwrap();

        assert_eq!(
            bus.published(),
            vec![BusMessage::new("org.deltafi.ui.sse.status", "{}")]
        );
        // nothing is delivered until the subscription loop receives the message
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn test_subscription_loop_delivers_frames() {
        let bus = Arc::new(InMemoryStore::new());
        let (hub, task) = EventHub::start(bus.clone(), HubConfig::default());
        let (_handle, mut frames) = hub.register_channel();
        hub.ready().await;

        hub.publish("errorCount", "3").await.unwrap();

        let frame = frames.recv().await.unwrap();
        assert_eq!(frame, "event: errorCount\ndata: 3\n\n");
        assert!(hub.is_connected());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_subscription_drops() {
        let bus = Arc::new(InMemoryStore::new());
        let (hub, task) = EventHub::start(bus.clone(), HubConfig::default());
        hub.ready().await;

        bus.disconnect_subscribers();
        tokio::time::sleep(Duration::from_secs(2)).await;
        hub.ready().await;

        assert_eq!(hub.stats().reconnects, 1);
        let (_handle, mut frames) = hub.register_channel();
        hub.publish("status", "{}").await.unwrap();
        assert_eq!(frames.recv().await.unwrap(), "event: status\ndata: {}\n\n");
        task.abort();
    }
}
