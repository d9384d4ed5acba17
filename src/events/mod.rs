//! # Event Distribution
//!
//! The hub that relays bus messages to live subscribers, the frame format they receive,
//! and the publishers that feed it (notifications and periodic counters).

pub mod counters;
pub mod frame;
pub mod hub;
pub mod notifications;
pub mod sink;

pub use counters::{
    CounterPublisher, CounterSource, DeltaFileStatsSource, ErrorCountSource,
    NotificationCountSource,
};
pub use frame::EventFrame;
pub use hub::{next_backoff, EventHub, HubStats, SubscriberHandle};
pub use notifications::{
    BusNotificationService, Notification, NotificationService, NotificationSeverity,
};
pub use sink::{ChannelSink, EventSink};
