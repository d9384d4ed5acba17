//! Recorders that capture what the monitor emits.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{MonitorResult, SinkError};
use crate::events::{EventFrame, EventSink, Notification, NotificationService};
use crate::metrics::{Metric, MetricsSink};

#[derive(Debug, Default)]
pub struct RecordingNotificationService {
    notifications: Mutex<Vec<Notification>>,
    count: AtomicU64,
}

impl RecordingNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

#[async_trait]
impl NotificationService for RecordingNotificationService {
    async fn create_event(&self, notification: Notification) -> MonitorResult<()> {
        self.notifications.lock().push(notification);
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn notification_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    metrics: Mutex<Vec<Metric>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().clone()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record(&self, metric: Metric) {
        self.metrics.lock().push(metric);
    }
}

type SendHook = Box<dyn Fn() + Send + Sync>;

/// Subscriber that keeps every frame it accepts
///
/// A failing sink rejects every frame with the configured error. A hook runs before each
/// delivery, which lets tests mutate the hub mid-broadcast.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<EventFrame>>,
    failure: Option<SinkError>,
    hook: Mutex<Option<SendHook>>,
}

impl std::fmt::Debug for RecordingSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSink")
            .field("frames", &self.frames.lock().len())
            .field("failure", &self.failure)
            .finish()
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: SinkError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock() = Some(Box::new(hook));
    }

    pub fn frames(&self) -> Vec<EventFrame> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, frame: &EventFrame) -> Result<(), SinkError> {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook();
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}
