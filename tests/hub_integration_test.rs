//! Event hub fan-out through the shared bus.

use std::sync::Arc;
use std::time::Duration;

use platform_monitor::clients::MessageBus;
use platform_monitor::config::HubConfig;
use platform_monitor::events::{
    BusNotificationService, CounterPublisher, ErrorCountSource, EventFrame, EventHub,
    Notification, NotificationService,
};
use platform_monitor::test_helpers::{InMemoryStore, RecordingSink, ScriptedQueryService};

async fn started_hub() -> (Arc<EventHub>, Arc<InMemoryStore>, tokio::task::JoinHandle<()>) {
    let bus = Arc::new(InMemoryStore::new());
    let (hub, task) = EventHub::start(bus.clone(), HubConfig::default());
    hub.ready().await;
    (hub, bus, task)
}

async fn wait_for_frames(sink: &RecordingSink, count: usize) -> Vec<EventFrame> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frames = sink.frames();
            if frames.len() >= count {
                return frames;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("frames were not delivered in time")
}

#[tokio::test]
async fn test_one_publish_reaches_every_subscriber() {
    let (hub, _bus, task) = started_hub().await;
    let sinks: Vec<Arc<RecordingSink>> = (0..3).map(|_| Arc::new(RecordingSink::new())).collect();
    for sink in &sinks {
        hub.register(sink.clone());
    }

    hub.publish("status", r#"{"code":0}"#).await.unwrap();

    for sink in &sinks {
        let frames = wait_for_frames(sink, 1).await;
        assert_eq!(frames, vec![EventFrame::new("status", r#"{"code":0}"#)]);
    }
    assert_eq!(hub.stats().frames_delivered, 3);
    assert_eq!(hub.stats().messages_received, 1);
    task.abort();
}

#[tokio::test]
async fn test_unregister_during_broadcast() {
    let bus = Arc::new(InMemoryStore::new());
    let hub = EventHub::new(bus, HubConfig::default());

    let first = Arc::new(RecordingSink::new());
    let second = Arc::new(RecordingSink::new());
    let third = Arc::new(RecordingSink::new());
    hub.register(first.clone());
    let second_handle = hub.register(second.clone());
    hub.register(third.clone());

    let hub_in_hook = Arc::clone(&hub);
    first.on_send(move || {
        hub_in_hook.unregister(&second_handle);
    });

    let delivered = hub.broadcast(&EventFrame::new("status", "{}")).await;

    assert!(delivered <= 3);
    assert!(delivered >= 2);
    assert_eq!(hub.subscriber_count(), 2);

    // the next broadcast skips the removed subscriber
    let before = second.frames().len();
    hub.broadcast(&EventFrame::new("status", "{}")).await;
    assert_eq!(second.frames().len(), before);
    assert_eq!(third.frames().len(), 2);
}

#[tokio::test]
async fn test_channel_subscriber_receives_encoded_frames() {
    let (hub, _bus, task) = started_hub().await;
    let (handle, mut frames) = hub.register_channel();

    hub.publish("notification", "line one\nline two").await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        frame,
        "event: notification\ndata: line one\ndata: line two\n\n"
    );
    assert!(hub.unregister(&handle));
    task.abort();
}

#[tokio::test]
async fn test_messages_outside_prefix_are_ignored() {
    let (hub, bus, task) = started_hub().await;
    let sink = Arc::new(RecordingSink::new());
    hub.register(sink.clone());

    bus.publish("org.deltafi.other.status", "{}").await.unwrap();
    hub.publish("status", "{}").await.unwrap();

    let frames = wait_for_frames(&sink, 1).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].event_type(), "status");
    task.abort();
}

#[tokio::test]
async fn test_notifications_and_counters_reach_subscribers() {
    let (hub, _bus, task) = started_hub().await;
    let sink = Arc::new(RecordingSink::new());
    hub.register(sink.clone());

    let notifications = BusNotificationService::new(Arc::clone(&hub));
    notifications
        .create_event(Notification::warn("ingress", "Disk is filling up"))
        .await
        .unwrap();
    assert_eq!(notifications.notification_count(), 1);

    let query = Arc::new(ScriptedQueryService::new());
    query.set_unacknowledged_errors(7);
    let publisher = CounterPublisher::new(Arc::clone(&hub), Duration::from_secs(5))
        .with_source(Arc::new(ErrorCountSource::new(query)));
    assert_eq!(publisher.publish_once().await, 1);

    let frames = wait_for_frames(&sink, 2).await;
    assert_eq!(frames[0].event_type(), "notification");
    assert!(frames[0].payload().contains("Disk is filling up"));
    assert_eq!(frames[1], EventFrame::new("errorCount", "7"));
    task.abort();
}
