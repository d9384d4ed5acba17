//! End-to-end orchestrator behavior against in-memory collaborators.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use platform_monitor::clients::{Alert, FlowErrorState, PropertyEntry, StorageUsage};
use platform_monitor::config::{ChecksConfig, HubConfig, OrchestratorConfig, PropertiesConfig};
use platform_monitor::constants::{COLD_QUEUE_COUNT_KEY, LONG_RUNNING_TASKS_HASH, MONITOR_STATUS_KEY};
use platform_monitor::events::{EventHub, NotificationSeverity};
use platform_monitor::health::checks::{
    ActionQueueCheck, AlertCheck, ColdQueueCheck, IngressStatusCheck, LongRunningTaskCheck,
};
use platform_monitor::health::{
    AggregateStatus, CheckRegistry, HealthCheckOrchestrator, HealthSnapshot, Severity,
};
use platform_monitor::properties::{keys, DynamicProperties, PropertyRefresher, SharedProperties};
use platform_monitor::test_helpers::{
    FailingCheck, InMemoryStore, PanickingCheck, RecordingMetricsSink,
    RecordingNotificationService, ScriptedAlertSource, ScriptedQueryService, StaticCheck,
};

fn orchestrator_with(
    registry: CheckRegistry,
    store: Arc<InMemoryStore>,
    config: OrchestratorConfig,
) -> (Arc<HealthCheckOrchestrator>, Arc<EventHub>) {
    let hub = EventHub::new(store.clone(), HubConfig::default());
    let orchestrator = Arc::new(HealthCheckOrchestrator::new(
        registry,
        store,
        Arc::clone(&hub),
        config,
    ));
    (orchestrator, hub)
}

#[tokio::test]
async fn test_degraded_status_from_queue_warning() {
    let registry = CheckRegistry::new()
        .with(StaticCheck::new(
            "Long Running Tasks Check",
            Severity::Ok,
            &[],
        ))
        .with(StaticCheck::new(
            "Action Queue Check",
            Severity::Warn,
            &["- transform: 500"],
        ));
    let store = Arc::new(InMemoryStore::new());
    let (orchestrator, _) = orchestrator_with(registry, store.clone(), OrchestratorConfig::default());

    let status = orchestrator.tick().await.unwrap();

    assert_eq!(status.severity(), Severity::Warn);
    assert_eq!(status.state(), "Degraded");
    assert_eq!(status.color(), "yellow");
    assert_eq!(status.checks()[0].description(), "Action Queue Check");
    assert_eq!(status.checks()[1].description(), "Long Running Tasks Check");

    // the same serialized status went to the store and the bus
    let persisted = store.get_sync(MONITOR_STATUS_KEY).unwrap();
    assert_eq!(
        store.published_on("org.deltafi.ui.sse.status"),
        vec![persisted.clone()]
    );
    let parsed: AggregateStatus = serde_json::from_str(&persisted).unwrap();
    assert_eq!(parsed, status);
    assert_eq!(orchestrator.current(), HealthSnapshot::Reported(status));
}

#[tokio::test]
async fn test_real_checks_against_store() {
    let store = Arc::new(InMemoryStore::new());
    store.heartbeat_now("transform");
    store.set_queue_depth("transform", 25);
    let now = Utc::now();
    store.hset(
        LONG_RUNNING_TASKS_HASH,
        "org.example.Transform:transform:did-1",
        &serde_json::to_string(&[
            (now - chrono::Duration::seconds(300)).to_rfc3339(),
            now.to_rfc3339(),
        ])
        .unwrap(),
    );

    let checks = ChecksConfig::default();
    let properties = Arc::new(SharedProperties::new(DynamicProperties {
        queue_size_threshold: Some(10),
        ..DynamicProperties::default()
    }));
    let registry = CheckRegistry::new()
        .with(ActionQueueCheck::new(
            store.clone(),
            properties,
            Arc::new(RecordingMetricsSink::new()),
            &checks,
            &PropertiesConfig::default(),
        ))
        .with(LongRunningTaskCheck::new(store.clone(), &checks));
    let (orchestrator, _) = orchestrator_with(registry, store, OrchestratorConfig::default());

    let status = orchestrator.tick().await.unwrap();

    assert_eq!(status.state(), "Degraded");
    assert_eq!(status.checks()[0].description(), "Action Queue Check");
    assert_eq!(status.checks()[1].description(), "Long Running Tasks Check (1)");
    assert!(status.checks()[1]
        .message()
        .contains("- [did-1](/deltafile/viewer/did-1) 300s"));
}

#[tokio::test]
async fn test_one_failure_among_many_checks() {
    let mut registry = CheckRegistry::new();
    for name in ["Alpha", "Bravo", "Charlie", "Delta"] {
        registry.register(StaticCheck::new(name, Severity::Ok, &[]));
    }
    registry.register(FailingCheck::new("Echo", "collaborator down"));
    registry.register(PanickingCheck::new("Foxtrot"));

    let (orchestrator, _) = orchestrator_with(
        registry,
        Arc::new(InMemoryStore::new()),
        OrchestratorConfig::default(),
    );
    let status = orchestrator.tick().await.unwrap();

    assert_eq!(status.checks().len(), 6);
    assert_eq!(status.severity(), Severity::Error);
    let errors: Vec<&str> = status
        .checks()
        .iter()
        .filter(|check| check.severity() == Severity::Error)
        .map(|check| check.description())
        .collect();
    assert_eq!(errors, vec!["Echo", "Foxtrot"]);
    assert!(status.checks()[2..]
        .iter()
        .all(|check| check.severity() == Severity::Ok));
}

#[tokio::test(start_paused = true)]
async fn test_tick_starts_compensate_for_check_duration() {
    let fast = StaticCheck::new("Fast Check", Severity::Ok, &[]).delayed(Duration::from_secs(2));
    let starts = fast.starts();
    let (orchestrator, _) = orchestrator_with(
        CheckRegistry::new().with(fast),
        Arc::new(InMemoryStore::new()),
        OrchestratorConfig::default(),
    );

    let task = Arc::clone(&orchestrator).spawn();
    while starts.lock().len() < 3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    task.abort();

    let starts = starts.lock().clone();
    let gap = starts[1] - starts[0];
    // interval 5s, tick 2s: sleep 3s
    assert!(gap >= Duration::from_secs(5) && gap < Duration::from_millis(5_100), "{gap:?}");
}

#[tokio::test(start_paused = true)]
async fn test_slow_ticks_sleep_the_minimum() {
    let slow = StaticCheck::new("Slow Check", Severity::Ok, &[]).delayed(Duration::from_secs(6));
    let starts = slow.starts();
    let (orchestrator, _) = orchestrator_with(
        CheckRegistry::new().with(slow),
        Arc::new(InMemoryStore::new()),
        OrchestratorConfig::default(),
    );

    let task = Arc::clone(&orchestrator).spawn();
    while starts.lock().len() < 2 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    task.abort();

    let starts = starts.lock().clone();
    let gap = starts[1] - starts[0];
    // tick 6s exceeds the 5s interval: sleep 1s
    assert!(gap >= Duration::from_secs(7) && gap < Duration::from_millis(7_100), "{gap:?}");
}

#[tokio::test(start_paused = true)]
async fn test_loop_survives_store_outage() {
    let check = StaticCheck::new("Check", Severity::Ok, &[]);
    let starts = check.starts();
    let store = Arc::new(InMemoryStore::new());
    store.set_failing(true);
    let (orchestrator, _) = orchestrator_with(
        CheckRegistry::new().with(check),
        store,
        OrchestratorConfig::default(),
    );

    let task = Arc::clone(&orchestrator).spawn();
    while starts.lock().len() < 3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    task.abort();

    assert_eq!(orchestrator.current().state(), "Healthy");
}

#[tokio::test]
async fn test_ingress_notifications_follow_transitions() {
    let query = Arc::new(ScriptedQueryService::new());
    let notifications = Arc::new(RecordingNotificationService::new());
    let properties = Arc::new(SharedProperties::new(DynamicProperties {
        ingress_disk_space_requirement_bytes: 100,
        ..DynamicProperties::default()
    }));
    let registry = CheckRegistry::new().with(IngressStatusCheck::new(
        properties,
        query.clone(),
        notifications.clone(),
    ));
    let (orchestrator, _) = orchestrator_with(
        registry,
        Arc::new(InMemoryStore::new()),
        OrchestratorConfig::default(),
    );

    let roomy = StorageUsage {
        used_bytes: 0,
        total_bytes: 1_000,
    };
    let full = StorageUsage {
        used_bytes: 950,
        total_bytes: 1_000,
    };

    let mut states = Vec::new();
    for usage in [roomy, full, full, roomy] {
        query.set_storage_usage(usage);
        states.push(orchestrator.tick().await.unwrap().state().to_string());
    }

    assert_eq!(states, vec!["Healthy", "Degraded", "Degraded", "Healthy"]);
    let sent = notifications.notifications();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].severity, NotificationSeverity::Warn);
    assert_eq!(sent[1].severity, NotificationSeverity::Info);

    // a failed tick does not advance the remembered state
    query.set_exceeded_flows(vec![FlowErrorState {
        name: "smoke".to_string(),
        curr_errors: 5,
        max_errors: 1,
    }]);
    query.set_failing(true);
    let failed = orchestrator.tick().await.unwrap();
    assert_eq!(failed.severity(), Severity::Error);

    query.set_failing(false);
    orchestrator.tick().await.unwrap();
    orchestrator.tick().await.unwrap();
    let flow_alerts = notifications
        .notifications()
        .into_iter()
        .filter(|n| n.summary.contains("flow smoke"))
        .count();
    assert_eq!(flow_alerts, 1);
}

#[tokio::test]
async fn test_refreshed_properties_reach_the_next_tick() {
    let query = Arc::new(ScriptedQueryService::new());
    let shared = SharedProperties::default();
    let refresher =
        PropertyRefresher::new(query.clone(), shared.clone(), &PropertiesConfig::default());
    let registry = CheckRegistry::new().with(IngressStatusCheck::new(
        Arc::new(shared),
        query.clone(),
        Arc::new(RecordingNotificationService::new()),
    ));
    let (orchestrator, _) = orchestrator_with(
        registry,
        Arc::new(InMemoryStore::new()),
        OrchestratorConfig::default(),
    );

    refresher.refresh_once().await.unwrap();
    assert_eq!(orchestrator.tick().await.unwrap().state(), "Healthy");

    query.set_properties(vec![PropertyEntry::new(keys::INGRESS_ENABLED, "false")]);
    refresher.refresh_once().await.unwrap();
    let status = orchestrator.tick().await.unwrap();
    assert_eq!(status.state(), "Degraded");
    assert!(status.checks()[0].message().contains("Ingress is disabled"));
}

#[tokio::test]
async fn test_cold_queue_and_alert_checks_across_ticks() {
    let query = Arc::new(ScriptedQueryService::new());
    let alerts = Arc::new(ScriptedAlertSource::new());
    let notifications = Arc::new(RecordingNotificationService::new());
    let store = Arc::new(InMemoryStore::new());
    let properties = Arc::new(SharedProperties::new(DynamicProperties {
        cold_queue_minimum_growing: 10,
        ..DynamicProperties::default()
    }));
    let registry = CheckRegistry::new()
        .with(ColdQueueCheck::new(query.clone(), store.clone(), properties))
        .with(AlertCheck::new(alerts.clone(), notifications.clone()));
    let (orchestrator, _) = orchestrator_with(registry, store.clone(), OrchestratorConfig::default());

    let rounds: [(u64, Vec<Alert>); 3] = [
        (20, vec![]),
        (60, vec![Alert::new([("alertname", "Disk Full"), ("severity", "critical")])]),
        (5, vec![]),
    ];
    let mut states = Vec::new();
    for (depth, firing) in rounds {
        query.set_cold_queued(&[("split", depth)]);
        alerts.set_alerts(firing);
        states.push(orchestrator.tick().await.unwrap().state().to_string());
    }

    assert_eq!(states, vec!["Healthy", "Degraded", "Healthy"]);
    assert_eq!(store.get_sync(COLD_QUEUE_COUNT_KEY), Some("5".to_string()));
    let summaries: Vec<String> = notifications
        .notifications()
        .into_iter()
        .map(|n| n.summary)
        .collect();
    assert_eq!(summaries, vec!["Alert: Disk Full", "Alert cleared: Disk Full"]);
}
