//! # Platform Monitor
//!
//! Runs the health check orchestrator, the event hub, the counter publisher and the
//! property refresher until interrupted.
//!
//! ## Usage
//!
//! ```bash
//! # Run with defaults (config/monitor.toml if present)
//! cargo run --bin monitor
//!
//! # Explicit configuration file and environment overrides
//! MONITOR_CONFIG=/etc/monitor.toml MONITOR__ORCHESTRATOR__INTERVAL_SECONDS=10 cargo run --bin monitor
//! ```

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use platform_monitor::clients::{
    AlertSource, ClusterApi, GrafanaAlertClient, GraphqlQueryService, KeyValueStore,
    KubeClusterApi, MessageBus, PlatformQueryService, RedisStore,
};
use platform_monitor::config::ConfigManager;
use platform_monitor::events::{
    BusNotificationService, CounterPublisher, DeltaFileStatsSource, ErrorCountSource, EventHub,
    NotificationCountSource, NotificationService,
};
use platform_monitor::health::checks::{
    ActionQueueCheck, AlertCheck, ColdQueueCheck, IngressStatusCheck, K8sResourcesCheck,
    LongRunningTaskCheck, StorageUsageCheck,
};
use platform_monitor::health::{CheckRegistry, HealthCheckOrchestrator};
use platform_monitor::logging;
use platform_monitor::metrics::{self, MetricsSink, OtelMetricsSink};
use platform_monitor::properties::{
    DynamicProperties, PropertyRefresher, PropertySource, SharedProperties,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_structured_logging();
    let exporting_metrics = metrics::init_metrics();

    info!(exporting_metrics, version = env!("CARGO_PKG_VERSION"), "Starting platform monitor");

    let manager = ConfigManager::load().context("failed to load monitor configuration")?;
    let config = manager.config().clone();

    let redis = Arc::new(
        RedisStore::connect(&config.clients.redis_url)
            .await
            .context("failed to connect to the key-value store")?,
    );
    let store: Arc<dyn KeyValueStore> = redis.clone();
    let bus: Arc<dyn MessageBus> = redis;

    let query: Arc<dyn PlatformQueryService> = Arc::new(
        GraphqlQueryService::new(
            config.clients.graphql_url.clone(),
            config.clients.request_timeout(),
        )
        .context("failed to build the query client")?,
    );

    let cluster: Option<Arc<dyn ClusterApi>> =
        match KubeClusterApi::try_default(config.checks.namespace.clone()).await {
            Ok(cluster) => Some(Arc::new(cluster)),
            Err(e) => {
                warn!(error = %e, "No cluster access, Kubernetes resource check disabled");
                None
            }
        };

    let alerts: Option<Arc<dyn AlertSource>> = if config.clients.grafana_url.trim().is_empty() {
        None
    } else {
        let client =
            GrafanaAlertClient::new(&config.clients.grafana_url, config.clients.request_timeout())
                .context("failed to build the alert client")?;
        Some(Arc::new(client))
    };

    let shared_properties = SharedProperties::new(DynamicProperties::from(&config.properties));
    let refresher = PropertyRefresher::new(
        Arc::clone(&query),
        shared_properties.clone(),
        &config.properties,
    );
    if let Err(e) = refresher.refresh_once().await {
        warn!(error = %e, "Using configured properties until the query service answers");
    }
    let properties_task = refresher.spawn();
    let properties: Arc<dyn PropertySource> = Arc::new(shared_properties);
    let metrics_sink: Arc<dyn MetricsSink> = Arc::new(OtelMetricsSink::new());

    let (hub, hub_task) = EventHub::start(bus, config.hub.clone());
    let notifications: Arc<dyn NotificationService> =
        Arc::new(BusNotificationService::new(Arc::clone(&hub)));

    let mut registry = CheckRegistry::new();
    registry
        .register(ActionQueueCheck::new(
            Arc::clone(&store),
            Arc::clone(&properties),
            metrics_sink,
            &config.checks,
            &config.properties,
        ))
        .register(LongRunningTaskCheck::new(Arc::clone(&store), &config.checks))
        .register(IngressStatusCheck::new(
            Arc::clone(&properties),
            Arc::clone(&query),
            Arc::clone(&notifications),
        ))
        .register(StorageUsageCheck::new(
            Arc::clone(&query),
            Arc::clone(&properties),
        ))
        .register(ColdQueueCheck::new(
            Arc::clone(&query),
            Arc::clone(&store),
            properties,
        ));
    if let Some(cluster) = cluster {
        registry.register(K8sResourcesCheck::new(cluster, &config.checks));
    }
    if let Some(alerts) = alerts {
        registry.register(AlertCheck::new(alerts, Arc::clone(&notifications)));
    }
    info!(checks = ?registry.descriptions(), "Status checks registered");

    let orchestrator = Arc::new(HealthCheckOrchestrator::new(
        registry,
        store,
        Arc::clone(&hub),
        config.orchestrator.clone(),
    ));
    let orchestrator_task = Arc::clone(&orchestrator).spawn();

    let counters_task = CounterPublisher::new(Arc::clone(&hub), config.counters.interval())
        .with_source(Arc::new(ErrorCountSource::new(Arc::clone(&query))))
        .with_source(Arc::new(DeltaFileStatsSource::new(query)))
        .with_source(Arc::new(NotificationCountSource::new(notifications)))
        .spawn();

    info!("Platform monitor started, press Ctrl+C to shut down");
    shutdown_signal().await;

    info!("Shutdown signal received, stopping background tasks");
    orchestrator_task.abort();
    counters_task.abort();
    properties_task.abort();
    hub_task.abort();
    metrics::shutdown_metrics();

    let stats = hub.stats();
    info!(
        frames_delivered = stats.frames_delivered,
        delivery_failures = stats.delivery_failures,
        reconnects = stats.reconnects,
        "Platform monitor stopped"
    );
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}
