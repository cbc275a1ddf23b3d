// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run Orchestrator Service
//!
//! Wires the control plane against the simulated cluster: submits a batch of
//! runs, reconciles them on a fixed delay and exits once every run reached a
//! terminal state (or on Ctrl-C).
//!
//! Run with: cargo run --bin orchestrator
//!
//! Useful environment variables:
//! - `CIM_ORCH_MONITOR_DELAY_SECS` - reconciliation delay (default 60)
//! - `CIM_ORCH_DEMO_RUNS` - number of runs to submit (default 3)
//! - `CIM_ORCH_USE_NATS` / `NATS_URL` - also publish events to NATS
//! - `RUST_LOG` - log filter

use anyhow::{Context, Result};
use cim_orchestrator::{
    events::CompositeEventBus,
    runs::{submit, RunLifecycle},
    runtime::SimulatedCluster,
    telemetry, EntityStore, EventBus, InMemoryEntityStore, InMemoryEventBus,
    InMemoryRunnableStore, MonitorScheduler, NatsClient, NatsEventBus, OrchestratorConfig,
    ReconciliationMonitor, Run, RunEvent, RunLifecycleRegistry, RunState, RunnableListener,
    WorkerPool,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    info!("🚀 Starting run orchestrator");

    let config = OrchestratorConfig::from_env().context("Invalid orchestrator configuration")?;
    info!("📋 Configuration loaded:");
    info!("  - Monitor delay: {:?}", config.monitor.delay);
    info!("  - Listener workers: {}", config.listener.workers);
    info!("  - NATS publishing: {}", config.use_nats);

    let runs = Arc::new(InMemoryEntityStore::<Run>::new());
    let runnables = Arc::new(InMemoryRunnableStore::new());

    let memory_bus = InMemoryEventBus::default();
    let mut composite = CompositeEventBus::new().with(Arc::new(memory_bus.clone()));
    let nats_bus = if config.use_nats {
        info!("🔌 Connecting to NATS at {:?}", config.nats.servers);
        let client = NatsClient::new(config.nats.clone())
            .await
            .context("Failed to connect to NATS")?;
        let nats_bus = NatsEventBus::new(client);
        composite = composite.with(Arc::new(nats_bus.clone()));
        Some(nats_bus)
    } else {
        None
    };
    let bus: Arc<dyn EventBus> = Arc::new(composite);

    let cluster = Arc::new(SimulatedCluster::new(runnables.clone()));
    let lifecycle: Arc<RunLifecycle> = Arc::new(
        RunLifecycleRegistry::new(runs.clone(), bus.clone())
            .with_runtime(cluster.clone())
            .with_lock_timeout(config.lock_timeout)
            .build()
            .context("Invalid run state graph")?,
    );

    let pool = WorkerPool::new(
        "runnable-listener",
        config.listener.workers,
        config.listener.queue_capacity,
    );
    let listener = Arc::new(RunnableListener::new(runs.clone(), lifecycle.clone(), pool));
    let listener_task = match &nats_bus {
        Some(nats_bus) => nats_bus
            .run_handler(listener.clone())
            .await
            .context("Failed to subscribe to runnable events")?,
        None => listener.clone().spawn(memory_bus.subscribe()),
    };

    let monitor = Arc::new(ReconciliationMonitor::new(
        cluster.clone(),
        runnables.clone(),
        bus.clone(),
        config.monitor.clone(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loops = MonitorScheduler::new(config.monitor.delay, config.monitor.stagger)
        .with_monitor(monitor)
        .start(shutdown_rx);

    let count: usize = std::env::var("CIM_ORCH_DEMO_RUNS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);

    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let run = Run::new(format!("run-{i}"), "simulated+run")
            .with_user("demo")
            .with_spec_value("function", json!({"image": "python:3.12"}))
            .with_spec_value("task", json!({"name": "demo-job"}));
        let run = submit(lifecycle.as_ref(), runs.as_ref(), run, RunEvent::Run)
            .await
            .with_context(|| format!("Failed to submit run-{i}"))?;
        info!("📝 Submitted {} ({:?})", run.id, run.run_state());
        ids.push(run.id);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                warn!("Interrupted, shutting down");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                let mut pending = 0;
                for id in &ids {
                    let state = runs.find(id).await?.and_then(|run| run.run_state());
                    if !matches!(state, Some(RunState::Completed) | Some(RunState::Error) | None) {
                        pending += 1;
                    }
                }
                if pending == 0 {
                    info!("✅ All runs reached a terminal state");
                    break;
                }
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for handle in loops {
        let _ = handle.await;
    }
    listener_task.abort();

    for id in &ids {
        match runs.find(id).await? {
            Some(run) => info!(
                "  - {}: {:?} {}",
                run.id,
                run.run_state(),
                run.status.get("message").cloned().unwrap_or_default()
            ),
            None => info!("  - {}: deleted", id),
        }
    }

    info!("👋 Run orchestrator stopped");
    Ok(())
}
