// Copyright (c) 2025 - Cowboy AI, Inc.
//! Fixed-delay scheduling of reconciliation monitors

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::ReconciliationMonitor;

/// Runs one fixed-delay loop per monitor, first ticks staggered
pub struct MonitorScheduler {
    monitors: Vec<Arc<ReconciliationMonitor>>,
    delay: Duration,
    stagger: Duration,
}

impl MonitorScheduler {
    pub fn new(delay: Duration, stagger: Duration) -> Self {
        Self {
            monitors: Vec::new(),
            delay,
            stagger,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<ReconciliationMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Spawn every loop; each stops once `shutdown` turns `true` or its sender drops
    pub fn start(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let delay = self.delay;
        self.monitors
            .into_iter()
            .enumerate()
            .map(|(index, monitor)| {
                let initial = self.stagger * index as u32;
                spawn_loop(monitor, initial, delay, shutdown.clone())
            })
            .collect()
    }
}

fn spawn_loop(
    monitor: Arc<ReconciliationMonitor>,
    initial: Duration,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let backend = monitor.backend_name().to_string();
        info!(%backend, ?initial, ?delay, "reconciliation loop started");

        if wait(&mut shutdown, initial).await {
            loop {
                let refreshed = monitor.tick().await;
                debug!(%backend, refreshed, "reconciliation tick");
                if !wait(&mut shutdown, delay).await {
                    break;
                }
            }
        }

        info!(%backend, "reconciliation loop stopped");
    })
}

/// Sleep for `period`; `false` when shutdown was requested meanwhile
async fn wait(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    if *shutdown.borrow_and_update() {
        return false;
    }
    let sleep = tokio::time::sleep(period);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return !*shutdown.borrow(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow_and_update() {
                    return false;
                }
            }
        }
    }
}
