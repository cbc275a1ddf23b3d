// Copyright (c) 2025 - Cowboy AI, Inc.
//! Per-backend reconciliation

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info_span, warn, Instrument};

use super::{BackendStatus, ExecutionBackend};
use crate::config::MonitorConfig;
use crate::events::{EventBus, OrchestrationEvent, RunnableChangedEvent};
use crate::runs::{RunState, Runnable};
use crate::store::{RunnableStore, StoreResult};

/// Reconciles the execution handles of one backend
pub struct ReconciliationMonitor {
    backend: Arc<dyn ExecutionBackend>,
    store: Arc<dyn RunnableStore>,
    bus: Arc<dyn EventBus>,
    config: MonitorConfig,
    status_failures: Mutex<HashMap<String, u32>>,
}

impl ReconciliationMonitor {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<dyn RunnableStore>,
        bus: Arc<dyn EventBus>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            backend,
            store,
            bus,
            config,
            status_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Handles tracked on this tick
    ///
    /// Running handles (all handles for push-model backends) plus settled
    /// ones whose terminal transition has not cleaned them up yet.
    pub async fn tracked(&self) -> StoreResult<Vec<Runnable>> {
        let push = self.backend.push_model();
        let name = self.backend.name();
        Ok(self
            .store
            .find_all()
            .await?
            .into_iter()
            .filter(|r| r.framework == name)
            .filter(|r| push || r.state == RunState::Running || is_settled(r.state))
            .collect())
    }

    /// One reconciliation pass; returns the number of handles refreshed or re-announced
    pub async fn tick(&self) -> usize {
        let span = info_span!("reconcile", backend = self.backend.name());
        self.tick_inner().instrument(span).await
    }

    async fn tick_inner(&self) -> usize {
        let tracked = match self.tracked().await {
            Ok(tracked) => tracked,
            Err(e) => {
                error!(error = %e, "failed to list execution handles");
                return 0;
            }
        };
        self.retain_failures(&tracked);
        debug!(count = tracked.len(), "refreshing execution handles");

        let mut refreshed = 0;
        for runnable in tracked {
            // settled handles stay until the run's terminal transition removes them
            if is_settled(runnable.state) {
                debug!(id = %runnable.id, state = %runnable.state, "re-announcing settled handle");
                self.announce(&runnable).await;
                refreshed += 1;
                continue;
            }

            let updated = self.refresh(runnable).await;

            match self.store.replace(updated.clone()).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(id = %updated.id, "execution handle removed during refresh");
                    continue;
                }
                Err(e) => {
                    error!(id = %updated.id, error = %e, "failed to persist execution handle");
                    continue;
                }
            }
            refreshed += 1;
            self.announce(&updated).await;
        }
        refreshed
    }

    async fn announce(&self, runnable: &Runnable) {
        let event = RunnableChangedEvent::from_runnable(runnable);
        if let Err(e) = self.bus.publish(OrchestrationEvent::RunnableChanged(event)).await {
            warn!(id = %runnable.id, error = %e, "failed to publish runnable change");
        }
    }

    /// Refresh one handle from the backend
    ///
    /// Works on the given copy; the caller writes it back.
    pub async fn refresh(&self, mut runnable: Runnable) -> Runnable {
        match self.backend.status(&runnable).await {
            Ok(status) => {
                self.clear_failures(&runnable.id);
                let (state, message) = status.to_run_state(&runnable.id);
                if state != runnable.state {
                    debug!(id = %runnable.id, from = %runnable.state, to = %state, "execution state changed");
                }
                runnable.state = state;
                if let Some(message) = message {
                    runnable.error = Some(message);
                }
                if status == BackendStatus::Missing {
                    warn!(id = %runnable.id, "execution resource missing");
                    return runnable;
                }
            }
            Err(e) => {
                let failures = self.record_failure(&runnable.id);
                warn!(id = %runnable.id, failures, error = %e, "status unavailable");
                if failures >= self.config.status_failure_threshold {
                    self.clear_failures(&runnable.id);
                    runnable.state = RunState::Error;
                    runnable.error = Some(format!(
                        "status unavailable after {failures} attempts: {e}"
                    ));
                }
            }
        }

        if self.config.collect_results {
            match self.backend.results(&runnable).await {
                Ok(Some(results)) => runnable.results.extend(results),
                Ok(None) => {}
                Err(e) => warn!(id = %runnable.id, error = %e, "results unavailable"),
            }
        }

        if self.config.collect_logs {
            match self.backend.logs(&runnable).await {
                Ok(logs) if !logs.is_empty() => runnable.logs = logs,
                Ok(_) => {}
                Err(e) => warn!(id = %runnable.id, error = %e, "logs unavailable"),
            }
        }

        if self.config.collect_metrics {
            match self.backend.metrics(&runnable).await {
                Ok(metrics) if !metrics.is_empty() => runnable.metrics = metrics,
                Ok(_) => {}
                Err(e) => warn!(id = %runnable.id, error = %e, "metrics unavailable"),
            }
        }

        runnable
    }

    fn record_failure(&self, id: &str) -> u32 {
        match self.status_failures.lock() {
            Ok(mut failures) => {
                let count = failures.entry(id.to_string()).or_insert(0);
                *count += 1;
                *count
            }
            Err(_) => self.config.status_failure_threshold,
        }
    }

    fn clear_failures(&self, id: &str) {
        if let Ok(mut failures) = self.status_failures.lock() {
            failures.remove(id);
        }
    }

    /// Forget failure counts of handles no longer tracked
    fn retain_failures(&self, tracked: &[Runnable]) {
        if let Ok(mut failures) = self.status_failures.lock() {
            failures.retain(|id, _| tracked.iter().any(|r| &r.id == id));
        }
    }
}

fn is_settled(state: RunState) -> bool {
    matches!(state, RunState::Completed | RunState::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InMemoryEventBus;
    use crate::lifecycle::Fields;
    use crate::monitor::BackendError;
    use crate::runs::LogEntry;
    use crate::store::InMemoryRunnableStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    /// Scripted statuses; the logs facet always fails
    struct FlakyBackend {
        status: Mutex<Vec<Result<BackendStatus, BackendError>>>,
    }

    impl FlakyBackend {
        fn new(mut script: Vec<Result<BackendStatus, BackendError>>) -> Self {
            script.reverse();
            Self {
                status: Mutex::new(script),
            }
        }
    }

    fn unavailable() -> BackendError {
        BackendError::Unavailable {
            backend: "flaky".into(),
            reason: "timeout".into(),
        }
    }

    #[async_trait]
    impl ExecutionBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn status(&self, _: &Runnable) -> Result<BackendStatus, BackendError> {
            self.status
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Ok(BackendStatus::Active))
        }

        async fn results(&self, _: &Runnable) -> Result<Option<Fields>, BackendError> {
            Ok(json!({"rows": 3}).as_object().cloned())
        }

        async fn logs(&self, _: &Runnable) -> Result<Vec<LogEntry>, BackendError> {
            Err(unavailable())
        }

        async fn metrics(&self, _: &Runnable) -> Result<Vec<Value>, BackendError> {
            Ok(vec![json!({"cpu": 0.5})])
        }
    }

    fn monitor(backend: FlakyBackend, threshold: u32) -> ReconciliationMonitor {
        ReconciliationMonitor::new(
            Arc::new(backend),
            Arc::new(InMemoryRunnableStore::new()),
            Arc::new(InMemoryEventBus::new(16)),
            MonitorConfig {
                status_failure_threshold: threshold,
                ..MonitorConfig::default()
            },
        )
    }

    fn wired(
        backend: Arc<dyn ExecutionBackend>,
        store: Arc<InMemoryRunnableStore>,
    ) -> (ReconciliationMonitor, InMemoryEventBus) {
        let bus = InMemoryEventBus::new(16);
        let monitor = ReconciliationMonitor::new(
            backend,
            store,
            Arc::new(bus.clone()),
            MonitorConfig::default(),
        );
        (monitor, bus)
    }

    fn announced(rx: &mut tokio::sync::broadcast::Receiver<OrchestrationEvent>) -> Vec<RunState> {
        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let OrchestrationEvent::RunnableChanged(event) = event {
                states.push(event.state);
            }
        }
        states
    }

    /// Removes the polled handle from the store, as a concurrent cleanup would
    struct VanishingBackend {
        store: Arc<InMemoryRunnableStore>,
    }

    #[async_trait]
    impl ExecutionBackend for VanishingBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn status(&self, runnable: &Runnable) -> Result<BackendStatus, BackendError> {
            self.store.remove(&runnable.id).await.unwrap();
            Ok(BackendStatus::Succeeded)
        }

        async fn results(&self, _: &Runnable) -> Result<Option<Fields>, BackendError> {
            Ok(None)
        }

        async fn logs(&self, _: &Runnable) -> Result<Vec<LogEntry>, BackendError> {
            Ok(Vec::new())
        }

        async fn metrics(&self, _: &Runnable) -> Result<Vec<Value>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn running() -> Runnable {
        Runnable::new("run-1", "flaky").with_state(RunState::Running)
    }

    #[tokio::test]
    async fn test_facet_failure_does_not_block_others() {
        let monitor = monitor(FlakyBackend::new(vec![Ok(BackendStatus::Succeeded)]), 3);
        let refreshed = monitor.refresh(running()).await;

        assert_eq!(refreshed.state, RunState::Completed);
        assert_eq!(refreshed.results.get("rows"), Some(&json!(3)));
        assert!(refreshed.logs.is_empty());
        assert_eq!(refreshed.metrics, vec![json!({"cpu": 0.5})]);
    }

    #[tokio::test]
    async fn test_status_failures_escalate_after_threshold() {
        let monitor = monitor(
            FlakyBackend::new(vec![Err(unavailable()), Err(unavailable()), Err(unavailable())]),
            3,
        );

        let first = monitor.refresh(running()).await;
        assert_eq!(first.state, RunState::Running);
        let second = monitor.refresh(first).await;
        assert_eq!(second.state, RunState::Running);
        let third = monitor.refresh(second).await;
        assert_eq!(third.state, RunState::Error);
        assert!(third.error.unwrap().contains("3 attempts"));
    }

    #[tokio::test]
    async fn test_successful_read_resets_failure_count() {
        let monitor = monitor(
            FlakyBackend::new(vec![
                Err(unavailable()),
                Ok(BackendStatus::Active),
                Err(unavailable()),
            ]),
            2,
        );

        let mut runnable = running();
        for _ in 0..3 {
            runnable = monitor.refresh(runnable).await;
        }
        assert_eq!(runnable.state, RunState::Running);
    }

    #[tokio::test]
    async fn test_missing_resource_skips_facets() {
        let monitor = monitor(FlakyBackend::new(vec![Ok(BackendStatus::Missing)]), 3);
        let refreshed = monitor.refresh(running()).await;

        assert_eq!(refreshed.state, RunState::Error);
        assert!(refreshed.error.is_some());
        assert!(refreshed.results.is_empty());
    }

    #[tokio::test]
    async fn test_settled_handles_are_re_announced_without_polling() {
        let store = Arc::new(InMemoryRunnableStore::new());
        store
            .store(Runnable::new("run-1", "flaky").with_state(RunState::Completed))
            .await
            .unwrap();
        // an unscripted poll would report Active and flip the handle back
        let (monitor, bus) = wired(Arc::new(FlakyBackend::new(Vec::new())), store.clone());
        let mut rx = bus.subscribe();

        assert_eq!(monitor.tick().await, 1);
        assert_eq!(monitor.tick().await, 1);

        assert_eq!(announced(&mut rx), vec![RunState::Completed, RunState::Completed]);
        assert_eq!(
            store.find("run-1").await.unwrap().map(|r| r.state),
            Some(RunState::Completed)
        );

        store.remove("run-1").await.unwrap();
        assert_eq!(monitor.tick().await, 0);
    }

    #[tokio::test]
    async fn test_failure_counts_of_removed_handles_are_dropped() {
        let store = Arc::new(InMemoryRunnableStore::new());
        store.store(running()).await.unwrap();
        let backend = FlakyBackend::new(vec![Err(unavailable())]);
        let (monitor, _bus) = wired(Arc::new(backend), store.clone());

        monitor.tick().await;
        assert_eq!(monitor.status_failures.lock().unwrap().get("run-1"), Some(&1));

        store.remove("run-1").await.unwrap();
        monitor.tick().await;
        assert!(monitor.status_failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_removed_during_refresh_is_not_restored() {
        let store = Arc::new(InMemoryRunnableStore::new());
        store.store(running()).await.unwrap();
        let backend = VanishingBackend {
            store: store.clone(),
        };
        let (monitor, bus) = wired(Arc::new(backend), store.clone());
        let mut rx = bus.subscribe();

        assert_eq!(monitor.tick().await, 0);
        assert!(store.find("run-1").await.unwrap().is_none());
        assert!(announced(&mut rx).is_empty());
    }
}
