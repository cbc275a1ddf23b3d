// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run lifecycle managers and their registry

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::graph::run_state_graph;
use super::model::{Run, RunEvent, RunState, Runnable};
use super::runtime::Runtime;
use crate::events::EventBus;
use crate::lifecycle::{
    BaseLifecycleManager, EntityLifecycle, KindAwareLifecycleManager, LifecycleEntity,
    LifecycleError, LifecycleResult, ProcessorRegistry, SideEffect,
};
use crate::state_machine::{FsmResult, DEFAULT_LOCK_TIMEOUT};
use crate::store::EntityStore;

/// Object-safe run lifecycle, as stored in dispatch tables
pub type RunLifecycle = dyn EntityLifecycle<Run, Runnable, Runnable>;

/// Lifecycle manager for the runs of one runtime
pub struct RunLifecycleManager {
    runtime: Arc<dyn Runtime>,
    inner: BaseLifecycleManager<Run, RunState, RunEvent, Runnable, Runnable>,
}

impl RunLifecycleManager {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        store: Arc<dyn EntityStore<Run>>,
        bus: Arc<dyn EventBus>,
    ) -> FsmResult<Self> {
        let graph = Arc::new(run_state_graph(runtime.clone())?);
        let family = format!("{}+run", runtime.name());
        Ok(Self {
            inner: BaseLifecycleManager::new(family, graph, store, bus),
            runtime,
        })
    }

    pub fn with_processors(mut self, processors: Arc<ProcessorRegistry<Run, Runnable>>) -> Self {
        self.inner = self.inner.with_processors(processors);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.with_lock_timeout(timeout);
        self
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    fn ensure_supported(&self, run: &Run) -> LifecycleResult<()> {
        if self.runtime.is_supported(run) {
            Ok(())
        } else {
            warn!(id = %run.id, kind = %run.kind, runtime = self.runtime.name(), "run not supported");
            Err(LifecycleError::Unsupported {
                id: run.id.clone(),
                kind: run.kind.clone(),
            })
        }
    }
}

#[async_trait]
impl EntityLifecycle<Run, Runnable, Runnable> for RunLifecycleManager {
    async fn perform(
        &self,
        entity: Run,
        event: &str,
        input: Option<Runnable>,
        effect: Option<SideEffect<Run, Runnable>>,
    ) -> LifecycleResult<Run> {
        self.ensure_supported(&entity)?;
        self.inner.perform(entity, event, input, effect).await
    }

    async fn handle(
        &self,
        entity: Run,
        next_state: &str,
        input: Option<Runnable>,
        effect: Option<SideEffect<Run, Runnable>>,
    ) -> LifecycleResult<Run> {
        self.ensure_supported(&entity)?;
        self.inner.handle(entity, next_state, input, effect).await
    }
}

/// Builds the kind-aware run dispatcher
///
/// Every registered runtime gets a default manager under `{runtime}+run`
/// unless a manager was registered explicitly for that kind.
pub struct RunLifecycleRegistry {
    store: Arc<dyn EntityStore<Run>>,
    bus: Arc<dyn EventBus>,
    runtimes: Vec<Arc<dyn Runtime>>,
    managers: Vec<(String, Arc<RunLifecycle>)>,
    processors: Arc<ProcessorRegistry<Run, Runnable>>,
    lock_timeout: Duration,
}

impl RunLifecycleRegistry {
    pub fn new(store: Arc<dyn EntityStore<Run>>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            store,
            bus,
            runtimes: Vec::new(),
            managers: Vec::new(),
            processors: Arc::new(ProcessorRegistry::empty()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.runtimes.push(runtime);
        self
    }

    pub fn with_manager(mut self, kind: impl Into<String>, manager: Arc<RunLifecycle>) -> Self {
        self.managers.push((kind.into(), manager));
        self
    }

    /// Processors shared by the default managers
    pub fn with_processors(mut self, processors: ProcessorRegistry<Run, Runnable>) -> Self {
        self.processors = Arc::new(processors);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn build(self) -> FsmResult<KindAwareLifecycleManager<Run, Runnable, Runnable>> {
        let mut builder = KindAwareLifecycleManager::builder();
        for (kind, manager) in self.managers {
            info!(%kind, "registered run lifecycle manager");
            builder = builder.register(kind, manager);
        }

        for runtime in self.runtimes {
            let kind = format!("{}+run", runtime.name());
            if builder.contains(&kind) {
                continue;
            }
            let manager = RunLifecycleManager::new(runtime, self.store.clone(), self.bus.clone())?
                .with_processors(self.processors.clone())
                .with_lock_timeout(self.lock_timeout);
            info!(%kind, "registered default run lifecycle manager");
            builder = builder.register(kind, Arc::new(manager));
        }

        Ok(builder.build())
    }
}

/// Convenience: persist a new run through the store then fire `event`
pub async fn submit(
    lifecycle: &RunLifecycle,
    store: &dyn EntityStore<Run>,
    run: Run,
    event: RunEvent,
) -> LifecycleResult<Run> {
    store.create(run.clone()).await?;
    let id = run.id().to_string();
    let updated = lifecycle.perform(run, event.as_str(), None, None).await?;
    debug!(%id, state = ?updated.run_state(), "run submitted");
    Ok(updated)
}
