// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-orchestrator
//!
//! A recording runtime and an in-memory control plane wired the same way the
//! orchestrator binary wires it. Runtime calls are recorded by name so tests
//! can assert which backend operations a transition triggered.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use cim_orchestrator::events::{EventBus, InMemoryEventBus, OrchestrationEvent};
use cim_orchestrator::lifecycle::Fields;
use cim_orchestrator::runs::{
    Run, RunLifecycle, RunLifecycleRegistry, RunState, Runnable, Runtime, RuntimeError,
    RuntimeResult,
};
use cim_orchestrator::store::{EntityStore, InMemoryEntityStore, InMemoryRunnableStore, RunnableStore};

pub const MOCK: &str = "mock";
pub const MOCK_KIND: &str = "mock+run";

fn fields(value: Value) -> Option<Fields> {
    value.as_object().cloned()
}

/// Runtime that keeps handles in a runnable store and records every call
pub struct MockRuntime {
    runnables: Arc<InMemoryRunnableStore>,
    calls: Mutex<Vec<&'static str>>,
    reject_runs: bool,
}

impl MockRuntime {
    pub fn new(runnables: Arc<InMemoryRunnableStore>) -> Self {
        Self {
            runnables,
            calls: Mutex::new(Vec::new()),
            reject_runs: false,
        }
    }

    /// Runtime whose `run` dispatch always fails
    pub fn rejecting(runnables: Arc<InMemoryRunnableStore>) -> Self {
        Self {
            reject_runs: true,
            ..Self::new(runnables)
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    async fn move_handle(&self, run: &Run, state: RunState) -> RuntimeResult<Runnable> {
        let mut handle = self
            .runnables
            .find(&run.id)
            .await
            .unwrap()
            .ok_or_else(|| RuntimeError::NotFound(run.id.clone()))?;
        handle.state = state;
        self.runnables.store(handle.clone()).await.unwrap();
        Ok(handle)
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    fn name(&self) -> &str {
        MOCK
    }

    fn build(&self, function: &Fields, task: &Fields, run: &Run) -> RuntimeResult<Fields> {
        self.record("build");
        let mut spec = function.clone();
        spec.extend(task.clone());
        spec.extend(run.spec.clone());
        Ok(spec)
    }

    async fn run(&self, run: &Run) -> RuntimeResult<Runnable> {
        self.record("run");
        if self.reject_runs {
            return Err(RuntimeError::Dispatch {
                id: run.id.clone(),
                reason: "backend rejected the run".to_string(),
            });
        }
        let handle = Runnable::for_run(run, MOCK).with_state(RunState::Running);
        self.runnables.store(handle.clone()).await.unwrap();
        Ok(handle)
    }

    async fn stop(&self, run: &Run) -> RuntimeResult<Runnable> {
        self.record("stop");
        self.move_handle(run, RunState::Stopped).await
    }

    async fn resume(&self, run: &Run) -> RuntimeResult<Runnable> {
        self.record("resume");
        self.move_handle(run, RunState::Running).await
    }

    async fn delete(&self, run: &Run) -> RuntimeResult<Option<Runnable>> {
        self.record("delete");
        match self.runnables.remove(&run.id).await.unwrap() {
            Some(handle) => Ok(Some(handle)),
            None => Err(RuntimeError::NotFound(run.id.clone())),
        }
    }

    fn on_ready(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        self.record("on_ready");
        fields(json!({"message": "ready", "dispatched": true}))
    }

    fn on_pending(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        self.record("on_pending");
        None
    }

    fn on_running(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        self.record("on_running");
        fields(json!({"message": "running"}))
    }

    fn on_complete(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        self.record("on_complete");
        fields(json!({"message": "done"}))
    }

    fn on_stopped(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        self.record("on_stopped");
        fields(json!({"message": "stopped"}))
    }

    fn on_error(&self, _run: &Run, runnable: Option<&Runnable>) -> Option<Fields> {
        self.record("on_error");
        let reason = runnable.and_then(|r| r.error.clone()).unwrap_or_else(|| "failed".into());
        fields(json!({"message": reason}))
    }

    fn on_deleted(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        self.record("on_deleted");
        None
    }
}

/// Non-local run of the mock kind in CREATED
pub fn run(id: &str) -> Run {
    Run::new(id, MOCK_KIND)
        .with_user("alice")
        .with_project("demo")
        .with_spec_value("function", json!({"image": "busybox"}))
        .with_spec_value("task", json!({"name": "train"}))
}

pub fn run_in(id: &str, state: RunState) -> Run {
    let mut run = run(id);
    run.set_state(state);
    run
}

/// In-memory control plane around a [`MockRuntime`]
pub struct Harness {
    pub runs: Arc<InMemoryEntityStore<Run>>,
    pub runnables: Arc<InMemoryRunnableStore>,
    pub bus: InMemoryEventBus,
    pub runtime: Arc<MockRuntime>,
    pub lifecycle: Arc<RunLifecycle>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MockRuntime::new, |registry| registry)
    }

    pub fn build(
        runtime: impl FnOnce(Arc<InMemoryRunnableStore>) -> MockRuntime,
        configure: impl FnOnce(RunLifecycleRegistry) -> RunLifecycleRegistry,
    ) -> Self {
        let runs = Arc::new(InMemoryEntityStore::new());
        let runnables = Arc::new(InMemoryRunnableStore::new());
        let bus = InMemoryEventBus::default();
        let runtime = Arc::new(runtime(runnables.clone()));

        let shared_bus: Arc<dyn EventBus> = Arc::new(bus.clone());
        let registry = RunLifecycleRegistry::new(runs.clone(), shared_bus).with_runtime(runtime.clone());
        let lifecycle: Arc<RunLifecycle> = Arc::new(configure(registry).build().unwrap());

        Self {
            runs,
            runnables,
            bus,
            runtime,
            lifecycle,
        }
    }

    pub async fn insert(&self, run: Run) -> Run {
        self.runs.create(run.clone()).await.unwrap();
        run
    }

    pub async fn stored(&self, id: &str) -> Option<Run> {
        self.runs.find(id).await.unwrap()
    }

    pub async fn handle(&self, id: &str) -> Option<Runnable> {
        self.runnables.find(id).await.unwrap()
    }
}

/// Every event currently buffered for a receiver
pub fn drain(rx: &mut broadcast::Receiver<OrchestrationEvent>) -> Vec<OrchestrationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Lifecycle states published to a receiver, in order
pub fn published_states(rx: &mut broadcast::Receiver<OrchestrationEvent>) -> Vec<String> {
    drain(rx)
        .into_iter()
        .filter_map(|event| match event {
            OrchestrationEvent::Lifecycle(event) => Some(event.state),
            _ => None,
        })
        .collect()
}
