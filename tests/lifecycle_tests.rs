// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run lifecycle integration tests
//!
//! Drives runs through the kind-aware dispatcher against a recording runtime
//! and checks persisted state, runtime calls and published events.

mod fixtures;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use cim_orchestrator::events::OrchestrationEvent;
use cim_orchestrator::lifecycle::{
    EntityLifecycle, Fields, LifecycleError, LifecycleProcessor, ProcessorRegistry, SideEffect,
};
use cim_orchestrator::runs::{submit, Run, RunEvent, RunLifecycleManager, RunState, Runnable};
use cim_orchestrator::store::EntityStore;

use fixtures::{drain, published_states, run, run_in, Harness, MockRuntime};

#[tokio::test]
async fn test_run_event_dispatches_and_reaches_ready() {
    let h = Harness::new();
    let mut rx = h.bus.subscribe();
    let created = h.insert(run("run-1")).await;

    let updated = h.lifecycle.perform(created, "RUN", None, None).await.unwrap();

    assert_eq!(updated.run_state(), Some(RunState::Ready));
    assert_eq!(updated.status["message"], json!("ready"));
    assert_eq!(updated.status["dispatched"], json!(true));
    assert_eq!(h.stored("run-1").await, Some(updated.clone()));
    assert_eq!(h.runtime.calls(), vec!["run", "on_ready"]);
    assert_eq!(h.handle("run-1").await.map(|r| r.state), Some(RunState::Running));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        OrchestrationEvent::Lifecycle(event) => {
            assert_eq!(event.id, "run-1");
            assert_eq!(event.kind, "mock+run");
            assert_eq!(event.event.as_deref(), Some("RUN"));
            assert_eq!(event.state, "READY");
            assert_eq!(event.user.as_deref(), Some("alice"));
            assert_eq!(event.entity["status"]["state"], json!("READY"));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_handle_follows_multi_hop_path() {
    let h = Harness::new();
    let mut rx = h.bus.subscribe();
    let created = h.insert(run("run-1")).await;

    let updated = h.lifecycle.handle(created, "RUNNING", None, None).await.unwrap();

    // CREATED -BUILD-> BUILT -RUN-> READY -EXECUTE-> RUNNING
    assert_eq!(updated.run_state(), Some(RunState::Running));
    assert_eq!(h.runtime.calls(), vec!["build", "run", "on_ready", "on_running"]);
    assert_eq!(updated.status["message"], json!("running"));
    assert_eq!(updated.spec["image"], json!("busybox"));
    assert_eq!(updated.spec["name"], json!("train"));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    let OrchestrationEvent::Lifecycle(event) = &events[0] else {
        panic!("expected a lifecycle event");
    };
    assert_eq!(event.event, None);
    assert_eq!(event.state, "RUNNING");
}

#[tokio::test]
async fn test_invalid_transition_leaves_entity_untouched() {
    let h = Harness::new();
    let mut rx = h.bus.subscribe();
    let created = h.insert(run("run-1")).await;
    let before = serde_json::to_vec(&h.stored("run-1").await.unwrap()).unwrap();

    let first = h.lifecycle.perform(created, "COMPLETE", None, None).await.unwrap();
    let second = h.lifecycle.perform(first.clone(), "COMPLETE", None, None).await.unwrap();

    let after = serde_json::to_vec(&h.stored("run-1").await.unwrap()).unwrap();
    assert_eq!(before, after);
    assert_eq!(first, second);
    assert_eq!(second.run_state(), Some(RunState::Created));
    assert!(h.runtime.calls().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_unknown_names_are_rejected() {
    let h = Harness::new();
    let created = h.insert(run("run-1")).await;

    let err = h
        .lifecycle
        .perform(created.clone(), "LAUNCH", None, None)
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::UnknownEvent("LAUNCH".into()));

    let err = h.lifecycle.handle(created, "FLYING", None, None).await.unwrap_err();
    assert_eq!(err, LifecycleError::UnknownState("FLYING".into()));
}

#[tokio::test]
async fn test_deleted_run_is_removed() {
    let h = Harness::new();
    let created = h.insert(run("run-1")).await;
    let ready = h.lifecycle.perform(created, "RUN", None, None).await.unwrap();

    let deleting = h.lifecycle.perform(ready.clone(), "DELETE", None, None).await.unwrap();
    assert_eq!(deleting.run_state(), Some(RunState::Deleting));
    assert_eq!(h.handle("run-1").await, None);

    let deleted = h.lifecycle.perform(deleting, "DELETE", None, None).await.unwrap();
    assert_eq!(deleted.run_state(), Some(RunState::Deleted));
    assert_eq!(h.stored("run-1").await, None);
    assert_eq!(
        h.runtime.calls(),
        vec!["run", "on_ready", "delete", "on_deleted"]
    );

    let err = h.lifecycle.perform(ready, "RUN", None, None).await.unwrap_err();
    assert_eq!(err, LifecycleError::NotFound("run-1".into()));
}

#[tokio::test]
async fn test_handle_deleted_from_terminal_state() {
    let h = Harness::new();
    let mut rx = h.bus.subscribe();
    let failed = h.insert(run_in("run-1", RunState::Error)).await;

    let deleted = h.lifecycle.handle(failed, "DELETED", None, None).await.unwrap();

    assert_eq!(deleted.run_state(), Some(RunState::Deleted));
    assert_eq!(h.stored("run-1").await, None);
    // no handle left: the cleanup delete is tolerated
    assert_eq!(h.runtime.calls(), vec!["delete", "on_deleted"]);
    assert_eq!(published_states(&mut rx), vec!["DELETED"]);
}

#[tokio::test]
async fn test_unpersisted_and_stateless_runs() {
    let h = Harness::new();

    let err = h.lifecycle.perform(run("ghost"), "RUN", None, None).await.unwrap_err();
    assert_eq!(err, LifecycleError::NotFound("ghost".into()));

    let mut stateless = run("run-2");
    stateless.status.clear();
    h.insert(stateless.clone()).await;
    let err = h.lifecycle.perform(stateless, "RUN", None, None).await.unwrap_err();
    assert_eq!(err, LifecycleError::MissingState("run-2".into()));
}

#[tokio::test]
async fn test_unreachable_target_falls_back_to_error() {
    let h = Harness::new();
    let mut rx = h.bus.subscribe();
    let completed = h.insert(run_in("run-1", RunState::Completed)).await;

    let updated = h.lifecycle.handle(completed, "RUNNING", None, None).await.unwrap();

    assert_eq!(updated.run_state(), Some(RunState::Error));
    assert_eq!(h.stored("run-1").await.unwrap().run_state(), Some(RunState::Error));
    assert_eq!(published_states(&mut rx), vec!["ERROR"]);
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_stop_and_resume() {
    let h = Harness::new();
    let created = h.insert(run("run-1")).await;
    let ready = h.lifecycle.perform(created, "RUN", None, None).await.unwrap();
    let running = h.lifecycle.handle(ready, "RUNNING", None, None).await.unwrap();
    assert_eq!(running.run_state(), Some(RunState::Running));

    let stopped = h.lifecycle.perform(running, "STOP", None, None).await.unwrap();
    assert_eq!(stopped.run_state(), Some(RunState::Stopped));
    assert_eq!(stopped.status["message"], json!("stopped"));
    assert_eq!(h.handle("run-1").await.map(|r| r.state), Some(RunState::Stopped));

    let resumed = h.lifecycle.handle(stopped, "RUNNING", None, None).await.unwrap();
    assert_eq!(resumed.run_state(), Some(RunState::Running));
    assert_eq!(h.handle("run-1").await.map(|r| r.state), Some(RunState::Running));

    assert_eq!(
        h.runtime.calls(),
        vec![
            "run", "on_ready", "on_running", "stop", "on_stopped", "resume", "on_running"
        ]
    );
}

#[tokio::test]
async fn test_runtime_failure_is_ignored_transition() {
    let h = Harness::build(MockRuntime::rejecting, |registry| registry);
    let mut rx = h.bus.subscribe();
    let created = h.insert(run("run-1")).await;

    let unchanged = h.lifecycle.perform(created.clone(), "RUN", None, None).await.unwrap();

    assert_eq!(unchanged, created);
    assert_eq!(h.runtime.calls(), vec!["run"]);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_local_execution_skips_runtime() {
    let h = Harness::new();
    let local = h
        .insert(run("run-1").with_spec_value("local_execution", json!(true)))
        .await;

    let ready = h.lifecycle.perform(local, "RUN", None, None).await.unwrap();
    let done = h.lifecycle.handle(ready, "COMPLETED", None, None).await.unwrap();

    assert_eq!(done.run_state(), Some(RunState::Completed));
    assert!(h.runtime.calls().is_empty());
    assert_eq!(h.handle("run-1").await, None);
}

struct Tagger;

#[async_trait]
impl LifecycleProcessor<Run, Runnable> for Tagger {
    async fn process(
        &self,
        stage: &str,
        run: &Run,
        input: Option<&Runnable>,
    ) -> anyhow::Result<Option<Fields>> {
        Ok(json!({
            "stage": stage,
            "seen_state": run.status["state"],
            "had_input": input.is_some(),
            "state": "BOGUS",
        })
        .as_object()
        .cloned())
    }
}

struct Broken;

#[async_trait]
impl LifecycleProcessor<Run, Runnable> for Broken {
    async fn process(&self, _: &str, _: &Run, _: Option<&Runnable>) -> anyhow::Result<Option<Fields>> {
        anyhow::bail!("processor exploded")
    }
}

#[tokio::test]
async fn test_processors_and_side_effect() {
    let processors: ProcessorRegistry<Run, Runnable> = ProcessorRegistry::builder()
        .register("onReady", Broken)
        .register("onReady", Tagger)
        .build();
    let h = Harness::build(MockRuntime::new, |registry| registry.with_processors(processors));
    let created = h.insert(run("run-1")).await;

    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let effect: SideEffect<Run, Runnable> = Box::new(move |run: &Run, output: Option<Runnable>| {
        *captured.lock().unwrap() = Some((run.run_state(), output.map(|r| r.state)));
    });

    let updated = h
        .lifecycle
        .perform(created, "RUN", None, Some(effect))
        .await
        .unwrap();

    assert_eq!(updated.status["stage"], json!("onReady"));
    assert_eq!(updated.status["seen_state"], json!("READY"));
    assert_eq!(updated.status["had_input"], json!(false));
    assert_eq!(updated.status["message"], json!("ready"));
    assert_eq!(updated.run_state(), Some(RunState::Ready));
    assert_eq!(h.stored("run-1").await, Some(updated));
    assert_eq!(
        *seen.lock().unwrap(),
        Some((Some(RunState::Ready), Some(RunState::Running)))
    );
}

#[tokio::test]
async fn test_kind_dispatch_errors() {
    let h = Harness::new();

    let foreign = h.insert(Run::new("run-1", "spark+run")).await;
    let err = h.lifecycle.perform(foreign, "RUN", None, None).await.unwrap_err();
    assert_eq!(err, LifecycleError::UnregisteredKind("spark+run".into()));

    let kindless = h.insert(Run::new("run-2", "")).await;
    let err = h.lifecycle.perform(kindless, "RUN", None, None).await.unwrap_err();
    assert_eq!(err, LifecycleError::MissingKind("run-2".into()));

    let manager =
        RunLifecycleManager::new(h.runtime.clone(), h.runs.clone(), Arc::new(h.bus.clone())).unwrap();
    let other = h.insert(Run::new("run-3", "other+run")).await;
    let err = manager.perform(other, "RUN", None, None).await.unwrap_err();
    assert_eq!(
        err,
        LifecycleError::Unsupported {
            id: "run-3".into(),
            kind: "other+run".into()
        }
    );
    assert!(h.runtime.calls().is_empty());
}

#[tokio::test]
async fn test_held_entity_lock_times_out() {
    let h = Harness::build(MockRuntime::new, |registry| {
        registry.with_lock_timeout(Duration::from_millis(50))
    });
    let created = h.insert(run("run-1")).await;

    let lock = h.runs.lock("run-1", Duration::from_secs(1)).await.unwrap();
    let err = h.lifecycle.perform(created.clone(), "RUN", None, None).await.unwrap_err();
    assert_eq!(err, LifecycleError::LockTimeout("run-1".into()));
    drop(lock);

    let ready = h.lifecycle.perform(created, "RUN", None, None).await.unwrap();
    assert_eq!(ready.run_state(), Some(RunState::Ready));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_performs_serialize_per_run() {
    let h = Harness::new();
    let created = h.insert(run("run-1")).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = h.lifecycle.clone();
            let run = created.clone();
            tokio::spawn(async move { lifecycle.perform(run, "RUN", None, None).await })
        })
        .collect();

    for task in tasks {
        let run = task.await.unwrap().unwrap();
        assert_eq!(run.run_state(), Some(RunState::Ready));
        assert_eq!(run.status["message"], json!("ready"));
    }

    assert_eq!(h.runtime.count("run"), 1);
    assert_eq!(h.runtime.count("on_ready"), 1);
}

#[tokio::test]
async fn test_submit_persists_then_fires() {
    let h = Harness::new();

    let ready = submit(h.lifecycle.as_ref(), h.runs.as_ref(), run("run-1"), RunEvent::Run)
        .await
        .unwrap();
    assert_eq!(ready.run_state(), Some(RunState::Ready));

    let err = submit(h.lifecycle.as_ref(), h.runs.as_ref(), run("run-1"), RunEvent::Run)
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Store(_)), "{err:?}");
}
