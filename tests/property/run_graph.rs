// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Run State Graph
//!
//! Every pair of run states is a valid input: path resolution must terminate
//! without revisiting a state, and requests the graph does not declare must
//! leave persisted runs untouched.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use cim_orchestrator::lifecycle::EntityLifecycle;
use cim_orchestrator::runs::{run_state_graph, RunEvent, RunGraph, RunState};
use cim_orchestrator::state_machine::Fsm;
use cim_orchestrator::store::InMemoryRunnableStore;

use crate::fixtures::{run, run_in, Harness, MockRuntime};

fn graph() -> Arc<RunGraph> {
    let runtime = Arc::new(MockRuntime::new(Arc::new(InMemoryRunnableStore::new())));
    Arc::new(run_state_graph(runtime).unwrap())
}

fn any_state() -> impl Strategy<Value = RunState> {
    prop::sample::select(RunState::ALL.to_vec())
}

fn any_event() -> impl Strategy<Value = RunEvent> {
    prop::sample::select(RunEvent::ALL.to_vec())
}

proptest! {
    #[test]
    fn path_is_connected_and_never_revisits(from in any_state(), to in any_state()) {
        let graph = graph();
        if let Some(path) = graph.find_path(from, to) {
            let mut visited = HashSet::from([from]);
            let mut current = from;
            for hop in &path {
                let declared = graph.transition(current, hop.event()).map(|t| t.next_state());
                prop_assert_eq!(declared, Some(hop.next_state()));
                prop_assert!(visited.insert(hop.next_state()), "revisited {}", hop.next_state());
                current = hop.next_state();
            }
            prop_assert_eq!(current, to);
            prop_assert!(path.len() < RunState::ALL.len());
        }
    }

    #[test]
    fn go_to_state_ends_at_target_or_error(from in any_state(), to in any_state()) {
        let graph = graph();
        let reachable = graph.find_path(from, to).is_some();
        let local = run("run-p").with_spec_value("local_execution", json!(true));
        let fsm = Fsm::new("run-p", graph, from, local);

        let result = tokio_test::block_on(fsm.go_to_state(to, None));
        prop_assert!(result.is_ok(), "{:?}", result);

        let reached = tokio_test::block_on(fsm.current_state()).unwrap();
        if reachable {
            prop_assert_eq!(reached, to);
        } else {
            prop_assert_eq!(reached, RunState::Error);
        }
    }

    #[test]
    fn undeclared_events_leave_runs_untouched(state in any_state(), event in any_event()) {
        prop_assume!(!graph().can_perform(state, event));

        let h = Harness::new();
        let (before, after, first, second) = tokio_test::block_on(async {
            let stored = h.insert(run_in("run-p", state)).await;
            let before = serde_json::to_vec(&stored).unwrap();
            let first = h.lifecycle.perform(stored, event.as_str(), None, None).await.unwrap();
            let second = h
                .lifecycle
                .perform(first.clone(), event.as_str(), None, None)
                .await
                .unwrap();
            let after = serde_json::to_vec(&h.stored("run-p").await.unwrap()).unwrap();
            (before, after, first, second)
        });

        prop_assert_eq!(before, after);
        prop_assert_eq!(first, second);
        prop_assert!(h.runtime.calls().is_empty());
    }
}
