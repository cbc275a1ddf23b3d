// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run state graph
//!
//! ```text
//!  CREATED ─BUILD─▶ BUILT ─RUN─▶ READY ─SCHEDULE─▶ PENDING
//!     └────────RUN────────────▶   │                  │
//!                                 └────EXECUTE──▶ RUNNING ◀─EXECUTE─ RESUME
//!                                                  │  ↺ LOOP          ▲
//!                                  COMPLETED ◀─COMPLETE  STOP─▶ STOPPED ─RESUME
//!
//!  any live state ─ERROR─▶ ERROR      any state ─DELETE─▶ DELETING ─DELETE─▶ DELETED
//! ```
//!
//! Declaration order below is the path search tie-break after direct edges
//! to the target. Every transition
//! action is a no-op for runs marked `local_execution`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::model::{Run, RunEvent, RunState, Runnable};
use super::runtime::{Runtime, RuntimeError, RuntimeResult};
use crate::state_machine::{
    FsmResult, FsmState, StateGraph, StateGraphBuilder, Transition, TransitionAction,
};

pub type RunGraph = StateGraph<RunState, RunEvent, Run, Runnable, Runnable>;
pub type RunGraphBuilder = StateGraphBuilder<RunState, RunEvent, Run, Runnable, Runnable>;
type RunTransition = Transition<RunState, RunEvent, Run, Runnable, Runnable>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Build,
    Run,
    Schedule,
    Execute,
    Complete,
    Stop,
    Resume,
    Error,
    Deleting,
    Deleted,
}

/// Transition logic delegating to a [`Runtime`]
struct RunAction {
    step: Step,
    runtime: Arc<dyn Runtime>,
}

impl RunAction {
    /// Remove the execution handle, treating a missing one as already gone
    async fn remove(&self, run: &Run) -> RuntimeResult<Option<Runnable>> {
        match self.runtime.delete(run).await {
            Err(RuntimeError::NotFound(id)) => {
                debug!(%id, "no execution handle to delete");
                Ok(None)
            }
            other => other,
        }
    }
}

#[async_trait]
impl TransitionAction<RunState, RunEvent, Run, Runnable, Runnable> for RunAction {
    async fn apply(
        &self,
        current: RunState,
        next: RunState,
        event: RunEvent,
        run: &mut Run,
        runnable: Option<&Runnable>,
    ) -> anyhow::Result<Option<Runnable>> {
        if run.is_local_execution() {
            trace!(id = %run.id, %current, %next, "local execution, runtime skipped");
            return Ok(None);
        }

        let runtime = self.runtime.as_ref();
        debug!(id = %run.id, runtime = runtime.name(), %event, %current, %next, "runtime transition");

        match self.step {
            Step::Build => {
                let spec = runtime.build(&run.function_spec(), &run.task_spec(), run)?;
                run.spec = spec;
                Ok(None)
            }
            Step::Run => {
                let handle = runtime.run(run).await?;
                let fragment = runtime.on_ready(run, Some(&handle));
                run.merge_status(fragment);
                Ok(Some(handle))
            }
            Step::Schedule => {
                let fragment = runtime.on_pending(run, runnable);
                run.merge_status(fragment);
                Ok(None)
            }
            Step::Execute => {
                let fragment = runtime.on_running(run, runnable);
                run.merge_status(fragment);
                Ok(None)
            }
            Step::Complete => {
                let fragment = runtime.on_complete(run, runnable);
                run.merge_status(fragment);
                match runnable {
                    Some(_) => Ok(self.remove(run).await?),
                    None => Ok(None),
                }
            }
            Step::Error => {
                let fragment = runtime.on_error(run, runnable);
                run.merge_status(fragment);
                match runnable {
                    Some(_) => Ok(self.remove(run).await?),
                    None => Ok(None),
                }
            }
            Step::Stop => {
                let handle = runtime.stop(run).await?;
                let fragment = runtime.on_stopped(run, Some(&handle));
                run.merge_status(fragment);
                Ok(Some(handle))
            }
            Step::Resume => Ok(Some(runtime.resume(run).await?)),
            Step::Deleting => Ok(self.remove(run).await?),
            Step::Deleted => {
                let fragment = runtime.on_deleted(run, runnable);
                run.merge_status(fragment);
                Ok(None)
            }
        }
    }
}

fn edge(runtime: &Arc<dyn Runtime>, event: RunEvent, next: RunState, step: Step) -> RunTransition {
    Transition::new(event, next).with_action(RunAction {
        step,
        runtime: runtime.clone(),
    })
}

/// Run graph declarations without an error state
pub fn run_state_graph_builder(runtime: Arc<dyn Runtime>) -> RunGraphBuilder {
    let rt = &runtime;
    let error = || edge(rt, RunEvent::Error, RunState::Error, Step::Error);
    let delete = || edge(rt, RunEvent::Delete, RunState::Deleting, Step::Deleting);

    StateGraph::builder()
        .state(FsmState::new(RunState::Created).with_transitions([
            edge(rt, RunEvent::Build, RunState::Built, Step::Build),
            edge(rt, RunEvent::Run, RunState::Ready, Step::Run),
            error(),
            delete(),
        ]))
        .state(FsmState::new(RunState::Built).with_transitions([
            edge(rt, RunEvent::Run, RunState::Ready, Step::Run),
            error(),
            delete(),
        ]))
        .state(FsmState::new(RunState::Ready).with_transitions([
            edge(rt, RunEvent::Schedule, RunState::Pending, Step::Schedule),
            edge(rt, RunEvent::Execute, RunState::Running, Step::Execute),
            error(),
            delete(),
        ]))
        .state(FsmState::new(RunState::Pending).with_transitions([
            edge(rt, RunEvent::Execute, RunState::Running, Step::Execute),
            error(),
            delete(),
        ]))
        .state(FsmState::new(RunState::Running).with_transitions([
            edge(rt, RunEvent::Loop, RunState::Running, Step::Execute),
            edge(rt, RunEvent::Complete, RunState::Completed, Step::Complete),
            edge(rt, RunEvent::Stop, RunState::Stopped, Step::Stop),
            error(),
            delete(),
        ]))
        .state(FsmState::new(RunState::Stopped).with_transitions([
            edge(rt, RunEvent::Resume, RunState::Resume, Step::Resume),
            error(),
            delete(),
        ]))
        .state(FsmState::new(RunState::Resume).with_transitions([
            edge(rt, RunEvent::Execute, RunState::Running, Step::Execute),
            error(),
            delete(),
        ]))
        .state(FsmState::new(RunState::Completed).with_transition(delete()))
        .state(FsmState::new(RunState::Error).with_transition(delete()))
        .state(FsmState::new(RunState::Deleting).with_transition(edge(
            rt,
            RunEvent::Delete,
            RunState::Deleted,
            Step::Deleted,
        )))
        .state(FsmState::new(RunState::Deleted))
}

/// The run graph with `ERROR` as fallback state
pub fn run_state_graph(runtime: Arc<dyn Runtime>) -> FsmResult<RunGraph> {
    run_state_graph_builder(runtime)
        .error_state(RunState::Error)
        .build()
}
