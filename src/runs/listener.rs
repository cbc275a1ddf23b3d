// Copyright (c) 2025 - Cowboy AI, Inc.
//! Runnable change listener
//!
//! Turns [`RunnableChangedEvent`]s into run lifecycle transitions. Each event
//! is handled as a job on a bounded [`WorkerPool`]; the caller identity of the
//! run is captured when the job is submitted and travels with it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info_span, warn, Instrument};

use super::manager::RunLifecycle;
use super::model::{Run, RunEvent, RunState, Runnable};
use crate::errors::OrchestratorResult;
use crate::events::{OrchestrationEvent, RunnableChangedEvent};
use crate::monitor::{Dispatch, WorkerPool};
use crate::nats::EventHandler;
use crate::store::EntityStore;
use crate::subjects::subjects;

/// Caller identity attached to asynchronous lifecycle work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    System,
}

impl Identity {
    pub fn for_owner(user: Option<&str>) -> Self {
        match user {
            Some(user) if !user.is_empty() => Identity::User(user.to_string()),
            _ => Identity::System,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(user) => write!(f, "user:{user}"),
            Identity::System => write!(f, "system"),
        }
    }
}

/// Lifecycle request derived from an observed execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAction {
    /// Move the run to this state
    Handle(RunState),
    /// The run is already running: fire `LOOP`
    Loop,
}

impl ListenerAction {
    pub fn for_change(observed: RunState, current: Option<RunState>) -> Option<Self> {
        match observed {
            RunState::Completed | RunState::Error | RunState::Stopped | RunState::Deleted => {
                Some(ListenerAction::Handle(observed))
            }
            RunState::Running if current == Some(RunState::Running) => Some(ListenerAction::Loop),
            RunState::Running => Some(ListenerAction::Handle(RunState::Running)),
            _ => None,
        }
    }
}

pub struct RunnableListener {
    runs: Arc<dyn EntityStore<Run>>,
    lifecycle: Arc<RunLifecycle>,
    pool: WorkerPool,
}

impl RunnableListener {
    pub fn new(runs: Arc<dyn EntityStore<Run>>, lifecycle: Arc<RunLifecycle>, pool: WorkerPool) -> Self {
        Self {
            runs,
            lifecycle,
            pool,
        }
    }

    /// Dispatch the lifecycle work for one change; `None` when nothing applies
    pub async fn receive(&self, event: RunnableChangedEvent) -> Option<Dispatch> {
        let run = match self.runs.find(&event.run_id).await {
            Ok(Some(run)) => run,
            Ok(None) => {
                error!(run_id = %event.run_id, "run for execution handle not found");
                return None;
            }
            Err(e) => {
                error!(run_id = %event.run_id, error = %e, "failed to load run");
                return None;
            }
        };

        let Some(action) = ListenerAction::for_change(event.state, run.run_state()) else {
            debug!(run_id = %event.run_id, state = %event.state, "state not handled");
            return None;
        };

        let identity = Identity::for_owner(event.user.as_deref().or(run.user.as_deref()));
        let span = info_span!("runnable_changed", run_id = %run.id, identity = %identity);
        let lifecycle = self.lifecycle.clone();
        let job = apply(lifecycle, identity, run, event.runnable, action).instrument(span);

        Some(self.pool.submit(job).await)
    }

    /// Consume runnable changes from an in-process bus until it closes
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<OrchestrationEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(OrchestrationEvent::RunnableChanged(event)) => {
                        self.receive(event).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "runnable listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("runnable listener stopped");
        })
    }

    pub async fn shutdown(self) {
        self.pool.shutdown().await;
    }
}

async fn apply(
    lifecycle: Arc<RunLifecycle>,
    identity: Identity,
    run: Run,
    runnable: Runnable,
    action: ListenerAction,
) {
    let id = run.id.clone();
    let result = match action {
        ListenerAction::Loop => {
            lifecycle
                .perform(run, RunEvent::Loop.as_str(), Some(runnable), None)
                .await
        }
        ListenerAction::Handle(state) => {
            lifecycle
                .handle(run, state.as_str(), Some(runnable), None)
                .await
        }
    };

    match result {
        Ok(run) => debug!(%id, %identity, state = ?run.run_state(), "run updated"),
        Err(e) => error!(%id, %identity, error = %e, "run update failed"),
    }
}

#[async_trait]
impl EventHandler for RunnableListener {
    async fn handle(&self, event: OrchestrationEvent) -> OrchestratorResult<()> {
        if let OrchestrationEvent::RunnableChanged(event) = event {
            self.receive(event).await;
        }
        Ok(())
    }

    fn subject(&self) -> String {
        subjects::all_runnable_events()
    }
}
