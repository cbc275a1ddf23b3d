// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-process simulated execution cluster
//!
//! Implements both sides of a backend: the [`Runtime`] used by run
//! transitions and the [`ExecutionBackend`] polled by the monitor. Each
//! dispatched run becomes a job that reports `Active` for a number of polls
//! and then its scripted outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::lifecycle::Fields;
use crate::monitor::{BackendError, BackendStatus, ExecutionBackend};
use crate::runs::{LogEntry, Run, RunState, Runnable, Runtime, RuntimeError, RuntimeResult};
use crate::store::RunnableStore;

/// Framework and runtime name of the simulated cluster
pub const SIMULATED: &str = "simulated";

#[derive(Debug, Clone)]
struct Job {
    polls: u32,
    remaining: u32,
    outcome: BackendStatus,
}

pub struct SimulatedCluster {
    runnables: Arc<dyn RunnableStore>,
    jobs: Mutex<HashMap<String, Job>>,
    polls_to_finish: u32,
    outcome: BackendStatus,
}

impl SimulatedCluster {
    /// Jobs succeed after two active polls by default
    pub fn new(runnables: Arc<dyn RunnableStore>) -> Self {
        Self {
            runnables,
            jobs: Mutex::new(HashMap::new()),
            polls_to_finish: 2,
            outcome: BackendStatus::Succeeded,
        }
    }

    pub fn with_polls(mut self, polls: u32) -> Self {
        self.polls_to_finish = polls;
        self
    }

    /// Final status reported by newly dispatched jobs
    pub fn with_outcome(mut self, outcome: BackendStatus) -> Self {
        self.outcome = outcome;
        self
    }

    /// Force the final status of a running job; `false` if it is unknown
    pub fn script(&self, run_id: &str, outcome: BackendStatus) -> bool {
        match self.jobs.lock() {
            Ok(mut jobs) => match jobs.get_mut(run_id) {
                Some(job) => {
                    job.remaining = 0;
                    job.outcome = outcome;
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    /// Drop a job as if its backend resource vanished
    pub fn forget(&self, run_id: &str) -> bool {
        self.jobs
            .lock()
            .map(|mut jobs| jobs.remove(run_id).is_some())
            .unwrap_or(false)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<String, Job>>, String> {
        self.jobs.lock().map_err(|e| format!("job table poisoned: {e}"))
    }

    async fn save(&self, runnable: Runnable) -> RuntimeResult<Runnable> {
        self.runnables
            .store(runnable.clone())
            .await
            .map_err(|e| RuntimeError::Dispatch {
                id: runnable.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(runnable)
    }

    async fn transition_handle(&self, run: &Run, state: RunState, message: &str) -> RuntimeResult<Runnable> {
        let known = {
            let jobs = self.jobs().map_err(|reason| RuntimeError::Dispatch {
                id: run.id.clone(),
                reason,
            })?;
            jobs.contains_key(&run.id)
        };
        if !known {
            return Err(RuntimeError::NotFound(run.id.clone()));
        }

        let mut runnable = self
            .runnables
            .find(&run.id)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| Runnable::for_run(run, SIMULATED));
        runnable.state = state;
        runnable.message = Some(message.to_string());
        self.save(runnable).await
    }
}

fn message(text: impl Into<String>) -> Option<Fields> {
    let mut fields = Fields::new();
    fields.insert("message".to_string(), Value::String(text.into()));
    Some(fields)
}

#[async_trait]
impl Runtime for SimulatedCluster {
    fn name(&self) -> &str {
        SIMULATED
    }

    async fn run(&self, run: &Run) -> RuntimeResult<Runnable> {
        {
            let mut jobs = self.jobs().map_err(|reason| RuntimeError::Dispatch {
                id: run.id.clone(),
                reason,
            })?;
            jobs.insert(
                run.id.clone(),
                Job {
                    polls: self.polls_to_finish,
                    remaining: self.polls_to_finish,
                    outcome: self.outcome.clone(),
                },
            );
        }

        let mut runnable = Runnable::for_run(run, SIMULATED).with_state(RunState::Running);
        runnable.message = Some("dispatched".to_string());
        info!(id = %run.id, "job dispatched to simulated cluster");
        self.save(runnable).await
    }

    async fn stop(&self, run: &Run) -> RuntimeResult<Runnable> {
        self.transition_handle(run, RunState::Stopped, "stopped").await
    }

    async fn resume(&self, run: &Run) -> RuntimeResult<Runnable> {
        self.transition_handle(run, RunState::Running, "resumed").await
    }

    async fn delete(&self, run: &Run) -> RuntimeResult<Option<Runnable>> {
        let had_job = self.forget(&run.id);
        let removed = self
            .runnables
            .remove(&run.id)
            .await
            .map_err(|e| RuntimeError::Dispatch {
                id: run.id.clone(),
                reason: e.to_string(),
            })?;

        if !had_job && removed.is_none() {
            return Err(RuntimeError::NotFound(run.id.clone()));
        }
        debug!(id = %run.id, "simulated job removed");
        Ok(removed)
    }

    fn on_ready(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        message("dispatched to simulated cluster")
    }

    fn on_pending(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        message("waiting for capacity")
    }

    fn on_running(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        message("running")
    }

    fn on_complete(&self, _run: &Run, runnable: Option<&Runnable>) -> Option<Fields> {
        let mut fields = message("completed")?;
        if let Some(runnable) = runnable.filter(|r| !r.results.is_empty()) {
            fields.insert("results".to_string(), Value::Object(runnable.results.clone()));
        }
        Some(fields)
    }

    fn on_stopped(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        message("stopped")
    }

    fn on_error(&self, _run: &Run, runnable: Option<&Runnable>) -> Option<Fields> {
        let reason = runnable
            .and_then(|r| r.error.clone())
            .unwrap_or_else(|| "failed".to_string());
        message(reason)
    }

    fn on_deleted(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        message("deleted")
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedCluster {
    fn name(&self) -> &str {
        SIMULATED
    }

    async fn status(&self, runnable: &Runnable) -> Result<BackendStatus, BackendError> {
        let mut jobs = self.jobs().map_err(|reason| BackendError::Unavailable {
            backend: SIMULATED.to_string(),
            reason,
        })?;
        let Some(job) = jobs.get_mut(&runnable.id) else {
            return Ok(BackendStatus::Missing);
        };
        if job.remaining > 0 {
            job.remaining -= 1;
            return Ok(BackendStatus::Active);
        }
        Ok(job.outcome.clone())
    }

    async fn results(&self, runnable: &Runnable) -> Result<Option<Fields>, BackendError> {
        let jobs = self.jobs().map_err(|reason| BackendError::Unavailable {
            backend: SIMULATED.to_string(),
            reason,
        })?;
        Ok(jobs
            .get(&runnable.id)
            .filter(|job| job.remaining == 0 && job.outcome == BackendStatus::Succeeded)
            .and_then(|job| json!({"exit_code": 0, "polls": job.polls}).as_object().cloned()))
    }

    async fn logs(&self, runnable: &Runnable) -> Result<Vec<LogEntry>, BackendError> {
        let jobs = self.jobs().map_err(|reason| BackendError::Unavailable {
            backend: SIMULATED.to_string(),
            reason,
        })?;
        Ok(jobs
            .get(&runnable.id)
            .map(|job| {
                vec![LogEntry {
                    source: "main".to_string(),
                    content: format!("poll {}/{}", job.polls - job.remaining, job.polls),
                }]
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRunnableStore;

    fn cluster() -> SimulatedCluster {
        SimulatedCluster::new(Arc::new(InMemoryRunnableStore::new())).with_polls(1)
    }

    #[tokio::test]
    async fn test_job_reports_active_then_outcome() {
        let cluster = cluster();
        let run = Run::new("run-1", "simulated+run");
        let handle = Runtime::run(&cluster, &run).await.unwrap();
        assert_eq!(handle.state, RunState::Running);

        assert_eq!(cluster.status(&handle).await.unwrap(), BackendStatus::Active);
        assert_eq!(cluster.status(&handle).await.unwrap(), BackendStatus::Succeeded);
        assert!(cluster.results(&handle).await.unwrap().is_some());
        assert_eq!(cluster.logs(&handle).await.unwrap()[0].content, "poll 1/1");
    }

    #[tokio::test]
    async fn test_scripted_outcome_and_missing_job() {
        let cluster = cluster();
        let run = Run::new("run-1", "simulated+run");
        let handle = Runtime::run(&cluster, &run).await.unwrap();

        assert!(cluster.script("run-1", BackendStatus::Failed { reason: Some("oom".into()) }));
        assert_eq!(
            cluster.status(&handle).await.unwrap(),
            BackendStatus::Failed { reason: Some("oom".into()) }
        );

        assert!(cluster.forget("run-1"));
        assert_eq!(cluster.status(&handle).await.unwrap(), BackendStatus::Missing);
    }

    #[tokio::test]
    async fn test_delete_unknown_run_is_not_found() {
        let cluster = cluster();
        let run = Run::new("ghost", "simulated+run");
        assert_eq!(
            cluster.delete(&run).await,
            Err(RuntimeError::NotFound("ghost".into()))
        );
        assert_eq!(
            cluster.stop(&run).await,
            Err(RuntimeError::NotFound("ghost".into()))
        );
    }
}
