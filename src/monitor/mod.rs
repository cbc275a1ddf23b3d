// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reconciliation Monitor
//!
//! Periodically polls execution backends for the status of tracked execution
//! handles, refreshes them, persists them and publishes a
//! [`RunnableChangedEvent`] per handle. The runnable listener turns those
//! events back into lifecycle transitions.
//!
//! ```text
//! MonitorScheduler ──tick──▶ ReconciliationMonitor ──status/results/logs/metrics──▶ ExecutionBackend
//!                                   │
//!                                   ├─▶ RunnableStore (write back)
//!                                   └─▶ EventBus (RunnableChangedEvent) ──▶ RunnableListener
//! ```
//!
//! The core status facet decides the handle state. Results, logs and
//! metrics are best effort: a failing facet is logged and skipped.
//!
//! [`RunnableChangedEvent`]: crate::events::RunnableChangedEvent

use async_trait::async_trait;
use serde_json::Value;

use crate::lifecycle::Fields;
use crate::runs::{LogEntry, RunState, Runnable};

pub mod pool;
mod reconciler;
mod scheduler;

pub use pool::{Dispatch, WorkerPool};
pub use reconciler::ReconciliationMonitor;
pub use scheduler::MonitorScheduler;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Malformed backend response: {0}")]
    Malformed(String),
}

/// Execution status reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Succeeded,
    Failed { reason: Option<String> },
    Active,
    Pending,
    /// The backend has no resource for the handle
    Missing,
}

impl BackendStatus {
    /// Run state and error message derived from a backend status
    pub fn to_run_state(&self, runnable_id: &str) -> (RunState, Option<String>) {
        match self {
            BackendStatus::Succeeded => (RunState::Completed, None),
            BackendStatus::Failed { reason } => (RunState::Error, reason.clone()),
            BackendStatus::Active => (RunState::Running, None),
            BackendStatus::Pending => (RunState::Pending, None),
            BackendStatus::Missing => (
                RunState::Error,
                Some(format!("execution resource for {runnable_id} no longer exists")),
            ),
        }
    }
}

/// Status source for one execution framework
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Framework name, matched against [`Runnable::framework`]
    fn name(&self) -> &str;

    /// Push-model backends have every handle refreshed on each tick
    fn push_model(&self) -> bool {
        false
    }

    async fn status(&self, runnable: &Runnable) -> Result<BackendStatus, BackendError>;

    async fn results(&self, _runnable: &Runnable) -> Result<Option<Fields>, BackendError> {
        Ok(None)
    }

    async fn logs(&self, _runnable: &Runnable) -> Result<Vec<LogEntry>, BackendError> {
        Ok(Vec::new())
    }

    async fn metrics(&self, _runnable: &Runnable) -> Result<Vec<Value>, BackendError> {
        Ok(Vec::new())
    }
}
