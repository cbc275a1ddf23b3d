// Copyright (c) 2025 - Cowboy AI, Inc.
//! Execution handle change notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::runs::{RunState, Runnable};

/// A monitor refreshed an execution handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnableChangedEvent {
    pub event_id: Uuid,
    pub run_id: String,
    pub state: RunState,
    pub framework: String,
    pub task: Option<String>,
    pub project: Option<String>,
    pub user: Option<String>,
    pub runnable: Runnable,
    pub timestamp: DateTime<Utc>,
}

impl RunnableChangedEvent {
    pub fn from_runnable(runnable: &Runnable) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            run_id: runnable.id.clone(),
            state: runnable.state,
            framework: runnable.framework.clone(),
            task: runnable.task.clone(),
            project: runnable.project.clone(),
            user: runnable.user.clone(),
            runnable: runnable.clone(),
            timestamp: Utc::now(),
        }
    }
}
