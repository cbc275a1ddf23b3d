// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle transition notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::lifecycle::LifecycleEntity;

/// An entity completed a transition and was persisted (or deleted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub event_id: Uuid,
    pub id: String,
    pub kind: String,
    pub project: Option<String>,
    pub user: Option<String>,
    /// Triggering event name, absent for state-driven transitions
    pub event: Option<String>,
    pub state: String,
    /// Snapshot of the entity after the transition
    pub entity: Value,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn from_entity<D: LifecycleEntity>(entity: &D, event: Option<&str>, state: &str) -> Self {
        let snapshot = serde_json::to_value(entity).unwrap_or_else(|e| {
            warn!(id = entity.id(), error = %e, "entity snapshot not serializable");
            Value::Null
        });

        Self {
            event_id: Uuid::now_v7(),
            id: entity.id().to_string(),
            kind: entity.kind().to_string(),
            project: entity.project().map(str::to_string),
            user: entity.user().map(str::to_string),
            event: event.map(str::to_string),
            state: state.to_string(),
            entity: snapshot,
            timestamp: Utc::now(),
        }
    }
}
