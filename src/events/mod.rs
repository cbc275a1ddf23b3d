// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestration Events
//!
//! Notifications emitted by the control plane. Events are immutable facts:
//! they describe a state change that already happened and are published
//! fire-and-forget.
//!
//! # Event Families
//!
//! - [`LifecycleEvent`]: an entity completed a transition (emitted by the
//!   lifecycle manager after persisting).
//! - [`RunnableChangedEvent`]: a monitor refreshed an execution handle
//!   (consumed by the runnable listener to advance the owning run).
//!
//! # Event Flow
//!
//! ```text
//! LifecycleManager ──▶ LifecycleEvent ─────────▶ EventBus ──▶ subscribers
//! ReconciliationMonitor ──▶ RunnableChangedEvent ──▶ EventBus ──▶ RunnableListener
//! ```
//!
//! # Module Organization
//!
//! - [`lifecycle`] - entity transition notifications
//! - [`runnable`] - execution handle change notifications
//! - [`bus`] - the publishing seam and its in-process implementations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subjects::{EventFamily, SubjectBuilder};

pub mod bus;
pub mod lifecycle;
pub mod runnable;

pub use bus::{BusError, CompositeEventBus, EventBus, InMemoryEventBus};
pub use lifecycle::LifecycleEvent;
pub use runnable::RunnableChangedEvent;

/// Envelope for everything published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "event", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    Lifecycle(LifecycleEvent),
    RunnableChanged(RunnableChangedEvent),
}

impl OrchestrationEvent {
    pub fn event_id(&self) -> Uuid {
        match self {
            OrchestrationEvent::Lifecycle(e) => e.event_id,
            OrchestrationEvent::RunnableChanged(e) => e.event_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            OrchestrationEvent::Lifecycle(e) => e.timestamp,
            OrchestrationEvent::RunnableChanged(e) => e.timestamp,
        }
    }

    /// Id of the entity the event is about
    pub fn entity_id(&self) -> &str {
        match self {
            OrchestrationEvent::Lifecycle(e) => &e.id,
            OrchestrationEvent::RunnableChanged(e) => &e.run_id,
        }
    }

    pub fn event_type_name(&self) -> &'static str {
        match self {
            OrchestrationEvent::Lifecycle(_) => "Lifecycle",
            OrchestrationEvent::RunnableChanged(_) => "RunnableChanged",
        }
    }

    /// Routing subject: `orchestration.{family}.{kind}.{state}`
    pub fn subject(&self) -> String {
        match self {
            OrchestrationEvent::Lifecycle(e) => SubjectBuilder::new()
                .family(EventFamily::Lifecycle)
                .kind(&e.kind)
                .state(&e.state)
                .build(),
            OrchestrationEvent::RunnableChanged(e) => SubjectBuilder::new()
                .family(EventFamily::Runnable)
                .kind(&e.framework)
                .state(e.state.as_str())
                .build(),
        }
    }
}
