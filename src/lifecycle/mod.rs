// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lifecycle Management
//!
//! Binds the FSM engine to persisted entities. A lifecycle manager receives a
//! request (fire an event, or reach a state), drives a fresh [`Fsm`] seeded
//! with a copy of the persisted entity and, on success, merges the result
//! back, runs stage processors, persists, and publishes a lifecycle event.
//!
//! ```text
//! request ─▶ lock(id) ─▶ load ─▶ Fsm(copy) ─▶ merge ─▶ processors ─▶ save/delete
//!                                   │                                  │
//!                                   └─ invalid transition: no-op       └─▶ publish
//! ```
//!
//! The [`KindAwareLifecycleManager`] routes requests to the manager
//! registered for an entity's kind.
//!
//! [`Fsm`]: crate::state_machine::Fsm

use std::fmt::Debug;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::state_machine::{FsmError, StateId};
use crate::store::StoreError;

mod kind_aware;
mod manager;
mod processor;

pub use kind_aware::{KindAwareLifecycleManager, KindAwareLifecycleManagerBuilder};
pub use manager::BaseLifecycleManager;
pub use processor::{stage_name, LifecycleProcessor, ProcessorRegistry, ProcessorRegistryBuilder};

/// Free-form field map used for spec, status and metadata
pub type Fields = Map<String, Value>;

/// Key of the authoritative lifecycle state inside `status`
pub const STATE_FIELD: &str = "state";

/// Result type for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Errors raised by lifecycle managers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Unknown event {0}")]
    UnknownEvent(String),

    #[error("Unknown state {0}")]
    UnknownState(String),

    #[error("Entity {0} has no valid lifecycle state")]
    MissingState(String),

    #[error("Entity {0} has no kind")]
    MissingKind(String),

    #[error("No lifecycle manager registered for kind {0}")]
    UnregisteredKind(String),

    #[error("Entity {id} of kind {kind} is not supported by this runtime")]
    Unsupported { id: String, kind: String },

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Lock timeout for entity {0}")]
    LockTimeout(String),

    #[error(transparent)]
    Fsm(#[from] FsmError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => LifecycleError::NotFound(id),
            StoreError::LockTimeout(id) => LifecycleError::LockTimeout(id),
            other => LifecycleError::Store(other),
        }
    }
}

/// A persisted entity whose lifecycle is driven by a state machine
pub trait LifecycleEntity: Clone + Debug + Serialize + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Dispatch key, e.g. `"container+run"`
    fn kind(&self) -> &str;

    fn project(&self) -> Option<&str> {
        None
    }

    fn user(&self) -> Option<&str> {
        None
    }

    fn spec(&self) -> &Fields;
    fn set_spec(&mut self, spec: Fields);

    fn status(&self) -> &Fields;
    fn set_status(&mut self, status: Fields);

    fn metadata(&self) -> &Fields;
    fn set_metadata(&mut self, metadata: Fields);

    /// Lifecycle state name stored in `status.state`
    fn state(&self) -> Option<&str> {
        self.status().get(STATE_FIELD).and_then(Value::as_str)
    }
}

/// State enum of a lifecycle
pub trait LifecycleState: StateId + FromStr {
    fn name(&self) -> &'static str;

    /// Reaching this state physically removes the entity
    fn is_deleted(&self) -> bool {
        false
    }
}

/// Event enum of a lifecycle
pub trait LifecycleTrigger: StateId + FromStr {
    fn name(&self) -> &'static str;
}

/// Callback run after a successful transition with the updated entity and
/// the raw output of the state machine
pub type SideEffect<D, O> = Box<dyn FnOnce(&D, Option<O>) + Send>;

/// Object-safe lifecycle interface shared by concrete and dispatching managers
#[async_trait]
pub trait EntityLifecycle<D, I = (), O = ()>: Send + Sync {
    /// Fire the transition declared for the named event
    ///
    /// Illegal requests leave the entity unchanged and are returned as-is.
    async fn perform(
        &self,
        entity: D,
        event: &str,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D>;

    /// Move the entity to the named state along the first declared path
    async fn handle(
        &self,
        entity: D,
        next_state: &str,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D>;
}

/// Right-biased shallow merge: later maps override earlier keys
pub fn merge_fields<'a>(maps: impl IntoIterator<Item = &'a Fields>) -> Fields {
    let mut merged = Fields::new();
    for map in maps {
        for (key, value) in map {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Status fragment carrying only the state name
pub fn state_fields<S: LifecycleState>(state: S) -> Fields {
    let mut fields = Fields::new();
    fields.insert(STATE_FIELD.to_string(), Value::String(state.name().to_string()));
    fields
}
