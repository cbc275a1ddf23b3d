// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Engine
//!
//! Generic, lockable state machine used to drive entity lifecycles. A machine
//! is parameterized by:
//!
//! - `S`: the state type (a closed enum)
//! - `E`: the event type (a closed enum)
//! - `C`: the mutable context carried through transitions
//! - `I`: optional input handed to transition actions
//! - `O`: optional output produced by transition actions
//!
//! # Structure
//!
//! ```text
//! StateGraph (immutable, shared)          Fsm (per invocation)
//! ┌──────────────────────────────┐       ┌──────────────────────┐
//! │ FsmState ─┬─ Transition(e,s) │ ◀──── │ current state        │
//! │           └─ Transition(e,s) │       │ context (owned copy) │
//! │ FsmState ─── ...             │       │ lock (bounded wait)  │
//! │ error state                  │       └──────────────────────┘
//! └──────────────────────────────┘
//! ```
//!
//! The graph is built once through [`StateGraph::builder`] and never mutated
//! afterwards. Each [`Fsm`] owns its context and serializes every mutating
//! call behind an exclusive lock with a bounded wait.
//!
//! # Operations
//!
//! - [`Fsm::perform`] fires exactly the transition declared for an event.
//! - [`Fsm::go_to_state`] resolves a multi-hop path with a depth-first search
//!   over declared transitions (direct edges to the target first, then
//!   declaration order; first path wins) and executes every hop in order.
//!
//! # Example
//!
//! ```rust
//! use cim_orchestrator::state_machine::{Fsm, FsmState, StateGraph, Transition};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let graph: StateGraph<&str, &str, u32> = StateGraph::builder()
//!     .state(FsmState::new("off").with_transition(Transition::new("press", "on")))
//!     .state(FsmState::new("on").with_transition(Transition::new("press", "off")))
//!     .build()
//!     .unwrap();
//!
//! let fsm = Fsm::new("switch-1", Arc::new(graph), "off", 0);
//! fsm.perform("press", None).await.unwrap();
//! assert_eq!(fsm.current_state().await.unwrap(), "on");
//! # });
//! ```

mod fsm;
mod graph;

pub use fsm::{Fsm, StateChangeListener, DEFAULT_LOCK_TIMEOUT};
pub use graph::{FsmState, StateGraph, StateGraphBuilder, StateHook, Transition, TransitionAction};

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Bound for state and event identifiers
///
/// Blanket-implemented for any small copyable, hashable, printable type, so
/// plain enums (and `&'static str` in tests) work out of the box.
pub trait StateId: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> StateId for T where T: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Result of a state machine operation
pub type FsmResult<T> = Result<T, FsmError>;

/// Errors raised by the state machine engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    /// No declared edge for the request, or the transition action failed
    #[error("Invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// The graph cannot satisfy the request and has no fallback
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The instance lock could not be acquired within the bounded wait
    #[error("Lock not acquired within {0:?} for {1}")]
    LockTimeout(std::time::Duration, String),
}

impl FsmError {
    /// Whether this error is the non-fatal "ignore illegal request" signal
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, FsmError::InvalidTransition { .. })
    }
}
