// Copyright (c) 2025 - Cowboy AI, Inc.

//! NATS subject hierarchy for orchestration events
//!
//! # Subject Pattern
//!
//! ```text
//! orchestration.{family}.{kind}.{state}
//! ```
//!
//! `kind` is the entity kind for lifecycle events (`simulated+run`) and the
//! framework for runnable events (`simulated`). States are lower-cased.
//!
//! This allows for:
//! - Precise subscriptions (`orchestration.lifecycle.container+run.completed`)
//! - Family wildcards (`orchestration.runnable.>`)
//! - Global subscriptions (`orchestration.>`)
//!
//! # Examples
//!
//! ```rust
//! use cim_orchestrator::subjects::{EventFamily, SubjectBuilder};
//!
//! let subject = SubjectBuilder::new()
//!     .family(EventFamily::Lifecycle)
//!     .kind("container+run")
//!     .state("COMPLETED")
//!     .build();
//! assert_eq!(subject, "orchestration.lifecycle.container+run.completed");
//!
//! // unset segments become single-token wildcards
//! let any_state = SubjectBuilder::new()
//!     .family(EventFamily::Runnable)
//!     .kind("simulated")
//!     .build();
//! assert_eq!(any_state, "orchestration.runnable.simulated.*");
//! ```

use std::fmt;

/// Root namespace for all orchestration subjects
pub const ORCHESTRATION_ROOT: &str = "orchestration";

/// Event families published by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFamily {
    /// Entity lifecycle transitions
    Lifecycle,
    /// Execution handle refreshes
    Runnable,
}

impl fmt::Display for EventFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFamily::Lifecycle => write!(f, "lifecycle"),
            EventFamily::Runnable => write!(f, "runnable"),
        }
    }
}

/// Replace characters that are not valid inside a subject token
pub fn sanitize_token(token: &str) -> String {
    let cleaned: String = token
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Builder for orchestration NATS subjects
#[derive(Debug, Clone, Default)]
pub struct SubjectBuilder {
    family: Option<EventFamily>,
    kind: Option<String>,
    state: Option<String>,
}

impl SubjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(mut self, family: EventFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = Some(sanitize_token(kind));
        self
    }

    pub fn state(mut self, state: &str) -> Self {
        self.state = Some(sanitize_token(&state.to_lowercase()));
        self
    }

    /// Build the subject, using `*` for any segment left unset
    pub fn build(self) -> String {
        let family = self
            .family
            .map(|f| f.to_string())
            .unwrap_or_else(|| "*".to_string());
        let kind = self.kind.unwrap_or_else(|| "*".to_string());
        let state = self.state.unwrap_or_else(|| "*".to_string());
        format!("{ORCHESTRATION_ROOT}.{family}.{kind}.{state}")
    }

    /// Build a trailing wildcard below the deepest segment set
    ///
    /// Returns `orchestration.>`, `orchestration.{family}.>` or
    /// `orchestration.{family}.{kind}.>`.
    pub fn build_wildcard(self) -> String {
        match (self.family, self.kind) {
            (Some(family), Some(kind)) => format!("{ORCHESTRATION_ROOT}.{family}.{kind}.>"),
            (Some(family), None) => format!("{ORCHESTRATION_ROOT}.{family}.>"),
            (None, _) => Self::build_all(),
        }
    }

    /// Subscription for every orchestration event
    pub fn build_all() -> String {
        format!("{ORCHESTRATION_ROOT}.>")
    }
}

/// Convenience functions for common subject patterns
pub mod subjects {
    use super::*;

    pub fn lifecycle(kind: &str, state: &str) -> String {
        SubjectBuilder::new()
            .family(EventFamily::Lifecycle)
            .kind(kind)
            .state(state)
            .build()
    }

    pub fn runnable(framework: &str, state: &str) -> String {
        SubjectBuilder::new()
            .family(EventFamily::Runnable)
            .kind(framework)
            .state(state)
            .build()
    }

    pub fn all_lifecycle_events() -> String {
        SubjectBuilder::new()
            .family(EventFamily::Lifecycle)
            .build_wildcard()
    }

    pub fn all_runnable_events() -> String {
        SubjectBuilder::new()
            .family(EventFamily::Runnable)
            .build_wildcard()
    }

    pub fn all_orchestration_events() -> String {
        SubjectBuilder::build_all()
    }
}
