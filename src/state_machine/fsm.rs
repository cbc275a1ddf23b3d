// Copyright (c) 2025 - Cowboy AI, Inc.
//! Lockable state machine instance

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

use super::graph::{StateGraph, Transition};
use super::{FsmError, FsmResult, StateId};

/// Default bounded wait for the instance lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Listener notified after every state change
pub type StateChangeListener<S, C> = Arc<dyn Fn(S, &C) + Send + Sync>;

struct FsmInner<S, C> {
    current: S,
    context: C,
}

/// A state machine instance over a shared [`StateGraph`]
///
/// The instance owns its context; callers seed it with a copy of whatever
/// they want the transitions to work on and read it back once done.
pub struct Fsm<S, E, C, I = (), O = ()> {
    id: String,
    graph: Arc<StateGraph<S, E, C, I, O>>,
    inner: Mutex<FsmInner<S, C>>,
    lock_timeout: Duration,
    listener: Option<StateChangeListener<S, C>>,
}

impl<S, E, C, I, O> Fsm<S, E, C, I, O>
where
    S: StateId,
    E: StateId,
    C: Send + 'static,
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(
        id: impl Into<String>,
        graph: Arc<StateGraph<S, E, C, I, O>>,
        initial_state: S,
        context: C,
    ) -> Self {
        Self {
            id: id.into(),
            graph,
            inner: Mutex::new(FsmInner {
                current: initial_state,
                context,
            }),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            listener: None,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_state_change_listener(
        mut self,
        listener: impl Fn(S, &C) + Send + Sync + 'static,
    ) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn graph(&self) -> &StateGraph<S, E, C, I, O> {
        &self.graph
    }

    pub async fn current_state(&self) -> FsmResult<S> {
        Ok(self.lock().await?.current)
    }

    pub async fn context(&self) -> FsmResult<C>
    where
        C: Clone,
    {
        Ok(self.lock().await?.context.clone())
    }

    /// Consume the machine, returning the final state and context
    pub fn into_parts(self) -> (S, C) {
        let inner = self.inner.into_inner();
        (inner.current, inner.context)
    }

    /// Fire the single transition declared for `event` from the current state
    pub async fn perform(&self, event: E, input: Option<&I>) -> FsmResult<Option<O>> {
        let mut inner = self.lock().await?;
        let current = inner.current;

        let Some(transition) = self.graph.transition(current, event) else {
            return Err(FsmError::InvalidTransition {
                from: current.to_string(),
                to: event.to_string(),
                reason: format!("no transition declared for event {event} in {}", self.id),
            });
        };

        debug!(fsm = %self.id, %current, %event, next = %transition.next_state(), "perform");
        self.execute_hop(&mut inner, transition, input).await
    }

    /// Move to `target` along the first declared path found
    ///
    /// Every hop runs its action, the exit hook of the state being left, the
    /// state change, the listener and the entry hook of the new state. When
    /// the target is unreachable the machine falls back to the error state,
    /// or fails with a configuration error when none is declared. A failing
    /// hop leaves the machine at the last completed state.
    pub async fn go_to_state(&self, target: S, input: Option<&I>) -> FsmResult<Option<O>> {
        let mut inner = self.lock().await?;
        let current = inner.current;

        let Some(path) = self.graph.find_path(current, target) else {
            return self.go_to_error_state(&mut inner, target);
        };

        debug!(fsm = %self.id, %current, %target, hops = path.len(), "go to state");

        let mut output = None;
        for transition in path {
            if let Some(result) = self.execute_hop(&mut inner, transition, input).await? {
                output = Some(result);
            }
        }

        Ok(output)
    }

    fn go_to_error_state(
        &self,
        inner: &mut FsmInner<S, C>,
        target: S,
    ) -> FsmResult<Option<O>> {
        let current = inner.current;
        let Some(error_state) = self.graph.error_state() else {
            return Err(FsmError::Configuration(format!(
                "no path from {current} to {target} and no error state set for {}",
                self.id
            )));
        };

        debug!(fsm = %self.id, %current, %target, %error_state, "no path, falling back to error state");
        inner.current = error_state;
        self.notify(error_state, &inner.context);
        if let Some(hook) = self.graph.state(error_state).and_then(|s| s.entry_hook()) {
            hook(&inner.context);
        }

        Ok(None)
    }

    async fn execute_hop(
        &self,
        inner: &mut FsmInner<S, C>,
        transition: &Transition<S, E, C, I, O>,
        input: Option<&I>,
    ) -> FsmResult<Option<O>> {
        let from = inner.current;
        let to = transition.next_state();
        let event = transition.event();

        let mut output = None;
        if let Some(action) = transition.action() {
            output = action
                .apply(from, to, event, &mut inner.context, input)
                .await
                .map_err(|e| FsmError::InvalidTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                    reason: format!("{e:#}"),
                })?;
        }

        if let Some(hook) = self.graph.state(from).and_then(|s| s.exit_hook()) {
            hook(&inner.context);
        }

        inner.current = to;
        trace!(fsm = %self.id, %from, %to, %event, "state changed");
        self.notify(to, &inner.context);

        if let Some(hook) = self.graph.state(to).and_then(|s| s.entry_hook()) {
            hook(&inner.context);
        }

        Ok(output)
    }

    fn notify(&self, state: S, context: &C) {
        if let Some(listener) = &self.listener {
            listener(state, context);
        }
    }

    async fn lock(&self) -> FsmResult<MutexGuard<'_, FsmInner<S, C>>> {
        tokio::time::timeout(self.lock_timeout, self.inner.lock())
            .await
            .map_err(|_| FsmError::LockTimeout(self.lock_timeout, self.id.clone()))
    }
}
