// Copyright (c) 2025 - Cowboy AI, Inc.
//! State graph definition: transitions, states and the immutable graph

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{FsmError, FsmResult, StateId};

/// Logic attached to a transition
///
/// Receives the state being left, the state being entered, the triggering
/// event, the mutable context and the optional caller input. Any error is
/// reported to the caller as an invalid transition.
#[async_trait]
pub trait TransitionAction<S, E, C, I, O>: Send + Sync {
    async fn apply(
        &self,
        current: S,
        next: S,
        event: E,
        context: &mut C,
        input: Option<&I>,
    ) -> anyhow::Result<Option<O>>;
}

/// Entry/exit hook invoked with the context
pub type StateHook<C> = Arc<dyn Fn(&C) + Send + Sync>;

/// Adapter for synchronous closures
struct FnAction<F>(F);

#[async_trait]
impl<F, S, E, C, I, O> TransitionAction<S, E, C, I, O> for FnAction<F>
where
    F: Fn(&mut C, Option<&I>) -> anyhow::Result<Option<O>> + Send + Sync,
    S: StateId,
    E: StateId,
    C: Send,
    I: Sync,
    O: Send,
{
    async fn apply(
        &self,
        _current: S,
        _next: S,
        _event: E,
        context: &mut C,
        input: Option<&I>,
    ) -> anyhow::Result<Option<O>> {
        (self.0)(context, input)
    }
}

/// An edge: `event` leads to `next_state`, optionally running an action
pub struct Transition<S, E, C, I = (), O = ()> {
    event: E,
    next_state: S,
    action: Option<Arc<dyn TransitionAction<S, E, C, I, O>>>,
}

impl<S: StateId, E: StateId, C, I, O> Transition<S, E, C, I, O> {
    /// Create a transition without logic
    pub fn new(event: E, next_state: S) -> Self {
        Self {
            event,
            next_state,
            action: None,
        }
    }

    /// Attach an action
    pub fn with_action(mut self, action: impl TransitionAction<S, E, C, I, O> + 'static) -> Self {
        self.action = Some(Arc::new(action));
        self
    }

    /// Attach a synchronous closure as action
    pub fn with_fn<F>(self, f: F) -> Self
    where
        F: Fn(&mut C, Option<&I>) -> anyhow::Result<Option<O>> + Send + Sync + 'static,
        C: Send + 'static,
        I: Sync + 'static,
        O: Send + 'static,
    {
        self.with_action(FnAction(f))
    }

    pub fn event(&self) -> E {
        self.event
    }

    pub fn next_state(&self) -> S {
        self.next_state
    }

    pub fn action(&self) -> Option<&Arc<dyn TransitionAction<S, E, C, I, O>>> {
        self.action.as_ref()
    }
}

impl<S: Clone, E: Clone, C, I, O> Clone for Transition<S, E, C, I, O> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            next_state: self.next_state.clone(),
            action: self.action.clone(),
        }
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C, I, O> fmt::Debug for Transition<S, E, C, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("event", &self.event)
            .field("next_state", &self.next_state)
            .field("has_action", &self.action.is_some())
            .finish()
    }
}

/// A state together with its outgoing transitions and hooks
pub struct FsmState<S, E, C, I = (), O = ()> {
    state: S,
    transitions: Vec<Transition<S, E, C, I, O>>,
    on_entry: Option<StateHook<C>>,
    on_exit: Option<StateHook<C>>,
}

impl<S: StateId, E: StateId, C, I, O> FsmState<S, E, C, I, O> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            transitions: Vec::new(),
            on_entry: None,
            on_exit: None,
        }
    }

    /// Declare an outgoing transition
    pub fn with_transition(mut self, transition: Transition<S, E, C, I, O>) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Declare several outgoing transitions, keeping their order
    pub fn with_transitions(
        mut self,
        transitions: impl IntoIterator<Item = Transition<S, E, C, I, O>>,
    ) -> Self {
        self.transitions.extend(transitions);
        self
    }

    /// Hook run after the state has been entered
    pub fn with_entry_hook(mut self, hook: impl Fn(&C) + Send + Sync + 'static) -> Self {
        self.on_entry = Some(Arc::new(hook));
        self
    }

    /// Hook run before the state is left
    pub fn with_exit_hook(mut self, hook: impl Fn(&C) + Send + Sync + 'static) -> Self {
        self.on_exit = Some(Arc::new(hook));
        self
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn transitions(&self) -> &[Transition<S, E, C, I, O>] {
        &self.transitions
    }

    pub fn entry_hook(&self) -> Option<&StateHook<C>> {
        self.on_entry.as_ref()
    }

    pub fn exit_hook(&self) -> Option<&StateHook<C>> {
        self.on_exit.as_ref()
    }

    /// Transition declared for `event`, if any
    pub fn transition_for_event(&self, event: E) -> Option<&Transition<S, E, C, I, O>> {
        self.transitions.iter().find(|t| t.event == event)
    }

    /// First transition (in declaration order) leading to `next`
    pub fn transition_for_next(&self, next: S) -> Option<&Transition<S, E, C, I, O>> {
        self.transitions.iter().find(|t| t.next_state == next)
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C, I, O> fmt::Debug for FsmState<S, E, C, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsmState")
            .field("state", &self.state)
            .field("transitions", &self.transitions)
            .finish()
    }
}

/// Immutable state graph, shared across machines through `Arc`
pub struct StateGraph<S, E, C, I = (), O = ()> {
    states: Vec<FsmState<S, E, C, I, O>>,
    index: HashMap<S, usize>,
    error_state: Option<S>,
}

impl<S: StateId, E: StateId, C, I, O> StateGraph<S, E, C, I, O> {
    pub fn builder() -> StateGraphBuilder<S, E, C, I, O> {
        StateGraphBuilder {
            states: Vec::new(),
            error_state: None,
        }
    }

    pub fn state(&self, state: S) -> Option<&FsmState<S, E, C, I, O>> {
        self.index.get(&state).map(|i| &self.states[*i])
    }

    /// States in declaration order
    pub fn states(&self) -> impl Iterator<Item = &FsmState<S, E, C, I, O>> {
        self.states.iter()
    }

    pub fn contains(&self, state: S) -> bool {
        self.index.contains_key(&state)
    }

    pub fn error_state(&self) -> Option<S> {
        self.error_state
    }

    pub fn transition(&self, state: S, event: E) -> Option<&Transition<S, E, C, I, O>> {
        self.state(state).and_then(|s| s.transition_for_event(event))
    }

    pub fn can_perform(&self, state: S, event: E) -> bool {
        self.transition(state, event).is_some()
    }

    /// Resolve the hops leading from `source` to `target`
    ///
    /// Depth-first over declared transitions; the first path found wins. At
    /// each state an edge leading straight to `target` is taken before any
    /// other, the remaining edges are explored in declaration order. Returns
    /// an empty path when `source == target` and `None` when the target is
    /// unreachable.
    pub fn find_path(&self, source: S, target: S) -> Option<Vec<&Transition<S, E, C, I, O>>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.dfs(source, target, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn dfs<'a>(
        &'a self,
        current: S,
        target: S,
        visited: &mut HashSet<S>,
        path: &mut Vec<&'a Transition<S, E, C, I, O>>,
    ) -> bool {
        if current == target {
            return true;
        }
        visited.insert(current);

        let Some(definition) = self.state(current) else {
            return false;
        };

        if let Some(direct) = definition.transition_for_next(target) {
            path.push(direct);
            return true;
        }

        for transition in &definition.transitions {
            if visited.contains(&transition.next_state) {
                continue;
            }
            path.push(transition);
            if self.dfs(transition.next_state, target, visited, path) {
                return true;
            }
            path.pop();
        }

        false
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C, I, O> fmt::Debug for StateGraph<S, E, C, I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGraph")
            .field("states", &self.states)
            .field("error_state", &self.error_state)
            .finish()
    }
}

/// Builder for [`StateGraph`]
pub struct StateGraphBuilder<S, E, C, I = (), O = ()> {
    states: Vec<FsmState<S, E, C, I, O>>,
    error_state: Option<S>,
}

impl<S: StateId, E: StateId, C, I, O> StateGraphBuilder<S, E, C, I, O> {
    /// Add a state definition
    ///
    /// A state declared more than once is merged: transitions are appended in
    /// order and hooks are kept from the first declaration that sets them.
    pub fn state(mut self, definition: FsmState<S, E, C, I, O>) -> Self {
        match self.states.iter_mut().find(|s| s.state == definition.state) {
            Some(existing) => {
                existing.transitions.extend(definition.transitions);
                if existing.on_entry.is_none() {
                    existing.on_entry = definition.on_entry;
                }
                if existing.on_exit.is_none() {
                    existing.on_exit = definition.on_exit;
                }
            }
            None => self.states.push(definition),
        }
        self
    }

    /// Designate the fallback state used when no path can be resolved
    pub fn error_state(mut self, state: S) -> Self {
        self.error_state = Some(state);
        self
    }

    /// Validate and seal the graph
    pub fn build(self) -> FsmResult<StateGraph<S, E, C, I, O>> {
        let index: HashMap<S, usize> = self
            .states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.state, i))
            .collect();

        for definition in &self.states {
            let mut events = HashSet::new();
            for transition in &definition.transitions {
                if !events.insert(transition.event) {
                    return Err(FsmError::Configuration(format!(
                        "state {} declares event {} more than once",
                        definition.state, transition.event
                    )));
                }
                if !index.contains_key(&transition.next_state) {
                    return Err(FsmError::Configuration(format!(
                        "transition {} from {} targets undeclared state {}",
                        transition.event, definition.state, transition.next_state
                    )));
                }
            }
        }

        if let Some(error_state) = self.error_state {
            if !index.contains_key(&error_state) {
                return Err(FsmError::Configuration(format!(
                    "error state {} is not declared",
                    error_state
                )));
            }
        }

        Ok(StateGraph {
            states: self.states,
            index,
            error_state: self.error_state,
        })
    }
}
