// Copyright (c) 2025 - Cowboy AI, Inc.
//! Generic lifecycle manager

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::{
    merge_fields, stage_name, state_fields, EntityLifecycle, Fields, LifecycleEntity,
    LifecycleError, LifecycleResult, LifecycleState, LifecycleTrigger, ProcessorRegistry,
    SideEffect,
};
use crate::events::{EventBus, LifecycleEvent, OrchestrationEvent};
use crate::state_machine::{Fsm, FsmError, StateGraph, DEFAULT_LOCK_TIMEOUT};
use crate::store::EntityStore;

enum Request<S, E> {
    Event(E),
    State(S),
}

/// Drives persisted entities of one family through a shared state graph
pub struct BaseLifecycleManager<D, S, E, I = (), O = ()> {
    family: String,
    graph: Arc<StateGraph<S, E, D, I, O>>,
    store: Arc<dyn EntityStore<D>>,
    bus: Arc<dyn EventBus>,
    processors: Arc<ProcessorRegistry<D, I>>,
    lock_timeout: Duration,
}

impl<D, S, E, I, O> BaseLifecycleManager<D, S, E, I, O>
where
    D: LifecycleEntity,
    S: LifecycleState,
    E: LifecycleTrigger,
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(
        family: impl Into<String>,
        graph: Arc<StateGraph<S, E, D, I, O>>,
        store: Arc<dyn EntityStore<D>>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            family: family.into(),
            graph,
            store,
            bus,
            processors: Arc::new(ProcessorRegistry::empty()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_processors(mut self, processors: impl Into<Arc<ProcessorRegistry<D, I>>>) -> Self {
        self.processors = processors.into();
        self
    }

    /// Bounded wait for both the store lock and the machine lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn graph(&self) -> &Arc<StateGraph<S, E, D, I, O>> {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn EntityStore<D>> {
        &self.store
    }

    /// Fire a typed event against the persisted entity
    pub async fn perform_event(
        &self,
        entity: D,
        event: E,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D> {
        self.transition(entity, Request::Event(event), input, effect)
            .await
    }

    /// Move the persisted entity to a typed target state
    pub async fn handle_state(
        &self,
        entity: D,
        next_state: S,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D> {
        self.transition(entity, Request::State(next_state), input, effect)
            .await
    }

    fn current_state(&self, entity: &D) -> LifecycleResult<S> {
        entity
            .state()
            .and_then(|name| name.parse::<S>().ok())
            .ok_or_else(|| LifecycleError::MissingState(entity.id().to_string()))
    }

    async fn transition(
        &self,
        entity: D,
        request: Request<S, E>,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D> {
        let id = entity.id().to_string();
        let label = match &request {
            Request::Event(event) => Some(event.name()),
            Request::State(_) => None,
        };

        let lock = self.store.lock(&id, self.lock_timeout).await?;

        let current = self
            .store
            .find(&id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        let state = self.current_state(&current)?;

        let fsm = Fsm::new(id.clone(), self.graph.clone(), state, current.clone())
            .with_lock_timeout(self.lock_timeout);

        let result = match request {
            Request::Event(event) => fsm.perform(event, input.as_ref()).await,
            Request::State(target) => fsm.go_to_state(target, input.as_ref()).await,
        };

        let output = match result {
            Ok(output) => output,
            Err(e) if e.is_invalid_transition() => {
                debug!(family = %self.family, %id, error = %e, "transition ignored");
                return Ok(current);
            }
            Err(FsmError::LockTimeout(..)) => return Err(LifecycleError::LockTimeout(id)),
            Err(e) => return Err(e.into()),
        };

        let (reached, context) = fsm.into_parts();
        let base = state_fields(reached);

        let mut updated = current;
        updated.set_spec(context.spec().clone());
        updated.set_metadata(context.metadata().clone());
        updated.set_status(merge_fields([context.status(), &base]));

        let stage = stage_name(reached.name());
        let fragments = self.run_processors(&stage, &updated, input.as_ref()).await;
        if !fragments.is_empty() {
            let mut layers: Vec<&Fields> = Vec::with_capacity(fragments.len() + 2);
            layers.push(context.status());
            layers.extend(fragments.iter());
            layers.push(&base);
            updated.set_status(merge_fields(layers));
        }

        if let Some(effect) = effect {
            effect(&updated, output);
        }

        if reached.is_deleted() {
            self.store.delete(&id).await?;
            debug!(family = %self.family, %id, "entity deleted");
        } else {
            self.store.save(updated.clone()).await?;
        }
        drop(lock);

        debug!(family = %self.family, %id, from = %state, to = %reached, "transition applied");
        trace!(family = %self.family, %id, status = ?updated.status(), "updated status");

        let event = LifecycleEvent::from_entity(&updated, label, reached.name());
        if let Err(e) = self.bus.publish(OrchestrationEvent::Lifecycle(event)).await {
            warn!(family = %self.family, %id, error = %e, "failed to publish lifecycle event");
        }

        Ok(updated)
    }

    async fn run_processors(&self, stage: &str, entity: &D, input: Option<&I>) -> Vec<Fields> {
        let mut fragments = Vec::new();
        for processor in self.processors.processors(stage) {
            let snapshot = entity.clone();
            match processor.process(stage, &snapshot, input).await {
                Ok(Some(fragment)) => fragments.push(fragment),
                Ok(None) => {}
                Err(e) => {
                    warn!(family = %self.family, id = entity.id(), %stage, error = %e, "processor failed");
                }
            }
        }
        fragments
    }
}

#[async_trait]
impl<D, S, E, I, O> EntityLifecycle<D, I, O> for BaseLifecycleManager<D, S, E, I, O>
where
    D: LifecycleEntity,
    S: LifecycleState,
    E: LifecycleTrigger,
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    async fn perform(
        &self,
        entity: D,
        event: &str,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D> {
        let event: E = event
            .parse()
            .map_err(|_| LifecycleError::UnknownEvent(event.to_string()))?;
        self.perform_event(entity, event, input, effect).await
    }

    async fn handle(
        &self,
        entity: D,
        next_state: &str,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D> {
        let next_state: S = next_state
            .parse()
            .map_err(|_| LifecycleError::UnknownState(next_state.to_string()))?;
        self.handle_state(entity, next_state, input, effect).await
    }
}
