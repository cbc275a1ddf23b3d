// Copyright (c) 2025 - Cowboy AI, Inc.
//! Kind-aware dispatch
//!
//! Routes lifecycle requests to the manager registered for the entity's kind.
//! The table is fixed once built.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::{EntityLifecycle, LifecycleEntity, LifecycleError, LifecycleResult, SideEffect};

type Manager<D, I, O> = Arc<dyn EntityLifecycle<D, I, O>>;

pub struct KindAwareLifecycleManager<D, I = (), O = ()> {
    managers: HashMap<String, Manager<D, I, O>>,
}

impl<D, I, O> KindAwareLifecycleManager<D, I, O>
where
    D: LifecycleEntity,
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn builder() -> KindAwareLifecycleManagerBuilder<D, I, O> {
        KindAwareLifecycleManagerBuilder {
            managers: HashMap::new(),
        }
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.managers.keys().map(String::as_str)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.managers.contains_key(kind)
    }

    /// Manager registered for the entity's kind
    pub fn manager_for(&self, entity: &D) -> LifecycleResult<&Manager<D, I, O>> {
        let kind = entity.kind();
        if kind.is_empty() {
            return Err(LifecycleError::MissingKind(entity.id().to_string()));
        }
        self.managers
            .get(kind)
            .ok_or_else(|| LifecycleError::UnregisteredKind(kind.to_string()))
    }
}

#[async_trait]
impl<D, I, O> EntityLifecycle<D, I, O> for KindAwareLifecycleManager<D, I, O>
where
    D: LifecycleEntity,
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
        let manager = self.manager_for(&entity)?.clone();
        trace!(id = entity.id(), kind = entity.kind(), event, "dispatch perform");
        manager.perform(entity, event, input, effect).await
    }

    async fn handle(
        &self,
        entity: D,
        next_state: &str,
        input: Option<I>,
        effect: Option<SideEffect<D, O>>,
    ) -> LifecycleResult<D> {
        let manager = self.manager_for(&entity)?.clone();
        trace!(id = entity.id(), kind = entity.kind(), next_state, "dispatch handle");
        manager.handle(entity, next_state, input, effect).await
    }
}

pub struct KindAwareLifecycleManagerBuilder<D, I = (), O = ()> {
    managers: HashMap<String, Manager<D, I, O>>,
}

impl<D, I, O> KindAwareLifecycleManagerBuilder<D, I, O>
where
    D: LifecycleEntity,
    I: Send + Sync + 'static,
    O: Send + 'static,
{
    /// Register the manager for a kind; a later registration replaces an earlier one
    pub fn register(mut self, kind: impl Into<String>, manager: Manager<D, I, O>) -> Self {
        self.managers.insert(kind.into(), manager);
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.managers.contains_key(kind)
    }

    pub fn build(self) -> KindAwareLifecycleManager<D, I, O> {
        KindAwareLifecycleManager {
            managers: self.managers,
        }
    }
}
