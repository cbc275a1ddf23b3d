// Copyright (c) 2025 - Cowboy AI, Inc.
//! Persistence Collaborators
//!
//! Storage interfaces consumed by the lifecycle manager and the
//! reconciliation monitor, plus in-memory implementations.
//!
//! # Stores
//!
//! - [`EntityStore`]: persisted lifecycle entities (runs, ...). Exposes a
//!   per-id exclusive lock so a read-merge-write sequence on one entity is a
//!   single critical section, while operations on different ids proceed in
//!   parallel.
//! - [`RunnableStore`]: execution handles tracked per backend. Callers follow
//!   a read, mutate a local copy, write back discipline.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;

use crate::runs::Runnable;

pub mod memory;

pub use memory::{InMemoryEntityStore, InMemoryRunnableStore};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by stores
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No entity with this id
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// An entity with this id already exists
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    /// The per-id lock was not acquired in time
    #[error("Lock timeout for entity {0}")]
    LockTimeout(String),

    /// Underlying storage failure
    #[error("Storage error: {0}")]
    Backend(String),
}

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Exclusive per-entity lock, released on drop
///
/// A store may attach a release hook; it runs after the guard is dropped.
pub struct EntityLock {
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
    on_release: Option<ReleaseHook>,
}

impl EntityLock {
    pub fn new(id: impl Into<String>, guard: OwnedMutexGuard<()>) -> Self {
        Self {
            id: id.into(),
            guard: Some(guard),
            on_release: None,
        }
    }

    pub fn with_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for EntityLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl fmt::Debug for EntityLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLock").field("id", &self.id).finish()
    }
}

/// Store for lifecycle entities
#[async_trait]
pub trait EntityStore<D>: Send + Sync {
    /// Load an entity by id
    async fn find(&self, id: &str) -> StoreResult<Option<D>>;

    /// Persist a new entity
    async fn create(&self, entity: D) -> StoreResult<()>;

    /// Overwrite an existing entity
    async fn save(&self, entity: D) -> StoreResult<()>;

    /// Physically remove an entity, returning the removed value
    async fn delete(&self, id: &str) -> StoreResult<Option<D>>;

    /// Acquire the exclusive lock for `id`, waiting at most `timeout`
    async fn lock(&self, id: &str, timeout: Duration) -> StoreResult<EntityLock>;
}

/// Store for execution handles
#[async_trait]
pub trait RunnableStore: Send + Sync {
    async fn find(&self, id: &str) -> StoreResult<Option<Runnable>>;

    async fn find_all(&self) -> StoreResult<Vec<Runnable>>;

    /// Insert or replace the handle with the same id
    async fn store(&self, runnable: Runnable) -> StoreResult<()>;

    /// Replace the handle only while one with the same id is still stored;
    /// `false` when it was removed meanwhile
    async fn replace(&self, runnable: Runnable) -> StoreResult<bool>;

    async fn remove(&self, id: &str) -> StoreResult<Option<Runnable>>;
}
