// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory stores

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

use super::{EntityLock, EntityStore, RunnableStore, StoreError, StoreResult};
use crate::lifecycle::LifecycleEntity;
use crate::runs::Runnable;

type LockTable = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Entity store backed by a map, with one async mutex per id
///
/// A lock entry lives only while someone holds or waits for it.
pub struct InMemoryEntityStore<D> {
    entities: RwLock<HashMap<String, D>>,
    locks: LockTable,
}

impl<D> InMemoryEntityStore<D> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    fn mutex_for(&self, id: &str) -> StoreResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| StoreError::Backend(format!("lock table poisoned: {e}")))?;
        Ok(locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Number of ids with a live lock entry
    pub fn lock_entries(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

/// Drop the entry for `id` once the table holds the only reference
fn release_entry(locks: &LockTable, id: &str) {
    let Ok(mut locks) = locks.lock() else {
        return;
    };
    let unused = locks
        .get(id)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1);
    if unused {
        locks.remove(id);
    }
}

impl<D> Default for InMemoryEntityStore<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: LifecycleEntity> EntityStore<D> for InMemoryEntityStore<D> {
    async fn find(&self, id: &str) -> StoreResult<Option<D>> {
        Ok(self.entities.read().await.get(id).cloned())
    }

    async fn create(&self, entity: D) -> StoreResult<()> {
        let mut entities = self.entities.write().await;
        if entities.contains_key(entity.id()) {
            return Err(StoreError::AlreadyExists(entity.id().to_string()));
        }
        trace!(id = entity.id(), kind = entity.kind(), "entity created");
        entities.insert(entity.id().to_string(), entity);
        Ok(())
    }

    async fn save(&self, entity: D) -> StoreResult<()> {
        let mut entities = self.entities.write().await;
        match entities.get_mut(entity.id()) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(StoreError::NotFound(entity.id().to_string())),
        }
    }

    async fn delete(&self, id: &str) -> StoreResult<Option<D>> {
        let removed = self.entities.write().await.remove(id);
        if removed.is_some() {
            trace!(id, "entity deleted");
        }
        Ok(removed)
    }

    async fn lock(&self, id: &str, timeout: Duration) -> StoreResult<EntityLock> {
        let mutex = self.mutex_for(id)?;
        let acquired = tokio::time::timeout(timeout, mutex.lock_owned()).await;

        let Ok(guard) = acquired else {
            release_entry(&self.locks, id);
            return Err(StoreError::LockTimeout(id.to_string()));
        };
        let locks = self.locks.clone();
        let owner = id.to_string();
        Ok(EntityLock::new(id, guard).with_release(move || release_entry(&locks, &owner)))
    }
}

/// Execution handle store backed by a map
#[derive(Default)]
pub struct InMemoryRunnableStore {
    runnables: RwLock<HashMap<String, Runnable>>,
}

impl InMemoryRunnableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunnableStore for InMemoryRunnableStore {
    async fn find(&self, id: &str) -> StoreResult<Option<Runnable>> {
        Ok(self.runnables.read().await.get(id).cloned())
    }

    async fn find_all(&self) -> StoreResult<Vec<Runnable>> {
        let mut all: Vec<Runnable> = self.runnables.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn store(&self, runnable: Runnable) -> StoreResult<()> {
        self.runnables
            .write()
            .await
            .insert(runnable.id.clone(), runnable);
        Ok(())
    }

    async fn replace(&self, runnable: Runnable) -> StoreResult<bool> {
        let mut runnables = self.runnables.write().await;
        match runnables.get_mut(&runnable.id) {
            Some(slot) => {
                *slot = runnable;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &str) -> StoreResult<Option<Runnable>> {
        Ok(self.runnables.write().await.remove(id))
    }
}
