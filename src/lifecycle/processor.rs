// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stage processors
//!
//! Processors are registered against a stage name derived from the state an
//! entity just reached (`READY` → `onReady`). Each one receives the updated
//! entity and may contribute a status fragment.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::Fields;

/// Hook run after an entity enters a stage
#[async_trait]
pub trait LifecycleProcessor<D, I>: Send + Sync {
    async fn process(&self, stage: &str, entity: &D, input: Option<&I>) -> anyhow::Result<Option<Fields>>;
}

/// Stage name for a state: `"on"` followed by the capitalized state name
pub fn stage_name(state: &str) -> String {
    let lower = state.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
        None => "on".to_string(),
    }
}

/// Processors grouped by stage, in registration order
pub struct ProcessorRegistry<D, I = ()> {
    stages: HashMap<String, Vec<Arc<dyn LifecycleProcessor<D, I>>>>,
}

impl<D, I> ProcessorRegistry<D, I> {
    pub fn builder() -> ProcessorRegistryBuilder<D, I> {
        ProcessorRegistryBuilder {
            stages: HashMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    pub fn processors(&self, stage: &str) -> &[Arc<dyn LifecycleProcessor<D, I>>] {
        self.stages.get(stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }
}

impl<D, I> Default for ProcessorRegistry<D, I> {
    fn default() -> Self {
        Self::empty()
    }
}

pub struct ProcessorRegistryBuilder<D, I = ()> {
    stages: HashMap<String, Vec<Arc<dyn LifecycleProcessor<D, I>>>>,
}

impl<D, I> ProcessorRegistryBuilder<D, I> {
    /// Register a processor for a stage such as `"onReady"`
    pub fn register(
        mut self,
        stage: impl Into<String>,
        processor: impl LifecycleProcessor<D, I> + 'static,
    ) -> Self {
        self.stages
            .entry(stage.into())
            .or_default()
            .push(Arc::new(processor));
        self
    }

    pub fn build(self) -> ProcessorRegistry<D, I> {
        ProcessorRegistry {
            stages: self.stages,
        }
    }
}
