// Copyright (c) 2025 - Cowboy AI, Inc.
//! Event bus seam
//!
//! Publishing is fire-and-forget: callers log failures and carry on.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use super::OrchestrationEvent;

/// Errors raised while publishing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Publish error: {0}")]
    Publish(String),
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: OrchestrationEvent) -> Result<(), BusError>;
}

/// In-process bus over a tokio broadcast channel
///
/// Publishing with no live subscriber is not an error. Slow subscribers
/// observe `Lagged` and lose the oldest events.
#[derive(Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<OrchestrationEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: OrchestrationEvent) -> Result<(), BusError> {
        match self.sender.send(event) {
            Ok(receivers) => trace!(receivers, "event broadcast"),
            Err(broadcast::error::SendError(event)) => {
                trace!(event_id = %event.event_id(), "no subscribers, event dropped");
            }
        }
        Ok(())
    }
}

/// Publishes every event to each inner bus in order
///
/// All buses are attempted; the first failure is returned.
#[derive(Clone, Default)]
pub struct CompositeEventBus {
    buses: Vec<Arc<dyn EventBus>>,
}

impl CompositeEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.buses.push(bus);
        self
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }
}

#[async_trait]
impl EventBus for CompositeEventBus {
    async fn publish(&self, event: OrchestrationEvent) -> Result<(), BusError> {
        let mut first_error = None;
        for bus in &self.buses {
            if let Err(e) = bus.publish(event.clone()).await {
                warn!(event_id = %event.event_id(), error = %e, "bus publish failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
