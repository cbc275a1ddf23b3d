// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS transport for orchestration events

use async_nats::{Client, ConnectOptions, Subscriber};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::events::{BusError, EventBus, OrchestrationEvent};

/// Configuration for NATS connection
#[derive(Debug, Clone, PartialEq)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "cim-orchestrator".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// NATS client wrapper
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Create a new NATS client with the given configuration
    pub async fn new(config: NatsConfig) -> OrchestratorResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| OrchestratorError::NatsConnection(e.to_string()))?;

        info!("Connected to NATS at {:?}", config.servers);

        Ok(Self { client })
    }

    /// Publish a JSON message to a subject
    pub async fn publish<T>(&self, subject: &str, message: &T) -> OrchestratorResult<()>
    where
        T: Serialize,
    {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| OrchestratorError::NatsPublish(e.to_string()))?;

        debug!("Published message to subject: {}", subject);
        Ok(())
    }

    /// Subscribe to a subject
    pub async fn subscribe(&self, subject: &str) -> OrchestratorResult<Subscriber> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| OrchestratorError::NatsSubscribe(e.to_string()))?;

        info!("Subscribed to subject: {}", subject);
        Ok(subscriber)
    }

    /// Get the underlying NATS client for advanced operations
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Consumer of orchestration events delivered over NATS
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: OrchestrationEvent) -> OrchestratorResult<()>;

    /// Subject this handler subscribes to
    fn subject(&self) -> String;
}

/// Event bus publishing JSON envelopes to `orchestration.*` subjects
#[derive(Clone)]
pub struct NatsEventBus {
    client: NatsClient,
}

impl NatsEventBus {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &NatsClient {
        &self.client
    }

    /// Decode events on the handler's subject and feed them to it
    pub async fn run_handler<H>(&self, handler: Arc<H>) -> OrchestratorResult<JoinHandle<()>>
    where
        H: EventHandler + 'static,
    {
        let subject = handler.subject();
        let mut subscriber = self.client.subscribe(&subject).await?;

        Ok(tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<OrchestrationEvent>(&msg.payload) {
                    Ok(event) => {
                        if let Err(e) = handler.handle(event).await {
                            error!("Handler error for subject {}: {}", subject, e);
                        }
                    }
                    Err(e) => {
                        error!("Failed to deserialize event on {}: {}", subject, e);
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl EventBus for NatsEventBus {
    async fn publish(&self, event: OrchestrationEvent) -> Result<(), BusError> {
        let subject = event.subject();
        self.client
            .publish(&subject, &event)
            .await
            .map_err(|e| match e {
                OrchestratorError::Serialization(msg) => BusError::Serialization(msg),
                other => BusError::Publish(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NatsConfig::default();
        assert_eq!(config.servers, vec!["nats://localhost:4222".to_string()]);
        assert_eq!(config.name, "cim-orchestrator");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
