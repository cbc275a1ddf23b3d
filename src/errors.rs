// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for orchestration operations
//!
//! Each module owns a focused error enum; [`OrchestratorError`] collects them
//! for callers that wire the whole control plane together.

use thiserror::Error;

use crate::config::ConfigError;
use crate::events::BusError;
use crate::lifecycle::LifecycleError;
use crate::monitor::BackendError;
use crate::runs::RuntimeError;
use crate::state_machine::FsmError;
use crate::store::StoreError;

/// Errors that can occur while running the control plane
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// NATS connection error
    #[error("NATS connection error: {0}")]
    NatsConnection(String),

    /// NATS publish error
    #[error("NATS publish error: {0}")]
    NatsPublish(String),

    /// NATS subscribe error
    #[error("NATS subscribe error: {0}")]
    NatsSubscribe(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Fsm(#[from] FsmError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result type for orchestration operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<async_nats::Error> for OrchestratorError {
    fn from(err: async_nats::Error) -> Self {
        OrchestratorError::NatsConnection(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}
