// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run orchestration control plane for the Composable Information Machine
//!
//! Drives long-running, externally executed work items ("runs") through a
//! declared lifecycle and delegates execution to pluggable backends.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────────┐
//! request ─▶ │ KindAwareLifecycleManager│ ── kind ─▶ RunLifecycleManager ─▶ Fsm(run graph)
//!            └──────────────────────────┘                     │                   │
//!                                                             │            Runtime (backend)
//!                                   EntityStore ◀── save ─────┤
//!                                   EventBus    ◀── LifecycleEvent
//!
//! MonitorScheduler ─▶ ReconciliationMonitor ─▶ ExecutionBackend
//!                          │
//!                          └─▶ RunnableChangedEvent ─▶ RunnableListener ─▶ WorkerPool ─▶ lifecycle
//! ```
//!
//! # Modules
//!
//! - [`state_machine`] - generic lockable FSM engine with multi-hop paths
//! - [`lifecycle`] - entity lifecycle managers and kind-aware dispatch
//! - [`runs`] - the run state graph, runtime contract and runnable listener
//! - [`monitor`] - backend reconciliation loops and the worker pool
//! - [`store`] - persistence interfaces and in-memory stores
//! - [`events`], [`subjects`], [`nats`] - notifications and their transport
//! - [`config`], [`telemetry`], [`errors`] - ambient plumbing
//! - [`runtime`] - bundled runtimes

pub mod config;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod monitor;
pub mod nats;
pub mod runs;
pub mod runtime;
pub mod state_machine;
pub mod store;
pub mod subjects;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ConfigError, OrchestratorConfig};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use events::{EventBus, InMemoryEventBus, OrchestrationEvent};
pub use lifecycle::{EntityLifecycle, KindAwareLifecycleManager, LifecycleEntity, LifecycleError};
pub use monitor::{ExecutionBackend, MonitorScheduler, ReconciliationMonitor, WorkerPool};
pub use nats::{NatsClient, NatsConfig, NatsEventBus};
pub use runs::{Run, RunEvent, RunLifecycleRegistry, RunState, Runnable, RunnableListener, Runtime};
pub use state_machine::{Fsm, FsmError, StateGraph};
pub use store::{EntityStore, InMemoryEntityStore, InMemoryRunnableStore, RunnableStore};
