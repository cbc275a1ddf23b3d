// Copyright (c) 2025 - Cowboy AI, Inc.
//! Runs
//!
//! A run is a unit of work executed by an external backend. Its lifecycle is
//! declared once in [`graph`] and delegated to a [`Runtime`] per backend; the
//! execution handle ([`Runnable`]) is what the backend knows about the run.
//!
//! # Module Organization
//!
//! - [`model`] - runs, states, events and execution handles
//! - [`runtime`] - the backend contract used by transition actions
//! - [`graph`] - the run state graph and its runtime-backed actions
//! - [`manager`] - run lifecycle managers and the kind registry
//! - [`listener`] - turns execution handle changes into transitions

pub mod graph;
pub mod listener;
pub mod manager;
pub mod model;
pub mod runtime;

pub use graph::{run_state_graph, run_state_graph_builder, RunGraph, RunGraphBuilder};
pub use listener::{Identity, ListenerAction, RunnableListener};
pub use manager::{submit, RunLifecycle, RunLifecycleManager, RunLifecycleRegistry};
pub use model::{LogEntry, Run, RunEvent, RunState, Runnable, UnknownName};
pub use runtime::{Runtime, RuntimeError, RuntimeResult};
