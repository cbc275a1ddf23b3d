// Copyright (c) 2025 - Cowboy AI, Inc.
//! Runtime contract
//!
//! A runtime turns run lifecycle transitions into backend work. Dispatch
//! operations (`run`, `stop`, `resume`, `delete`) talk to the backend; the
//! `on_*` hooks return optional status fragments merged into the run.

use async_trait::async_trait;

use super::model::{Run, Runnable};
use crate::lifecycle::{merge_fields, Fields};

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// No execution handle for the run
    #[error("No execution handle for run {0}")]
    NotFound(String),

    #[error("Invalid run spec for {id}: {reason}")]
    InvalidSpec { id: String, reason: String },

    #[error("Backend dispatch failed for run {id}: {reason}")]
    Dispatch { id: String, reason: String },
}

#[async_trait]
pub trait Runtime: Send + Sync {
    /// Runtime name; runs of kind `{name}+run` belong to it
    fn name(&self) -> &str;

    fn is_supported(&self, run: &Run) -> bool {
        run.runtime() == self.name()
    }

    /// Compose the executable spec from function, task and run specs
    fn build(&self, function: &Fields, task: &Fields, run: &Run) -> RuntimeResult<Fields> {
        Ok(merge_fields([function, task, &run.spec]))
    }

    /// Dispatch the run, returning its execution handle
    async fn run(&self, run: &Run) -> RuntimeResult<Runnable>;

    async fn stop(&self, run: &Run) -> RuntimeResult<Runnable>;

    async fn resume(&self, run: &Run) -> RuntimeResult<Runnable>;

    /// Remove the execution handle, if any
    async fn delete(&self, run: &Run) -> RuntimeResult<Option<Runnable>>;

    fn on_ready(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        None
    }

    fn on_pending(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        None
    }

    fn on_running(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        None
    }

    fn on_complete(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        None
    }

    fn on_stopped(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        None
    }

    fn on_error(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        None
    }

    fn on_deleted(&self, _run: &Run, _runnable: Option<&Runnable>) -> Option<Fields> {
        None
    }
}
