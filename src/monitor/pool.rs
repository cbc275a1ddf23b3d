// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bounded worker pool for asynchronous notification handling
//!
//! A fixed number of workers drain a bounded queue. When the queue is full
//! the submitting task runs the job itself, which throttles producers
//! instead of dropping work.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

type Job = BoxFuture<'static, ()>;

/// How a submitted job was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to a worker
    Queued,
    /// Run inline by the caller because the queue was full or closed
    CallerRan,
}

pub struct WorkerPool {
    name: String,
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers sharing a queue of `capacity` jobs
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, workers: usize, capacity: usize) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let pool = name.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    trace!(%pool, worker = index, "worker stopped");
                })
            })
            .collect();

        Self {
            name,
            sender,
            workers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job, or run it on the caller when the queue is saturated
    pub async fn submit<F>(&self, job: F) -> Dispatch
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.sender.try_send(job.boxed()) {
            Ok(()) => Dispatch::Queued,
            Err(mpsc::error::TrySendError::Full(job)) => {
                debug!(pool = %self.name, "queue saturated, running on caller");
                job.await;
                Dispatch::CallerRan
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                debug!(pool = %self.name, "queue closed, running on caller");
                job.await;
                Dispatch::CallerRan
            }
        }
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.sender);
        for (index, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                warn!(pool = %self.name, worker = index, error = %e, "worker terminated abnormally");
            }
        }
    }
}
