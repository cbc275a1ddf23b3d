// Copyright (c) 2025 - Cowboy AI, Inc.
//! Control plane configuration
//!
//! Every setting has a default and can be overridden from the environment:
//!
//! | Variable | Default |
//! |---|---|
//! | `CIM_ORCH_LOCK_TIMEOUT_SECS` | 600 |
//! | `CIM_ORCH_MONITOR_DELAY_SECS` | 60 |
//! | `CIM_ORCH_MONITOR_STAGGER_SECS` | 5 |
//! | `CIM_ORCH_STATUS_FAILURE_THRESHOLD` | 3 |
//! | `CIM_ORCH_COLLECT_RESULTS` | true |
//! | `CIM_ORCH_COLLECT_LOGS` | true |
//! | `CIM_ORCH_COLLECT_METRICS` | true |
//! | `CIM_ORCH_LISTENER_WORKERS` | 4 |
//! | `CIM_ORCH_LISTENER_QUEUE` | 128 |
//! | `CIM_ORCH_USE_NATS` | false |
//! | `NATS_URL` | `nats://localhost:4222` |

use std::str::FromStr;
use std::time::Duration;

use crate::nats::NatsConfig;
use crate::state_machine::DEFAULT_LOCK_TIMEOUT;

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Reconciliation monitor settings
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Fixed delay between two ticks of one monitor
    pub delay: Duration,
    /// Offset between the first ticks of consecutive monitors
    pub stagger: Duration,
    /// Consecutive core-status read failures before a handle is marked ERROR
    pub status_failure_threshold: u32,
    pub collect_results: bool,
    pub collect_logs: bool,
    pub collect_metrics: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(60),
            stagger: Duration::from_secs(5),
            status_failure_threshold: 3,
            collect_results: true,
            collect_logs: true,
            collect_metrics: true,
        }
    }
}

/// Runnable listener worker pool settings
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Bounded wait for entity and state machine locks
    pub lock_timeout: Duration,
    pub monitor: MonitorConfig,
    pub listener: ListenerConfig,
    /// Publish events to NATS in addition to the in-process bus
    pub use_nats: bool,
    pub nats: NatsConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            monitor: MonitorConfig::default(),
            listener: ListenerConfig::default(),
            use_nats: false,
            nats: NatsConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let mut nats = defaults.nats.clone();
        if let Some(url) = lookup("NATS_URL") {
            nats.servers = url
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        let config = Self {
            lock_timeout: secs(&lookup, "CIM_ORCH_LOCK_TIMEOUT_SECS", defaults.lock_timeout)?,
            monitor: MonitorConfig {
                delay: secs(&lookup, "CIM_ORCH_MONITOR_DELAY_SECS", defaults.monitor.delay)?,
                stagger: secs(&lookup, "CIM_ORCH_MONITOR_STAGGER_SECS", defaults.monitor.stagger)?,
                status_failure_threshold: parsed(
                    &lookup,
                    "CIM_ORCH_STATUS_FAILURE_THRESHOLD",
                    defaults.monitor.status_failure_threshold,
                )?,
                collect_results: flag(&lookup, "CIM_ORCH_COLLECT_RESULTS", defaults.monitor.collect_results)?,
                collect_logs: flag(&lookup, "CIM_ORCH_COLLECT_LOGS", defaults.monitor.collect_logs)?,
                collect_metrics: flag(&lookup, "CIM_ORCH_COLLECT_METRICS", defaults.monitor.collect_metrics)?,
            },
            listener: ListenerConfig {
                workers: parsed(&lookup, "CIM_ORCH_LISTENER_WORKERS", defaults.listener.workers)?,
                queue_capacity: parsed(
                    &lookup,
                    "CIM_ORCH_LISTENER_QUEUE",
                    defaults.listener.queue_capacity,
                )?,
            },
            use_nats: flag(&lookup, "CIM_ORCH_USE_NATS", defaults.use_nats)?,
            nats,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.status_failure_threshold == 0 {
            return Err(invalid("CIM_ORCH_STATUS_FAILURE_THRESHOLD", "0", "must be at least 1"));
        }
        if self.listener.workers == 0 {
            return Err(invalid("CIM_ORCH_LISTENER_WORKERS", "0", "must be at least 1"));
        }
        if self.listener.queue_capacity == 0 {
            return Err(invalid("CIM_ORCH_LISTENER_QUEUE", "0", "must be at least 1"));
        }
        if self.monitor.delay.is_zero() {
            return Err(invalid("CIM_ORCH_MONITOR_DELAY_SECS", "0", "must be positive"));
        }
        if self.use_nats && self.nats.servers.is_empty() {
            return Err(invalid("NATS_URL", "", "no server given"));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parsed(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &raw, "expected a boolean")),
        },
        None => Ok(default),
    }
}
