// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run and execution handle types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lifecycle::{Fields, LifecycleEntity, LifecycleState, LifecycleTrigger, STATE_FIELD};

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($label => Ok($name::$variant),)+
                    _ => Err(UnknownName(s.to_string())),
                }
            }
        }
    };
}

/// Name that does not match any variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown name {0}")]
pub struct UnknownName(pub String);

named_enum! {
    /// Lifecycle states of a run
    pub enum RunState {
        Created => "CREATED",
        Built => "BUILT",
        Ready => "READY",
        Pending => "PENDING",
        Running => "RUNNING",
        Stopped => "STOPPED",
        Resume => "RESUME",
        Completed => "COMPLETED",
        Error => "ERROR",
        Deleting => "DELETING",
        Deleted => "DELETED",
    }
}

named_enum! {
    /// Events driving a run
    pub enum RunEvent {
        Build => "BUILD",
        Run => "RUN",
        Schedule => "SCHEDULE",
        Execute => "EXECUTE",
        Loop => "LOOP",
        Complete => "COMPLETE",
        Stop => "STOP",
        Resume => "RESUME",
        Error => "ERROR",
        Delete => "DELETE",
    }
}

impl LifecycleState for RunState {
    fn name(&self) -> &'static str {
        self.as_str()
    }

    fn is_deleted(&self) -> bool {
        matches!(self, RunState::Deleted)
    }
}

impl LifecycleTrigger for RunEvent {
    fn name(&self) -> &'static str {
        self.as_str()
    }
}

/// A unit of work executed by an external backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    /// `{runtime}+run`
    pub kind: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub spec: Fields,
    #[serde(default)]
    pub status: Fields,
    #[serde(default)]
    pub metadata: Fields,
}

impl Run {
    /// New run in `CREATED`
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        let mut run = Self {
            id: id.into(),
            kind: kind.into(),
            project: None,
            user: None,
            spec: Fields::new(),
            status: Fields::new(),
            metadata: Fields::new(),
        };
        run.set_state(RunState::Created);
        run
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_spec(mut self, spec: Fields) -> Self {
        self.spec = spec;
        self
    }

    /// Set a single spec entry
    pub fn with_spec_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.spec.insert(key.into(), value);
        self
    }

    /// Runtime name, the part of the kind before `+`
    pub fn runtime(&self) -> &str {
        self.kind.split('+').next().unwrap_or_default()
    }

    pub fn run_state(&self) -> Option<RunState> {
        LifecycleEntity::state(self).and_then(|s| s.parse().ok())
    }

    pub fn set_state(&mut self, state: RunState) {
        self.status
            .insert(STATE_FIELD.to_string(), Value::String(state.as_str().to_string()));
    }

    /// In-process runs skip every backend call
    pub fn is_local_execution(&self) -> bool {
        self.spec
            .get("local_execution")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn function_spec(&self) -> Fields {
        self.object_in_spec("function")
    }

    pub fn task_spec(&self) -> Fields {
        self.object_in_spec("task")
    }

    /// Task name used to label execution handles
    pub fn task_name(&self) -> Option<String> {
        self.spec
            .get("task")
            .and_then(|t| t.get("name").or(Some(t)))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn object_in_spec(&self, key: &str) -> Fields {
        self.spec
            .get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    /// Merge a status fragment into the run status, later keys winning
    pub fn merge_status(&mut self, fragment: Option<Fields>) {
        if let Some(fragment) = fragment {
            self.status.extend(fragment);
        }
    }
}

impl LifecycleEntity for Run {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn spec(&self) -> &Fields {
        &self.spec
    }

    fn set_spec(&mut self, spec: Fields) {
        self.spec = spec;
    }

    fn status(&self) -> &Fields {
        &self.status
    }

    fn set_status(&mut self, status: Fields) {
        self.status = status;
    }

    fn metadata(&self) -> &Fields {
        &self.metadata
    }

    fn set_metadata(&mut self, metadata: Fields) {
        self.metadata = metadata;
    }
}

/// One log stream captured from a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub source: String,
    pub content: String,
}

/// Backend execution handle of a run; the id is the run id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runnable {
    pub id: String,
    pub framework: String,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    pub state: RunState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Fields,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub metrics: Vec<Value>,
}

impl Runnable {
    pub fn new(id: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            framework: framework.into(),
            task: None,
            project: None,
            user: None,
            state: RunState::Created,
            message: None,
            error: None,
            results: Fields::new(),
            logs: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// Handle for `run`, copying its ownership fields
    pub fn for_run(run: &Run, framework: impl Into<String>) -> Self {
        Self {
            task: run.task_name(),
            project: run.project.clone(),
            user: run.user.clone(),
            ..Self::new(run.id.clone(), framework)
        }
    }

    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = state;
        self
    }
}
