use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::Stage;

#[derive(Debug, Error)]
pub enum OrchestrateError {
    #[error("plan declares no components")]
    EmptyPlan,

    #[error("component declared more than once: {0}")]
    DuplicateComponent(String),

    #[error("component '{component}' depends on unknown component '{dependency}'")]
    UnknownDependency {
        component: String,
        dependency: String,
    },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("invalid component '{component}': {reason}")]
    InvalidComponent { component: String, reason: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("build failed for '{component}': {reason} (log: {})", .log.display())]
    Build {
        component: String,
        reason: String,
        log: PathBuf,
    },

    #[error("publish failed for '{component}': {reason}")]
    Publish { component: String, reason: String },

    #[error("cluster rejected resource set: {0}")]
    Apply(String),

    #[error("'{component}' did not become ready within {}s", .waited.as_secs())]
    ReadinessTimeout { component: String, waited: Duration },

    #[error("status query for '{component}' failed: {reason}")]
    Status { component: String, reason: String },

    #[error("invalid readiness transition for '{component}' from {from} to {to}")]
    InvalidTransition {
        component: String,
        from: String,
        to: String,
    },

    #[error("required tool not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("failed to run {tool}: {reason}")]
    ToolSpawnFailed { tool: String, reason: String },

    #[error("interrupted during {stage}")]
    Interrupted { stage: Stage },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl OrchestrateError {
    /// The pipeline stage the error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Build { .. } => Stage::Build,
            Self::Publish { .. } => Stage::Publish,
            Self::Apply(_) => Stage::Apply,
            Self::ReadinessTimeout { .. }
            | Self::Status { .. }
            | Self::InvalidTransition { .. } => Stage::Readiness,
            Self::Interrupted { stage } => *stage,
            _ => Stage::Plan,
        }
    }

    /// The component the error names, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::DuplicateComponent(c) => Some(c),
            Self::UnknownDependency { component, .. }
            | Self::InvalidComponent { component, .. }
            | Self::Build { component, .. }
            | Self::Publish { component, .. }
            | Self::ReadinessTimeout { component, .. }
            | Self::Status { component, .. }
            | Self::InvalidTransition { component, .. } => Some(component),
            _ => None,
        }
    }

    /// Process exit code for the `orchestrate` binary.
    ///
    /// 1 build, 2 publish, 3 apply/readiness, 4 plan/config, 130 interrupted.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted { .. } => 130,
            _ => match self.stage() {
                Stage::Build => 1,
                Stage::Publish => 2,
                Stage::Apply | Stage::Readiness => 3,
                Stage::Plan => 4,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestrateError>;
