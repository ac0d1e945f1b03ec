//! Cluster Applier stage and its control-plane seam.
//!
//! `ClusterApi` is the whole surface the orchestrator needs from a cluster:
//! submit a resource set, and report one component's workload state.
//! `KubectlCluster` implements it by shelling out; tests use a fake.

pub mod applier;
pub mod kubectl;
pub mod manifest;
pub mod readiness;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use applier::{ClusterApplier, DeploymentResult, ReadinessPolicy};
pub use kubectl::KubectlCluster;
pub use manifest::ResourceSet;
pub use readiness::{ReadinessState, ReadinessStatus, ReadinessTable};

// ---------------------------------------------------------------------------
// ApplySummary
// ---------------------------------------------------------------------------

/// What the control plane did with one submitted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceChange {
    Created,
    Configured,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    /// `kind/name`, e.g. `deployment/backend`.
    pub resource: String,
    pub change: ResourceChange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub resources: Vec<AppliedResource>,
}

impl ApplySummary {
    /// Resources the apply actually changed.
    pub fn changed(&self) -> usize {
        self.resources
            .iter()
            .filter(|r| r.change != ResourceChange::Unchanged)
            .count()
    }

    /// True when re-applying changed nothing.
    pub fn is_noop(&self) -> bool {
        self.changed() == 0
    }
}

// ---------------------------------------------------------------------------
// Observed
// ---------------------------------------------------------------------------

/// A component's workload as last reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// The workload object does not exist (yet).
    Absent,
    Progressing { ready: u32, desired: u32 },
    Ready,
}

// ---------------------------------------------------------------------------
// ClusterApi
// ---------------------------------------------------------------------------

pub trait ClusterApi {
    /// Submit the whole resource set in one operation. Re-submitting an
    /// identical set must change nothing.
    fn apply(&self, resources: &ResourceSet) -> Result<ApplySummary>;

    /// Report the workload state of one component.
    fn observe(&self, component: &str) -> Result<Observed>;
}
