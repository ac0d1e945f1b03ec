//! Apply the resource set, then wait for readiness in dependency order.
//!
//! The whole set is submitted at once. Readiness waits run one component at
//! a time in plan order, and a component leaves `Pending` only after every
//! dependency is `Ready`. The first component to miss its deadline halts
//! the run; whatever was applied stays in place.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::component::Component;
use crate::config::ReadinessConfig;
use crate::error::{OrchestrateError, Result};
use crate::plan::DeploymentPlan;
use crate::types::Stage;

use super::manifest::ResourceSet;
use super::readiness::{ReadinessState, ReadinessStatus, ReadinessTable};
use super::{ApplySummary, ClusterApi, Observed};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Monotonic time source for the polling loop.
pub trait Clock {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;
    /// Block the calling thread.
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// ReadinessPolicy
// ---------------------------------------------------------------------------

/// Fixed-interval polling with a hard deadline per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl From<&ReadinessConfig> for ReadinessPolicy {
    fn from(cfg: &ReadinessConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            deadline: cfg.deadline(),
        }
    }
}

// ---------------------------------------------------------------------------
// DeploymentResult
// ---------------------------------------------------------------------------

/// What one apply did. Filled in as the apply proceeds, so a failed apply
/// still reports what reached the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<ApplySummary>,
    pub readiness: Vec<ReadinessStatus>,
}

// ---------------------------------------------------------------------------
// ClusterApplier
// ---------------------------------------------------------------------------

pub struct ClusterApplier<'a> {
    cluster: &'a dyn ClusterApi,
    clock: &'a dyn Clock,
    policy: ReadinessPolicy,
    table: ReadinessTable,
    cancel: CancelToken,
}

impl<'a> ClusterApplier<'a> {
    pub fn new(
        cluster: &'a dyn ClusterApi,
        clock: &'a dyn Clock,
        policy: ReadinessPolicy,
        plan: &DeploymentPlan,
        cancel: CancelToken,
    ) -> Self {
        Self {
            cluster,
            clock,
            policy,
            table: ReadinessTable::new(plan),
            cancel,
        }
    }

    /// Submit `resources`, then wait for every component in plan order.
    /// `result` holds the apply summary and a readiness snapshot even when
    /// this returns an error.
    pub fn apply(
        &self,
        plan: &DeploymentPlan,
        resources: &ResourceSet,
        result: &mut DeploymentResult,
    ) -> Result<()> {
        result.applied = Some(self.submit(resources)?);
        let waited = self.wait_all(plan);
        result.readiness = self.table.snapshot();
        waited
    }

    /// Submit the whole resource set in one call.
    fn submit(&self, resources: &ResourceSet) -> Result<ApplySummary> {
        self.cancel.check(Stage::Apply)?;

        tracing::info!(resources = resources.len(), "applying resource set");
        let applied = match self.cluster.apply(resources) {
            Ok(applied) => applied,
            Err(e) => {
                // kubectl shares the interrupt; report it as such.
                self.cancel.check(Stage::Apply)?;
                return Err(e);
            }
        };
        if applied.is_noop() {
            tracing::info!("cluster already matches the plan");
        } else {
            tracing::info!(changed = applied.changed(), "resource set applied");
        }
        Ok(applied)
    }

    /// Wait for every component in plan order, stopping at the first one
    /// that misses its deadline.
    fn wait_all(&self, plan: &DeploymentPlan) -> Result<()> {
        for component in plan.components() {
            self.start(component)?;
            self.wait_ready(component)?;
        }
        Ok(())
    }

    /// `Pending → Starting`, allowed only once every dependency is `Ready`.
    fn start(&self, component: &Component) -> Result<()> {
        if let Some(dep) = component
            .depends_on
            .iter()
            .find(|d| self.table.state_of(d) != Some(ReadinessState::Ready))
        {
            tracing::error!(component = %component.name, dependency = %dep, "dependency not ready");
            return Err(OrchestrateError::InvalidTransition {
                component: component.name.clone(),
                from: ReadinessState::Pending.to_string(),
                to: ReadinessState::Starting.to_string(),
            });
        }
        self.table
            .transition(&component.name, ReadinessState::Starting)
    }

    fn wait_ready(&self, component: &Component) -> Result<()> {
        let name = component.name.as_str();
        let started = self.clock.elapsed();
        tracing::info!(component = name, deadline_secs = self.policy.deadline.as_secs(), "waiting for readiness");

        loop {
            self.cancel.check(Stage::Readiness)?;

            let observed = self.cluster.observe(name);
            self.table.mark_checked(name);
            match observed {
                Ok(Observed::Ready) => {
                    self.table.transition(name, ReadinessState::Ready)?;
                    tracing::info!(
                        component = name,
                        waited_ms = (self.clock.elapsed() - started).as_millis() as u64,
                        "component ready"
                    );
                    return Ok(());
                }
                Ok(Observed::Progressing { ready, desired }) => {
                    tracing::debug!(component = name, ready, desired, "not ready yet");
                }
                Ok(Observed::Absent) => {
                    tracing::debug!(component = name, "workload not found yet");
                }
                Err(e) => {
                    tracing::warn!(component = name, error = %e, "status query failed; retrying");
                }
            }

            let waited = self.clock.elapsed().saturating_sub(started);
            if waited >= self.policy.deadline {
                self.table.transition(name, ReadinessState::Failed)?;
                tracing::error!(component = name, waited_secs = waited.as_secs(), "readiness deadline elapsed");
                return Err(OrchestrateError::ReadinessTimeout {
                    component: name.to_string(),
                    waited: self.policy.deadline,
                });
            }
            let remaining = self.policy.deadline - waited;
            self.clock.sleep(self.policy.poll_interval.min(remaining));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
