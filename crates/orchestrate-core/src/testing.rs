//! In-memory stand-ins for the external tools, used by unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::builder::{BuildResult, ImageBuilder};
use crate::cancel::CancelToken;
use crate::cluster::applier::Clock;
use crate::cluster::manifest::ResourceSet;
use crate::cluster::{AppliedResource, ApplySummary, ClusterApi, Observed, ResourceChange};
use crate::component::Component;
use crate::error::{OrchestrateError, Result};
use crate::plan::DeploymentPlan;
use crate::publisher::{Pushed, RegistryPublisher};

/// storage ← backend ← frontend, declared out of order.
pub fn three_tier_plan() -> DeploymentPlan {
    DeploymentPlan::new(vec![
        Component::new("frontend", "app/frontend:1", 80).with_dependencies(["backend"]),
        Component::new("backend", "app/backend:1", 8080)
            .with_dependencies(["storage"])
            .with_replicas(2),
        Component::new("storage", "app/storage:1", 5432),
    ])
    .unwrap()
}

pub fn build_result(component: &str) -> BuildResult {
    BuildResult {
        component: component.to_string(),
        image: format!("app/{component}:1"),
        image_id: Some(format!("sha256:{}", "1".repeat(64))),
        success: true,
        log: PathBuf::from(format!("{component}.build.log")),
        failure: None,
    }
}

// ---------------------------------------------------------------------------
// FakeClock
// ---------------------------------------------------------------------------

/// Virtual time: `sleep` advances the clock instantly.
#[derive(Default)]
pub struct FakeClock {
    now: Cell<Duration>,
}

impl Clock for FakeClock {
    fn elapsed(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

// ---------------------------------------------------------------------------
// FakeBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBuilder {
    fail: Option<String>,
    built: RefCell<Vec<String>>,
}

impl FakeBuilder {
    pub fn failing(component: &str) -> Self {
        Self {
            fail: Some(component.to_string()),
            built: RefCell::default(),
        }
    }

    pub fn built(&self) -> Vec<String> {
        self.built.borrow().clone()
    }
}

impl ImageBuilder for FakeBuilder {
    fn build(&self, component: &Component) -> Result<BuildResult> {
        self.built.borrow_mut().push(component.name.clone());
        let mut result = build_result(&component.name);
        result.image = component.image.clone();
        if self.fail.as_deref() == Some(component.name.as_str()) {
            result.success = false;
            result.image_id = None;
            result.failure = Some("exit status 1".to_string());
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// FakePublisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakePublisher {
    fail: Option<String>,
    calls: Cell<usize>,
}

impl FakePublisher {
    pub fn failing(component: &str) -> Self {
        Self {
            fail: Some(component.to_string()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl RegistryPublisher for FakePublisher {
    fn push(&self, build: &BuildResult) -> Result<Pushed> {
        self.calls.set(self.calls.get() + 1);
        if self.fail.as_deref() == Some(build.component.as_str()) {
            return Err(OrchestrateError::Publish {
                component: build.component.clone(),
                reason: "unauthorized: authentication required".to_string(),
            });
        }
        Ok(Pushed {
            digest: Some(format!("sha256:{}", "a".repeat(64))),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeCluster
// ---------------------------------------------------------------------------

/// Control plane whose components become ready at fixed virtual times.
pub struct FakeCluster<'a> {
    clock: &'a FakeClock,
    ready_at: HashMap<String, Duration>,
    all_ready: bool,
    errors_until: HashMap<String, Duration>,
    reject: Option<String>,
    cancel_after: Option<(usize, CancelToken)>,
    stored: RefCell<HashMap<String, Value>>,
    apply_calls: Cell<usize>,
    observations: RefCell<Vec<(String, Duration)>>,
}

impl<'a> FakeCluster<'a> {
    pub fn new(clock: &'a FakeClock) -> Self {
        Self {
            clock,
            ready_at: HashMap::new(),
            all_ready: false,
            errors_until: HashMap::new(),
            reject: None,
            cancel_after: None,
            stored: RefCell::default(),
            apply_calls: Cell::new(0),
            observations: RefCell::default(),
        }
    }

    pub fn ready_at(mut self, component: &str, at: Duration) -> Self {
        self.ready_at.insert(component.to_string(), at);
        self
    }

    pub fn all_ready(mut self) -> Self {
        self.all_ready = true;
        self
    }

    /// Status queries for `component` fail while virtual time is below `until`.
    pub fn status_errors_until(mut self, component: &str, until: Duration) -> Self {
        self.errors_until.insert(component.to_string(), until);
        self
    }

    pub fn rejecting(mut self, reason: &str) -> Self {
        self.reject = Some(reason.to_string());
        self
    }

    pub fn cancel_after_observations(mut self, n: usize, token: CancelToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.get()
    }

    pub fn stored_documents(&self) -> usize {
        self.stored.borrow().len()
    }

    pub fn total_observations(&self) -> usize {
        self.observations.borrow().len()
    }

    pub fn observations_of(&self, component: &str) -> usize {
        self.observations
            .borrow()
            .iter()
            .filter(|(c, _)| c == component)
            .count()
    }

    pub fn first_observation(&self, component: &str) -> Option<Duration> {
        self.observations
            .borrow()
            .iter()
            .find(|(c, _)| c == component)
            .map(|(_, t)| *t)
    }

    pub fn last_observation(&self, component: &str) -> Option<Duration> {
        self.observations
            .borrow()
            .iter()
            .rev()
            .find(|(c, _)| c == component)
            .map(|(_, t)| *t)
    }
}

impl ClusterApi for FakeCluster<'_> {
    fn apply(&self, resources: &ResourceSet) -> Result<ApplySummary> {
        self.apply_calls.set(self.apply_calls.get() + 1);
        if let Some(reason) = &self.reject {
            return Err(OrchestrateError::Apply(reason.clone()));
        }
        let mut stored = self.stored.borrow_mut();
        let applied = resources
            .resource_names()
            .into_iter()
            .zip(resources.documents())
            .map(|(name, doc)| {
                let change = match stored.insert(name.clone(), doc.clone()) {
                    None => ResourceChange::Created,
                    Some(prev) if &prev == doc => ResourceChange::Unchanged,
                    Some(_) => ResourceChange::Configured,
                };
                AppliedResource {
                    resource: name,
                    change,
                }
            })
            .collect();
        Ok(ApplySummary { resources: applied })
    }

    fn observe(&self, component: &str) -> Result<Observed> {
        let now = self.clock.elapsed();
        let count = {
            let mut obs = self.observations.borrow_mut();
            obs.push((component.to_string(), now));
            obs.len()
        };
        if let Some((n, token)) = &self.cancel_after {
            if count >= *n {
                token.cancel();
            }
        }
        if let Some(until) = self.errors_until.get(component) {
            if now < *until {
                return Err(OrchestrateError::Status {
                    component: component.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
        }
        if self.all_ready {
            return Ok(Observed::Ready);
        }
        match self.ready_at.get(component) {
            Some(at) if now >= *at => Ok(Observed::Ready),
            Some(_) => Ok(Observed::Progressing {
                ready: 0,
                desired: 1,
            }),
            None => Ok(Observed::Absent),
        }
    }
}
