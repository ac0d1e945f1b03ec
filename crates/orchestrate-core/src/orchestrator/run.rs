//! The orchestration driver: build, publish, apply, in that order.
//!
//! Each stage must succeed completely before the next one starts. The
//! driver fills in the `RunRecord` as it goes so a failed run still leaves
//! a record of everything that happened before the failure.

use std::path::PathBuf;

use crate::builder::{self, ImageBuilder};
use crate::cancel::CancelToken;
use crate::cluster::applier::{Clock, ClusterApplier, DeploymentResult, ReadinessPolicy};
use crate::cluster::manifest::{self, ResourceSet};
use crate::cluster::ClusterApi;
use crate::config::Config;
use crate::error::Result;
use crate::io;
use crate::plan::DeploymentPlan;
use crate::publisher::{self, RegistryPublisher};
use crate::types::Stage;

use super::record::{RunOutcome, RunRecord};

/// The external services one run talks to.
pub struct Stages<'a> {
    pub builder: &'a dyn ImageBuilder,
    pub publisher: &'a dyn RegistryPublisher,
    pub cluster: &'a dyn ClusterApi,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Operator confirmation for the registry publish step.
    pub push: bool,
    /// Write the resource set here instead of applying it.
    pub render_to: Option<PathBuf>,
}

pub struct Orchestrator<'a> {
    stages: Stages<'a>,
    config: &'a Config,
    policy: ReadinessPolicy,
    cancel: CancelToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(stages: Stages<'a>, config: &'a Config, cancel: CancelToken) -> Self {
        Self {
            stages,
            config,
            policy: ReadinessPolicy::from(&config.readiness),
            cancel,
        }
    }

    /// Run every stage and record the outcome in `record`.
    pub fn run(
        &self,
        plan: &DeploymentPlan,
        opts: &RunOptions,
        record: &mut RunRecord,
    ) -> Result<()> {
        let result = self.run_stages(plan, opts, record);
        match &result {
            Ok(()) => record.finish(RunOutcome::Succeeded),
            Err(e) => {
                tracing::error!(stage = %e.stage(), component = e.component().unwrap_or("-"), "run failed");
                record.finish(RunOutcome::from_error(e));
            }
        }
        result
    }

    fn run_stages(
        &self,
        plan: &DeploymentPlan,
        opts: &RunOptions,
        record: &mut RunRecord,
    ) -> Result<()> {
        tracing::info!(run = %record.id, order = ?plan.names(), "starting run");

        self.stages.builder.preflight(plan)?;
        record.builds = builder::build_all(self.stages.builder, plan, &self.cancel)?;

        record.publishes = publisher::publish_all(
            self.stages.publisher,
            &record.builds,
            opts.push,
            self.config.registry.on_push_failure,
            &self.cancel,
        )?;

        let images = manifest::deploy_images(&record.builds, &record.publishes);
        let resources = ResourceSet::render(plan, &images, &self.config.cluster.namespace);

        if let Some(path) = &opts.render_to {
            self.cancel.check(Stage::Apply)?;
            io::atomic_write(path, resources.to_yaml()?.as_bytes())?;
            tracing::info!(path = %path.display(), documents = resources.len(), "resource set written");
            record.rendered = Some(path.clone());
            return Ok(());
        }

        let applier = ClusterApplier::new(
            self.stages.cluster,
            self.stages.clock,
            self.policy,
            plan,
            self.cancel.clone(),
        );
        let mut deployment = DeploymentResult::default();
        let applied = applier.apply(plan, &resources, &mut deployment);
        record.applied = deployment.applied;
        record.readiness = deployment.readiness;
        applied
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
