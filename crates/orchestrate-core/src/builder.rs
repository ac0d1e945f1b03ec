//! Image Builder stage.
//!
//! Builds run one at a time in plan order so build logs line up with the
//! startup order. The first failure stops the run before anything is
//! published or applied.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::component::Component;
use crate::error::{OrchestrateError, Result};
use crate::io;
use crate::paths;
use crate::plan::DeploymentPlan;
use crate::tool::Tool;
use crate::types::Stage;

// ---------------------------------------------------------------------------
// BuildResult
// ---------------------------------------------------------------------------

/// Outcome of building one component. Never modified once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub component: String,
    /// Tag the image was built under.
    pub image: String,
    /// Content address (`sha256:...`) when the builder could resolve it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    pub success: bool,
    /// Full build output.
    pub log: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

// ---------------------------------------------------------------------------
// ImageBuilder
// ---------------------------------------------------------------------------

pub trait ImageBuilder {
    /// Build one component. `Err` means the tool could not be run at all;
    /// a build that ran and failed is `Ok` with `success == false`.
    fn build(&self, component: &Component) -> Result<BuildResult>;

    /// Runs once before the first build. Fails the run without building
    /// anything when inputs are missing.
    fn preflight(&self, _plan: &DeploymentPlan) -> Result<()> {
        Ok(())
    }
}

/// Check that every build context and descriptor exists before the first
/// build starts.
pub fn check_build_inputs(plan: &DeploymentPlan, log_dir: &Path) -> Result<()> {
    for component in plan.components() {
        let log = paths::build_log_path(log_dir, &component.name);
        if !component.context.is_dir() {
            return Err(OrchestrateError::Build {
                component: component.name.clone(),
                reason: format!(
                    "build context {} does not exist",
                    component.context.display()
                ),
                log,
            });
        }
        let descriptor = component.descriptor_path();
        if !descriptor.is_file() {
            return Err(OrchestrateError::Build {
                component: component.name.clone(),
                reason: format!("build descriptor {} not found", descriptor.display()),
                log,
            });
        }
    }
    Ok(())
}

/// Build every component in plan order, halting on the first failure.
pub fn build_all(
    builder: &dyn ImageBuilder,
    plan: &DeploymentPlan,
    cancel: &CancelToken,
) -> Result<Vec<BuildResult>> {
    let mut results = Vec::with_capacity(plan.len());
    for component in plan.components() {
        cancel.check(Stage::Build)?;

        tracing::info!(component = %component.name, image = %component.image, "building image");
        let started = Instant::now();
        let result = builder.build(component);
        // An interrupt also reaches the build tool, so its failure is ours.
        cancel.check(Stage::Build)?;
        let result = result?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !result.success {
            tracing::error!(component = %component.name, log = %result.log.display(), "build failed");
            return Err(OrchestrateError::Build {
                component: result.component.clone(),
                reason: result
                    .failure
                    .clone()
                    .unwrap_or_else(|| "build tool reported failure".to_string()),
                log: result.log.clone(),
            });
        }

        tracing::info!(
            component = %component.name,
            image_id = result.image_id.as_deref().unwrap_or("unknown"),
            elapsed_ms,
            "image built"
        );
        results.push(result);
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// DockerBuilder
// ---------------------------------------------------------------------------

/// `docker build` + `docker image inspect`.
pub struct DockerBuilder {
    docker: Tool,
    log_dir: PathBuf,
}

impl DockerBuilder {
    pub fn new(docker: Tool, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            docker,
            log_dir: log_dir.into(),
        }
    }

    fn inspect_id(&self, image: &str) -> Option<String> {
        match self
            .docker
            .run(&["image", "inspect", "--format", "{{.Id}}", image], None, None)
        {
            Ok(out) if out.success => {
                let id = out.stdout.trim();
                (!id.is_empty()).then(|| id.to_string())
            }
            Ok(out) => {
                tracing::warn!(image, reason = %out.failure_hint(), "could not resolve image id");
                None
            }
            Err(e) => {
                tracing::warn!(image, error = %e, "could not resolve image id");
                None
            }
        }
    }
}

impl ImageBuilder for DockerBuilder {
    fn preflight(&self, plan: &DeploymentPlan) -> Result<()> {
        check_build_inputs(plan, &self.log_dir)
    }

    fn build(&self, component: &Component) -> Result<BuildResult> {
        io::ensure_dir(&self.log_dir)?;
        let log = paths::build_log_path(&self.log_dir, &component.name);

        let descriptor = component.descriptor_path();
        let descriptor = descriptor.to_string_lossy();
        let context = component.context.to_string_lossy();
        let args = [
            "build",
            "-t",
            component.image.as_str(),
            "-f",
            descriptor.as_ref(),
            context.as_ref(),
        ];

        let output = self.docker.run(&args, None, None).map_err(|e| OrchestrateError::Build {
            component: component.name.clone(),
            reason: e.to_string(),
            log: log.clone(),
        })?;
        std::fs::write(&log, output.combined())?;

        if !output.success {
            return Ok(BuildResult {
                component: component.name.clone(),
                image: component.image.clone(),
                image_id: None,
                success: false,
                log,
                failure: Some(output.failure_hint()),
            });
        }

        Ok(BuildResult {
            component: component.name.clone(),
            image: component.image.clone(),
            image_id: self.inspect_id(&component.image),
            success: true,
            log,
            failure: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
