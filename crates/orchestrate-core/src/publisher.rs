//! Registry Publisher stage.
//!
//! Publishing is gated by an explicit `confirm` flag. Without it the
//! publisher is never called. With it, a push failure either halts the run
//! or is recorded as tolerated, depending on `PushFailurePolicy`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::builder::BuildResult;
use crate::cancel::CancelToken;
use crate::config::PushFailurePolicy;
use crate::error::{OrchestrateError, Result};
use crate::tool::Tool;
use crate::types::Stage;

// ---------------------------------------------------------------------------
// PublishOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published {
        component: String,
        image: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        digest: Option<String>,
    },
    /// `--push` was not given.
    Skipped { component: String },
    /// The push failed and config says the run continues.
    Tolerated { component: String, reason: String },
}

impl PublishOutcome {
    pub fn component(&self) -> &str {
        match self {
            Self::Published { component, .. }
            | Self::Skipped { component }
            | Self::Tolerated { component, .. } => component,
        }
    }

    /// Registry digest, when one was pushed.
    pub fn digest(&self) -> Option<&str> {
        match self {
            Self::Published { digest, .. } => digest.as_deref(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryPublisher
// ---------------------------------------------------------------------------

/// Successful push of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Pushed {
    pub digest: Option<String>,
}

pub trait RegistryPublisher {
    /// Push the built image. Auth and network failures are `Err(Publish)`.
    fn push(&self, build: &BuildResult) -> Result<Pushed>;
}

/// Publish one build result. No side effect unless `confirm` is true.
pub fn publish(
    publisher: &dyn RegistryPublisher,
    build: &BuildResult,
    confirm: bool,
    policy: PushFailurePolicy,
) -> Result<PublishOutcome> {
    if !confirm {
        return Ok(PublishOutcome::Skipped {
            component: build.component.clone(),
        });
    }
    if !build.success {
        return Err(OrchestrateError::Publish {
            component: build.component.clone(),
            reason: "refusing to publish a failed build".to_string(),
        });
    }

    tracing::info!(component = %build.component, image = %build.image, "pushing image");
    match publisher.push(build) {
        Ok(pushed) => Ok(PublishOutcome::Published {
            component: build.component.clone(),
            image: build.image.clone(),
            digest: pushed.digest,
        }),
        Err(err) => match policy {
            PushFailurePolicy::Fatal => Err(err),
            PushFailurePolicy::Continue => {
                tracing::warn!(
                    component = %build.component,
                    error = %err,
                    "push failed; continuing with the locally built image"
                );
                Ok(PublishOutcome::Tolerated {
                    component: build.component.clone(),
                    reason: err.to_string(),
                })
            }
        },
    }
}

/// Publish every build result in order.
pub fn publish_all(
    publisher: &dyn RegistryPublisher,
    builds: &[BuildResult],
    confirm: bool,
    policy: PushFailurePolicy,
    cancel: &CancelToken,
) -> Result<Vec<PublishOutcome>> {
    if !confirm {
        tracing::info!("push not requested; skipping registry publish");
    }
    builds
        .iter()
        .map(|build| {
            cancel.check(Stage::Publish)?;
            let outcome = publish(publisher, build, confirm, policy);
            // A push killed by the interrupt is neither fatal nor tolerated.
            cancel.check(Stage::Publish)?;
            outcome
        })
        .collect()
}

// ---------------------------------------------------------------------------
// DockerPublisher
// ---------------------------------------------------------------------------

static DIGEST_RE: OnceLock<Regex> = OnceLock::new();

fn digest_re() -> &'static Regex {
    DIGEST_RE.get_or_init(|| Regex::new(r"digest: (sha256:[0-9a-f]{64})").unwrap())
}

/// Pull the pushed digest out of `docker push` output.
pub fn parse_push_digest(output: &str) -> Option<String> {
    digest_re()
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// `docker push`.
pub struct DockerPublisher {
    docker: Tool,
}

impl DockerPublisher {
    pub fn new(docker: Tool) -> Self {
        Self { docker }
    }
}

impl RegistryPublisher for DockerPublisher {
    fn push(&self, build: &BuildResult) -> Result<Pushed> {
        let output = self
            .docker
            .run(&["push", build.image.as_str()], None, None)
            .map_err(|e| OrchestrateError::Publish {
                component: build.component.clone(),
                reason: e.to_string(),
            })?;
        if !output.success {
            return Err(OrchestrateError::Publish {
                component: build.component.clone(),
                reason: output.failure_hint(),
            });
        }
        Ok(Pushed {
            digest: parse_push_digest(&output.stdout),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
