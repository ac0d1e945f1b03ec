use crate::error::{OrchestrateError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One deployable unit as declared in the plan file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Component {
    pub name: String,
    /// Build context directory. Relative paths are resolved against the
    /// plan file's directory when the plan is loaded.
    pub context: PathBuf,
    /// Build descriptor, relative to `context`.
    #[serde(default = "default_dockerfile")]
    pub dockerfile: PathBuf,
    /// Image reference the build is tagged with and the cluster runs.
    pub image: String,
    pub port: u16,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

fn default_dockerfile() -> PathBuf {
    PathBuf::from("Dockerfile")
}

fn default_replicas() -> u32 {
    1
}

impl Component {
    pub fn new(name: impl Into<String>, image: impl Into<String>, port: u16) -> Self {
        let name = name.into();
        Self {
            context: PathBuf::from(&name),
            name,
            dockerfile: default_dockerfile(),
            image: image.into(),
            port,
            replicas: default_replicas(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.context.join(&self.dockerfile)
    }

    /// Anchor a relative build context at `base`.
    pub(crate) fn resolve_context(&mut self, base: &Path) {
        if self.context.is_relative() {
            self.context = base.join(&self.context);
        }
    }

    /// Field-level checks that do not need the rest of the plan.
    pub fn validate(&self) -> Result<()> {
        paths::validate_component_name(&self.name)?;

        let invalid = |reason: &str| OrchestrateError::InvalidComponent {
            component: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.image.trim().is_empty() || self.image.chars().any(char::is_whitespace) {
            return Err(invalid("image must be a non-empty reference without whitespace"));
        }
        if self.port == 0 {
            return Err(invalid("port must be between 1 and 65535"));
        }
        if self.replicas == 0 {
            return Err(invalid("replicas must be at least 1"));
        }
        if self.depends_on.iter().any(|d| d == &self.name) {
            return Err(OrchestrateError::DependencyCycle(vec![
                self.name.clone(),
                self.name.clone(),
            ]));
        }
        Ok(())
    }
}
