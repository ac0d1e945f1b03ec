use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ToolsConfig
// ---------------------------------------------------------------------------

/// Executables used for each external capability. A bare name is resolved
/// against `PATH`; a path is used as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_docker")]
    pub docker: String,
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
}

fn default_docker() -> String {
    "docker".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            docker: default_docker(),
            kubectl: default_kubectl(),
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// What a failed push means for the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushFailurePolicy {
    /// Halt the run. Right whenever the cluster pulls from the registry.
    #[default]
    Fatal,
    /// Log and keep going. Only correct when the cluster can resolve the
    /// locally built image (a local cluster's image cache, for instance).
    Continue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub on_push_failure: PushFailurePolicy,
}

// ---------------------------------------------------------------------------
// ClusterConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// kubeconfig context; the current context when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            context: None,
            namespace: default_namespace(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReadinessConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Hard deadline per component, counted from when its wait starts.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_deadline() -> u64 {
    300
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            deadline_secs: default_deadline(),
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            tools: ToolsConfig::default(),
            registry: RegistryConfig::default(),
            cluster: ClusterConfig::default(),
            readiness: ReadinessConfig::default(),
        }
    }
}

impl Config {
    /// Load `.orchestrate/config.yaml` under `root`, or defaults if absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (label, tool) in [("docker", &self.tools.docker), ("kubectl", &self.tools.kubectl)] {
            if tool.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("tools.{label} is empty"),
                });
            }
        }

        if self.cluster.namespace.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "cluster.namespace is empty".to_string(),
            });
        }

        if self.readiness.poll_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "readiness.poll_interval_secs must be at least 1".to_string(),
            });
        } else if self.readiness.poll_interval_secs >= self.readiness.deadline_secs {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "readiness.poll_interval_secs={} is not below deadline_secs={}; \
                     each component gets a single status check",
                    self.readiness.poll_interval_secs, self.readiness.deadline_secs
                ),
            });
        }

        warnings
    }

    /// The first error-level validation message, if any.
    pub fn first_error(&self) -> Option<String> {
        self.validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
