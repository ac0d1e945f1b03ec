use crate::error::{OrchestrateError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const ORCHESTRATE_DIR: &str = ".orchestrate";
pub const LOGS_DIR: &str = ".orchestrate/logs";
pub const RUNS_DIR: &str = ".orchestrate/runs";

pub const CONFIG_FILE: &str = ".orchestrate/config.yaml";
pub const DEFAULT_PLAN_FILE: &str = "plan.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn default_plan_path(root: &Path) -> PathBuf {
    root.join(DEFAULT_PLAN_FILE)
}

pub fn run_log_dir(root: &Path, run_id: &str) -> PathBuf {
    root.join(LOGS_DIR).join(run_id)
}

/// Build log for `component` inside a run's log directory.
pub fn build_log_path(log_dir: &Path, component: &str) -> PathBuf {
    log_dir.join(format!("{component}.build.log"))
}

pub fn run_record_path(root: &Path, run_id: &str) -> PathBuf {
    root.join(RUNS_DIR).join(format!("{run_id}.json"))
}

// ---------------------------------------------------------------------------
// Component name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9\-]*[a-z0-9])?$").unwrap())
}

/// Component names become Kubernetes object names, so they must be
/// DNS-1123 labels.
pub fn validate_component_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 63 || !name_re().is_match(name) {
        return Err(OrchestrateError::InvalidComponent {
            component: name.to_string(),
            reason: "name must be lowercase alphanumeric with hyphens, at most 63 characters"
                .into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
