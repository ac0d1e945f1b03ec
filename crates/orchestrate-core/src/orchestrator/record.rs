//! Persisted history of one orchestration run.
//!
//! A record is written to `.orchestrate/runs/<id>.json` when the run ends,
//! whether it succeeded or not, so a failed deploy can be inspected after
//! the fact.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::builder::BuildResult;
use crate::cluster::{ApplySummary, ReadinessStatus};
use crate::error::{OrchestrateError, Result};
use crate::io;
use crate::paths;
use crate::publisher::PublishOutcome;
use crate::types::Stage;

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunOutcome {
    Running,
    Succeeded,
    Failed {
        stage: Stage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<String>,
        message: String,
        exit_code: i32,
    },
}

impl RunOutcome {
    pub fn from_error(err: &OrchestrateError) -> Self {
        Self::Failed {
            stage: err.stage(),
            component: err.component().map(str::to_string),
            message: err.to_string(),
            exit_code: err.exit_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

// ---------------------------------------------------------------------------
// RunRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub plan: PathBuf,
    pub push: bool,
    /// Component names in startup order.
    pub order: Vec<String>,
    #[serde(default)]
    pub builds: Vec<BuildResult>,
    #[serde(default)]
    pub publishes: Vec<PublishOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<ApplySummary>,
    /// Set when the resource set was written to a file instead of applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered: Option<PathBuf>,
    #[serde(default)]
    pub readiness: Vec<ReadinessStatus>,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn new(plan: impl Into<PathBuf>, push: bool, order: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            plan: plan.into(),
            push,
            order,
            builds: Vec::new(),
            publishes: Vec::new(),
            applied: None,
            rendered: None,
            readiness: Vec::new(),
            outcome: RunOutcome::Running,
        }
    }

    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.finished_at = Some(Utc::now());
        self.outcome = outcome;
    }

    pub fn save(&self, root: &Path) -> Result<PathBuf> {
        let path = paths::run_record_path(root, &self.id_string());
        let data = serde_json::to_vec_pretty(self)?;
        io::atomic_write(&path, &data)?;
        Ok(path)
    }

    /// All saved records, oldest first. Unreadable files are skipped.
    pub fn list(root: &Path) -> Result<Vec<Self>> {
        let dir = root.join(paths::RUNS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(OrchestrateError::from)
                .and_then(|s| serde_json::from_str::<Self>(&s).map_err(OrchestrateError::from))
            {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable run record"),
            }
        }
        records.sort_by_key(|r| r.started_at);
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
