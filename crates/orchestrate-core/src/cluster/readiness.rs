//! Per-component readiness state machine.
//!
//! Transitions: `Pending → Starting → Ready | Failed`
//!
//! `Pending` is initial; `Ready` and `Failed` are terminal. The table is
//! written only by the applier's polling loop (the write methods are
//! crate-private); anyone holding a clone can take read-only snapshots.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestrateError, Result};
use crate::plan::DeploymentPlan;

// ---------------------------------------------------------------------------
// ReadinessState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    Pending,
    Starting,
    Ready,
    Failed,
}

impl ReadinessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadinessState::Pending => "pending",
            ReadinessState::Starting => "starting",
            ReadinessState::Ready => "ready",
            ReadinessState::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: ReadinessState) -> bool {
        use ReadinessState::*;
        matches!(
            (self, next),
            (Pending, Starting) | (Starting, Ready) | (Starting, Failed)
        )
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ReadinessStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessStatus {
    pub component: String,
    pub state: ReadinessState,
    /// When the control plane was last asked about this component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ReadinessTable
// ---------------------------------------------------------------------------

/// Shared readiness table, one row per component in plan order.
#[derive(Debug, Clone)]
pub struct ReadinessTable {
    rows: Arc<RwLock<Vec<ReadinessStatus>>>,
}

impl ReadinessTable {
    pub fn new(plan: &DeploymentPlan) -> Self {
        let rows = plan
            .components()
            .iter()
            .map(|c| ReadinessStatus {
                component: c.name.clone(),
                state: ReadinessState::Pending,
                last_checked: None,
            })
            .collect();
        Self {
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    /// Copy of every row, in plan order.
    pub fn snapshot(&self) -> Vec<ReadinessStatus> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state_of(&self, component: &str) -> Option<ReadinessState> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.component == component)
            .map(|r| r.state)
    }

    pub(crate) fn transition(&self, component: &str, next: ReadinessState) -> Result<()> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let row = rows
            .iter_mut()
            .find(|r| r.component == component)
            .ok_or_else(|| OrchestrateError::InvalidTransition {
                component: component.to_string(),
                from: "unknown".to_string(),
                to: next.to_string(),
            })?;
        if !row.state.can_transition_to(next) {
            return Err(OrchestrateError::InvalidTransition {
                component: component.to_string(),
                from: row.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(component, from = %row.state, to = %next, "readiness transition");
        row.state = next;
        Ok(())
    }

    pub(crate) fn mark_checked(&self, component: &str) {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(row) = rows.iter_mut().find(|r| r.component == component) {
            row.last_checked = Some(Utc::now());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
