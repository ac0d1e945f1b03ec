//! Orchestration driver and run history.
//!
//! `Orchestrator::run` drives the three stages over a validated
//! `DeploymentPlan` and fills in a `RunRecord`, which the CLI persists under
//! `.orchestrate/runs/`.

pub mod record;
pub mod run;

pub use record::{RunOutcome, RunRecord};
pub use run::{Orchestrator, RunOptions, Stages};
