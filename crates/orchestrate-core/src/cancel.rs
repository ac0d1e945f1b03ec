use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{OrchestrateError, Result};
use crate::types::Stage;

/// Operator interrupt flag, shared between the signal handler and the run.
///
/// Stages poll it at their boundaries; nothing is killed mid-call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted { stage })` once cancelled.
    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            return Err(OrchestrateError::Interrupted { stage });
        }
        Ok(())
    }
}
