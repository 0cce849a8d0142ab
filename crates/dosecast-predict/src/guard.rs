//! Process-wide single-flight guard.
//!
//! A one-permit semaphore stands in for the `is_processing` flag. Holding a
//! [`RunPermit`] is the only way to be `Running`; dropping it (on success,
//! error, cancellation or unwind) returns the guard to `Idle`.

use std::sync::Arc;

use dosecast_telemetry::Metrics;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::model::RunState;

/// Non-queueing mutual exclusion over the external prediction process.
#[derive(Clone)]
pub struct SingleFlight {
    slot: Arc<Semaphore>,
    metrics: Metrics,
}

impl SingleFlight {
    /// Create an idle guard.
    #[must_use]
    pub fn new(metrics: Metrics) -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            metrics,
        }
    }

    /// Take the run slot if it is free. Never waits.
    #[must_use]
    pub fn try_acquire(&self) -> Option<RunPermit> {
        let permit = Arc::clone(&self.slot).try_acquire_owned().ok()?;
        self.metrics.set_prediction_running(true);
        Some(RunPermit {
            _permit: permit,
            metrics: self.metrics.clone(),
        })
    }

    /// Current state of the slot.
    #[must_use]
    pub fn state(&self) -> RunState {
        if self.slot.available_permits() == 0 {
            RunState::Running
        } else {
            RunState::Idle
        }
    }
}

/// Proof that the caller holds the run slot.
#[must_use = "dropping the permit releases the run slot immediately"]
pub struct RunPermit {
    _permit: OwnedSemaphorePermit,
    metrics: Metrics,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.metrics.set_prediction_running(false);
    }
}
