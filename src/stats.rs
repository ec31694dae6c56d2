//! Orchestrator statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for one orchestrator
pub struct OrchestratorStats {
    pub sagas_started: AtomicU64,
    pub sagas_completed: AtomicU64,
    pub sagas_failed: AtomicU64,
    pub steps_started: AtomicU64,
    pub steps_completed: AtomicU64,
    pub steps_failed: AtomicU64,
    pub step_retries: AtomicU64,
    pub compensations_started: AtomicU64,
    pub compensations_completed: AtomicU64,
    pub compensations_failed: AtomicU64,
    pub persistence_failures: AtomicU64,
}

impl OrchestratorStats {
    pub fn new() -> Self {
        Self {
            sagas_started: AtomicU64::new(0),
            sagas_completed: AtomicU64::new(0),
            sagas_failed: AtomicU64::new(0),
            steps_started: AtomicU64::new(0),
            steps_completed: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            step_retries: AtomicU64::new(0),
            compensations_started: AtomicU64::new(0),
            compensations_completed: AtomicU64::new(0),
            compensations_failed: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OrchestratorStatsSnapshot {
        OrchestratorStatsSnapshot {
            sagas_started: self.sagas_started.load(Ordering::Relaxed),
            sagas_completed: self.sagas_completed.load(Ordering::Relaxed),
            sagas_failed: self.sagas_failed.load(Ordering::Relaxed),
            steps_started: self.steps_started.load(Ordering::Relaxed),
            steps_completed: self.steps_completed.load(Ordering::Relaxed),
            steps_failed: self.steps_failed.load(Ordering::Relaxed),
            step_retries: self.step_retries.load(Ordering::Relaxed),
            compensations_started: self.compensations_started.load(Ordering::Relaxed),
            compensations_completed: self.compensations_completed.load(Ordering::Relaxed),
            compensations_failed: self.compensations_failed.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for OrchestratorStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrchestratorStatsSnapshot {
    pub sagas_started: u64,
    pub sagas_completed: u64,
    pub sagas_failed: u64,
    pub steps_started: u64,
    pub steps_completed: u64,
    pub steps_failed: u64,
    pub step_retries: u64,
    pub compensations_started: u64,
    pub compensations_completed: u64,
    pub compensations_failed: u64,
    pub persistence_failures: u64,
}

impl OrchestratorStatsSnapshot {
    /// Runs that have not reached a terminal state yet
    pub fn sagas_in_flight(&self) -> u64 {
        self.sagas_started
            .saturating_sub(self.sagas_completed + self.sagas_failed)
    }
}
