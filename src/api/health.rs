//! Shared health state for the /health endpoint.
//! Updated by the pipeline, read by the API.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::pipeline::PipelineReport;

/// Pipeline health metrics.
#[derive(Default)]
pub struct HealthState {
    /// True while a pipeline run is in progress.
    pub pipeline_running: AtomicBool,
    /// Nanosecond timestamp of the last finished run (0 = none).
    pub last_run_at_ns: AtomicU64,
    pub last_baselines_written: AtomicU64,
    pub last_signals_written: AtomicU64,
    pub last_scores_written: AtomicU64,
    /// Runs that ended with a storage error.
    pub failed_runs: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub pipeline_running: bool,
    pub last_run_at_ns: u64,
    pub last_baselines_written: u64,
    pub last_signals_written: u64,
    pub last_scores_written: u64,
    pub failed_runs: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the run slot. False if another run holds it.
    pub fn try_start_run(&self) -> bool {
        self.pipeline_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the run slot and records the outcome. `None` marks a failed run.
    pub fn finish_run(&self, report: Option<&PipelineReport>, at_ns: u64) {
        match report {
            Some(r) => {
                self.last_baselines_written.store(r.baselines.written, Ordering::Relaxed);
                self.last_signals_written.store(r.signals.written, Ordering::Relaxed);
                self.last_scores_written.store(r.scores.written, Ordering::Relaxed);
            }
            None => {
                self.failed_runs.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.last_run_at_ns.store(at_ns, Ordering::Relaxed);
        self.pipeline_running.store(false, Ordering::Release);
    }

    pub fn pipeline_running(&self) -> bool {
        self.pipeline_running.load(Ordering::Acquire)
    }

    pub fn last_run_at_ns(&self) -> u64 {
        self.last_run_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_signals_written(&self) -> u64 {
        self.last_signals_written.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            pipeline_running: self.pipeline_running(),
            last_run_at_ns: self.last_run_at_ns(),
            last_baselines_written: self.last_baselines_written.load(Ordering::Relaxed),
            last_signals_written: self.last_signals_written(),
            last_scores_written: self.last_scores_written.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_slot_is_exclusive() {
        let h = HealthState::new();
        assert!(h.try_start_run());
        assert!(!h.try_start_run());
        h.finish_run(None, 7);
        assert!(!h.pipeline_running());
        assert_eq!(h.snapshot().failed_runs, 1);
        assert_eq!(h.last_run_at_ns(), 7);
        assert!(h.try_start_run());
    }
}
