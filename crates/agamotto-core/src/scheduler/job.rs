//! Simulation job state

use crate::error::{FailureReason, Result};
use crate::metrics::MetricsRecord;
use crate::runner::RunOutcome;
use crate::types::{Scenario, ScenarioIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle state of a scenario's job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum JobStatus {
    /// Assigned to a lane, not started
    Pending,
    /// Output area acquired, engine running or metrics being read
    Running,
    /// Engine exited cleanly and metrics were extracted
    Succeeded,
    /// Did not produce metrics
    Failed(FailureReason),
}

impl JobStatus {
    /// Check if the job has finished
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    /// Check if the job succeeded
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Short lowercase name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

/// One scenario's execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationJob {
    /// Scenario being run
    pub scenario: Scenario,
    /// Lane the scenario was assigned to
    pub lane: usize,
    /// Current state
    pub status: JobStatus,
    /// When the lane picked it up
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Engine outcome, if the engine was launched
    pub outcome: Option<RunOutcome>,
    /// Extracted metrics (success only)
    pub metrics: Option<MetricsRecord>,
    /// Output directory kept after release
    pub retained_dir: Option<PathBuf>,
    /// Output directory that should have been deleted but is still on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leftover_dir: Option<PathBuf>,
}

impl SimulationJob {
    /// Job assigned to a lane
    #[must_use]
    pub fn new(scenario: Scenario, lane: usize) -> Self {
        Self {
            scenario,
            lane,
            status: JobStatus::Pending,
            started_at: None,
            finished_at: None,
            outcome: None,
            metrics: None,
            retained_dir: None,
            leftover_dir: None,
        }
    }

    /// Job whose lane died before recording an outcome
    #[must_use]
    pub fn aborted(scenario: Scenario, lane: usize, message: impl Into<String>) -> Self {
        let mut job = Self::new(scenario, lane);
        job.fail(FailureReason::LaneAborted {
            message: message.into(),
        });
        job
    }

    /// Scenario index
    #[inline]
    #[must_use]
    pub fn index(&self) -> ScenarioIndex {
        self.scenario.index
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn succeed(&mut self, metrics: MetricsRecord) {
        self.metrics = Some(metrics);
        self.status = JobStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) {
        self.metrics = None;
        self.status = JobStatus::Failed(reason);
        self.finished_at = Some(Utc::now());
    }

    /// Record how the output area was released
    pub(crate) fn record_release(&mut self, path: PathBuf, released: Result<Option<PathBuf>>) {
        match released {
            Ok(retained) => self.retained_dir = retained,
            Err(e) => {
                tracing::warn!("Scenario {} output area not released: {}", self.index(), e);
                self.leftover_dir = Some(path);
            }
        }
    }

    /// Failure reason, if failed
    #[must_use]
    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            JobStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Wall-clock time between pickup and completion
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessFailure;
    use crate::types::{ClosureSet, WeightPair};

    fn scenario() -> Scenario {
        Scenario {
            index: ScenarioIndex(3),
            closures: ClosureSet::empty(),
            weight: WeightPair::new(50, 50).unwrap(),
            config_path: PathBuf::from("a.sumocfg"),
            output_dir: PathBuf::from("/r/output/3"),
        }
    }

    #[test]
    fn lifecycle() {
        let mut job = SimulationJob::new(scenario(), 1);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.status.is_terminal());

        job.start();
        assert_eq!(job.status.name(), "running");
        assert!(job.started_at.is_some());

        job.fail(FailureReason::Process {
            failure: ProcessFailure::ExitCode { code: 2 },
        });
        assert!(job.status.is_terminal());
        assert!(!job.status.is_success());
        assert!(job.failure().is_some());
        assert!(job.duration().is_some());
    }

    #[test]
    fn aborted_job_is_failed() {
        let job = SimulationJob::aborted(scenario(), 0, "lane panicked");
        assert!(matches!(job.failure(), Some(FailureReason::LaneAborted { .. })));
        assert!(job.started_at.is_none());
        assert!(job.duration().is_none());
    }

    #[test]
    fn failed_release_leaves_a_trace() {
        let mut job = SimulationJob::new(scenario(), 0);
        let dir = PathBuf::from("/r/output/3");

        let err = crate::error::Error::storage(&dir, std::io::Error::other("busy"));
        job.record_release(dir.clone(), Err(err));
        assert_eq!(job.leftover_dir, Some(dir.clone()));
        assert!(job.retained_dir.is_none());

        let mut kept = SimulationJob::new(scenario(), 0);
        kept.record_release(dir.clone(), Ok(Some(dir.clone())));
        assert_eq!(kept.retained_dir, Some(dir));
        assert!(kept.leftover_dir.is_none());
    }

    #[test]
    fn status_serialization() {
        let json = serde_json::to_value(JobStatus::Succeeded).unwrap();
        assert_eq!(json["state"], "succeeded");

        let failed = JobStatus::Failed(FailureReason::LaneAborted {
            message: "boom".to_string(),
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"]["kind"], "lane_aborted");
    }
}
