//! Job scheduler
//!
//! Spreads a scenario matrix over a bounded set of worker lanes and drives
//! every scenario through its unit of work:
//!
//! 1. acquire the output area
//! 2. run the engine
//! 3. extract metrics (on success)
//! 4. release the output area under the retention policy
//!
//! Lanes are tokio tasks; each runs its scenarios strictly in sequence.
//! Per-scenario failures are recorded on the job and never reach sibling
//! scenarios. A panicking lane is contained: whatever it did not finish is
//! reported as `LaneAborted`.

pub mod job;
pub mod plan;
pub mod progress;

pub use job::{JobStatus, SimulationJob};
pub use plan::LanePlan;
pub use progress::{ProgressSnapshot, ProgressTracker};

use crate::config::RunConfig;
use crate::error::{FailureReason, Result};
use crate::matrix::ScenarioMatrix;
use crate::metrics::MetricsCollector;
use crate::output_area::OutputAreaManager;
use crate::runner::{ScenarioExecutor, SimulationRunner};
use crate::types::{Scenario, ScenarioIndex};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::Instrument;

/// Runs a scenario matrix across worker lanes
pub struct JobScheduler {
    config: Arc<RunConfig>,
    executor: Arc<dyn ScenarioExecutor>,
    areas: Arc<OutputAreaManager>,
    collector: MetricsCollector,
    statuses: Arc<DashMap<ScenarioIndex, JobStatus>>,
    progress: Arc<ProgressTracker>,
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("min_sim", &self.config.min_sim)
            .field("max_concurrent", &self.config.max_concurrent)
            .field("show_gui", &self.config.show_gui)
            .field("progress", &self.progress.snapshot())
            .finish_non_exhaustive()
    }
}

impl JobScheduler {
    /// Create a scheduler that launches the configured engine
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if the configuration is invalid
    pub fn new(config: Arc<RunConfig>) -> Result<Self> {
        let runner = SimulationRunner::new(&config);
        Self::with_executor(config, Arc::new(runner))
    }

    /// Create with custom executor
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if the configuration is invalid
    pub fn with_executor(config: Arc<RunConfig>, executor: Arc<dyn ScenarioExecutor>) -> Result<Self> {
        config.validate()?;
        let areas = Arc::new(OutputAreaManager::new(config.keep_output, config.debug));
        Ok(Self {
            config,
            executor,
            areas,
            collector: MetricsCollector::new(),
            statuses: Arc::new(DashMap::new()),
            progress: Arc::new(ProgressTracker::new()),
        })
    }

    /// Lane assignment for `n` scenarios under this configuration
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if `min_sim` or `max_concurrent` is zero
    pub fn plan(&self, n: usize) -> Result<LanePlan> {
        LanePlan::compute(n, self.config.min_sim, self.config.max_concurrent, self.config.show_gui)
    }

    /// Output areas (retained directories are looked up here)
    #[inline]
    #[must_use]
    pub fn areas(&self) -> &Arc<OutputAreaManager> {
        &self.areas
    }

    /// Live status of a scenario in the current run
    #[must_use]
    pub fn status(&self, index: ScenarioIndex) -> Option<JobStatus> {
        self.statuses.get(&index).map(|s| s.value().clone())
    }

    /// Current progress counters
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Run every scenario and return the jobs ordered by scenario index
    ///
    /// Only configuration problems are returned as errors; scenario
    /// failures are reported through each job's status.
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if the lane plan cannot be computed
    pub async fn run(&self, matrix: &ScenarioMatrix) -> Result<Vec<SimulationJob>> {
        let plan = self.plan(matrix.len())?;

        self.statuses.clear();
        self.progress.reset(matrix.len());
        for scenario in matrix {
            self.statuses.insert(scenario.index, JobStatus::Pending);
        }

        if plan.is_empty() {
            tracing::info!("No scenarios to run");
            return Ok(Vec::new());
        }

        tracing::info!(
            "Running {} scenarios on {} lane(s) (min_sim={}, max_concurrent={}, gui={})",
            matrix.len(),
            plan.lane_count(),
            self.config.min_sim,
            self.config.max_concurrent,
            self.config.show_gui
        );

        let finished: Arc<DashMap<ScenarioIndex, SimulationJob>> = Arc::new(DashMap::new());

        let handles: Vec<_> = plan
            .lanes()
            .iter()
            .enumerate()
            .map(|(lane, range)| {
                let worker = self.worker(lane, matrix.scenarios()[range.clone()].to_vec(), &finished);
                tokio::spawn(worker.run().instrument(tracing::info_span!("lane", lane)))
            })
            .collect();

        let lane_results = join_all(handles).await;

        for ((lane, range), result) in plan.lanes().iter().enumerate().zip(lane_results) {
            let Err(e) = result else { continue };
            tracing::error!("Lane {} aborted: {}", lane, e);
            for scenario in &matrix.scenarios()[range.clone()] {
                if finished.contains_key(&scenario.index) {
                    continue;
                }
                let job = SimulationJob::aborted(scenario.clone(), lane, e.to_string());
                self.statuses.insert(scenario.index, job.status.clone());
                self.progress.record(false);
                finished.insert(scenario.index, job);
            }
        }

        let mut jobs = Vec::with_capacity(matrix.len());
        for (lane, range) in plan.lanes().iter().enumerate() {
            for scenario in &matrix.scenarios()[range.clone()] {
                let job = finished.remove(&scenario.index).map_or_else(
                    || SimulationJob::aborted(scenario.clone(), lane, "no outcome recorded"),
                    |(_, job)| job,
                );
                jobs.push(job);
            }
        }
        jobs.sort_by_key(SimulationJob::index);

        let snap = self.progress.snapshot();
        tracing::info!(
            "Run finished: {} succeeded, {} failed",
            snap.succeeded,
            snap.failed
        );

        Ok(jobs)
    }

    /// Run the closure-free reference scenario on its own
    ///
    /// Uses the same unit of work as a lane, but stays out of the lane plan,
    /// the progress counters and the live status map. A failure or panic is
    /// recorded on the returned job.
    pub async fn run_reference(&self, scenario: Scenario) -> SimulationJob {
        let worker = self.worker(0, Vec::new(), &Arc::new(DashMap::new()));
        let task = {
            let scenario = scenario.clone();
            async move { worker.attempt(scenario).await }
        };

        let job = match tokio::spawn(task.instrument(tracing::info_span!("reference"))).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Reference run aborted: {}", e);
                SimulationJob::aborted(scenario, 0, e.to_string())
            }
        };
        match job.failure() {
            None => tracing::info!("Reference simulation succeeded"),
            Some(reason) => tracing::warn!("Reference simulation failed: {}", reason),
        }
        job
    }

    fn worker(
        &self,
        lane: usize,
        scenarios: Vec<Scenario>,
        finished: &Arc<DashMap<ScenarioIndex, SimulationJob>>,
    ) -> LaneWorker {
        LaneWorker {
            lane,
            scenarios,
            executor: Arc::clone(&self.executor),
            areas: Arc::clone(&self.areas),
            collector: self.collector,
            statuses: Arc::clone(&self.statuses),
            progress: Arc::clone(&self.progress),
            finished: Arc::clone(finished),
            keep_output: self.config.keep_output,
        }
    }
}

/// Everything one lane task owns
struct LaneWorker {
    lane: usize,
    scenarios: Vec<Scenario>,
    executor: Arc<dyn ScenarioExecutor>,
    areas: Arc<OutputAreaManager>,
    collector: MetricsCollector,
    statuses: Arc<DashMap<ScenarioIndex, JobStatus>>,
    progress: Arc<ProgressTracker>,
    finished: Arc<DashMap<ScenarioIndex, SimulationJob>>,
    keep_output: bool,
}

impl LaneWorker {
    async fn run(self) {
        tracing::debug!("Lane {} starting with {} scenario(s)", self.lane, self.scenarios.len());
        for scenario in &self.scenarios {
            let span = tracing::info_span!("scenario", index = scenario.index.value());
            let job = self.run_scenario(scenario.clone()).instrument(span).await;
            self.finished.insert(job.index(), job);
        }
        tracing::debug!("Lane {} drained", self.lane);
    }

    async fn run_scenario(&self, scenario: Scenario) -> SimulationJob {
        self.statuses.insert(scenario.index, JobStatus::Running);
        let job = self.attempt(scenario).await;

        self.statuses.insert(job.index(), job.status.clone());
        let done = self.progress.record(job.status.is_success());
        let total = self.progress.snapshot().total;
        match job.failure() {
            None => tracing::info!("[{}/{}] Scenario {} succeeded", done, total, job.scenario.label()),
            Some(reason) => tracing::warn!("[{}/{}] Scenario {} failed: {}", done, total, job.scenario.label(), reason),
        }

        job
    }

    /// acquire, run, extract, release
    async fn attempt(&self, scenario: Scenario) -> SimulationJob {
        let mut job = SimulationJob::new(scenario, self.lane);
        job.start();
        match self.execute(&mut job).await {
            Ok(metrics) => job.succeed(metrics),
            Err(reason) => job.fail(reason),
        }
        job
    }

    async fn execute(
        &self,
        job: &mut SimulationJob,
    ) -> std::result::Result<crate::metrics::MetricsRecord, FailureReason> {
        let lease = self
            .areas
            .acquire(&job.scenario)
            .map_err(crate::error::Error::into_failure_reason)?;

        let outcome = self.executor.run(&job.scenario, &lease).await;
        let extracted = match &outcome.failure {
            Some(failure) => Err(FailureReason::Process {
                failure: failure.clone(),
            }),
            None => self
                .collector
                .extract(&job.scenario, lease.path())
                .map_err(crate::error::Error::into_failure_reason),
        };
        job.outcome = Some(outcome);

        let path = lease.path().to_path_buf();
        job.record_release(path, self.areas.release(lease, self.keep_output));

        extracted
    }
}
