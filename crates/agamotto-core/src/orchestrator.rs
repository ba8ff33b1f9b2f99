//! Run orchestration
//!
//! Drives one complete run:
//! 1. create the run folder
//! 2. expand the scenario matrix
//! 3. run the closure-free reference scenario, unless disabled
//! 4. schedule every scenario across lanes
//! 5. aggregate metrics and write chart data against the baseline
//! 6. write the run report
//!
//! Replay is offered afterwards through [`ScenarioOrchestrator::replay_gate`].

use crate::aggregation::{AggregationReporter, ChartDataWriter};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::matrix::{ScenarioMatrix, ScenarioMatrixBuilder};
use crate::replay::ReplayGate;
use crate::report::{successful_records, RunId, RunReport, REPORT_FILE};
use crate::runner::{ScenarioExecutor, SimulationRunner};
use crate::scheduler::{JobScheduler, LanePlan, SimulationJob};
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Timestamp layout of run folder names
pub const RUN_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Create `<root>/<timestamp>`, suffixing `-N` when the name is taken
///
/// # Errors
/// - `Error::Storage` if the directory cannot be created
pub fn create_run_dir(root: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    std::fs::create_dir_all(root).map_err(|e| Error::storage(root, e))?;

    let stamp = now.format(RUN_DIR_FORMAT).to_string();
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            stamp.clone()
        } else {
            format!("{stamp}-{attempt}")
        };
        let dir = root.join(name);
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(Error::storage(&dir, e)),
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run folder
    pub run_dir: PathBuf,
    /// Scenarios that were scheduled
    pub matrix: ScenarioMatrix,
    /// Jobs by scenario index
    pub jobs: Vec<SimulationJob>,
    /// Reference run, when enabled
    pub reference: Option<SimulationJob>,
    /// Final report
    pub report: RunReport,
    /// Chart data files written
    pub charts: Vec<PathBuf>,
}

/// Top-level driver for a scenario run
#[derive(Debug)]
pub struct ScenarioOrchestrator {
    /// Configuration
    config: Arc<RunConfig>,
    /// Lane scheduler
    scheduler: JobScheduler,
    /// Metric aggregation
    reporter: AggregationReporter,
}

impl ScenarioOrchestrator {
    /// Create an orchestrator that launches the configured engine
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if the configuration is invalid
    pub fn new(config: RunConfig) -> Result<Self> {
        let config = Arc::new(config);
        let scheduler = JobScheduler::new(Arc::clone(&config))?;
        Ok(Self::assemble(config, scheduler))
    }

    /// Create with custom executor
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if the configuration is invalid
    pub fn with_executor(config: RunConfig, executor: Arc<dyn ScenarioExecutor>) -> Result<Self> {
        let config = Arc::new(config);
        let scheduler = JobScheduler::with_executor(Arc::clone(&config), executor)?;
        Ok(Self::assemble(config, scheduler))
    }

    fn assemble(config: Arc<RunConfig>, scheduler: JobScheduler) -> Self {
        let reporter = AggregationReporter::new(config.metrics.iter().copied());
        Self {
            config,
            scheduler,
            reporter,
        }
    }

    /// Shared configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &Arc<RunConfig> {
        &self.config
    }

    /// Underlying scheduler
    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Matrix and lane plan without running anything
    ///
    /// # Errors
    /// - `Error::InvalidParameter` for bad closures, weights or lane limits
    pub fn plan(&self) -> Result<(ScenarioMatrix, LanePlan)> {
        let matrix = ScenarioMatrixBuilder::from_config(&self.config, &self.config.run_root).build()?;
        let plan = self.scheduler.plan(matrix.len())?;
        Ok((matrix, plan))
    }

    /// Execute a full run
    ///
    /// # Errors
    /// - `Error::InvalidParameter` for bad closures or weights
    /// - `Error::Storage` if the run folder or report cannot be written
    pub async fn execute(&self) -> Result<RunSummary> {
        let run_id = RunId::new();
        let run_dir = create_run_dir(&self.config.run_root, Local::now())?;
        tracing::info!("Run {} starting in {}", run_id, run_dir.display());

        let matrix = match ScenarioMatrixBuilder::from_config(&self.config, &run_dir).build() {
            Ok(matrix) => matrix,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir(&run_dir) {
                    tracing::warn!("Cannot remove {}: {}", run_dir.display(), cleanup);
                }
                return Err(e);
            }
        };
        tracing::info!(
            "Scenario matrix: {} scenario(s), closures {}",
            matrix.len(),
            matrix.closures()
        );

        let started_at = Utc::now();
        let reference = if self.config.reference {
            let scenario = matrix.reference_scenario(&self.config.config_path, &run_dir);
            Some(self.scheduler.run_reference(scenario).await)
        } else {
            None
        };
        let jobs = self.scheduler.run(&matrix).await?;

        let records = successful_records(&jobs);
        let baseline = reference
            .as_ref()
            .filter(|job| job.status.is_success())
            .and_then(|job| job.metrics.as_ref());
        let mut charts = ChartDataWriter::new(&run_dir);
        if let Err(e) = self.reporter.publish(&records, baseline, &mut charts) {
            tracing::warn!("Chart data incomplete: {}", e);
        }

        let report = RunReport::build(
            run_id,
            &run_dir,
            started_at,
            &jobs,
            reference.as_ref(),
            &self.reporter,
        );
        report.write_json(&run_dir.join(REPORT_FILE))?;
        tracing::info!(
            "Run {} complete: {} succeeded, {} failed",
            run_id,
            report.succeeded,
            report.failed
        );

        Ok(RunSummary {
            run_dir,
            matrix,
            jobs,
            reference,
            report,
            charts: charts.written().to_vec(),
        })
    }

    /// Replay gate over a finished run, launching the configured viewer
    #[must_use]
    pub fn replay_gate(&self, summary: &RunSummary) -> ReplayGate {
        let viewer = Arc::new(SimulationRunner::new(&self.config));
        ReplayGate::new(summary.matrix.clone(), &summary.run_dir, viewer)
            .with_retained(self.scheduler.areas().retained_paths())
    }
}
