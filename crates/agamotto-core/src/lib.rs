//! Agamotto Core - Scenario Matrix Scheduler
//!
//! Runs an external traffic-simulation engine once per scenario, where a
//! scenario is the run's set of closed road segments combined with one
//! closure-awareness weight split, then aggregates the resulting metrics.
//!
//! The pipeline:
//! - Expands closures and weight pairs into a scenario matrix
//! - Spreads scenarios over bounded worker lanes (min batch, max concurrency)
//! - Supervises each engine process and its output directory
//! - Extracts, aggregates and charts metrics; offers GUI replay
//!
//! # Example
//!
//! ```rust,ignore
//! use agamotto_core::{RunConfig, ScenarioOrchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::new("city.sumocfg")
//!     .with_closures(["E12", "E13"])
//!     .with_weights([(100, 0), (0, 100), (50, 50)])
//!     .with_max_concurrent(3);
//!
//! let orchestrator = ScenarioOrchestrator::new(config)?;
//! let summary = orchestrator.execute().await?;
//!
//! println!("{}", summary.report.render_text());
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod config;
pub mod error;
pub mod matrix;
pub mod metrics;
pub mod orchestrator;
pub mod output_area;
pub mod replay;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod types;

// Re-exports for convenience
pub use aggregation::{AggregateGroup, AggregationReporter, ChartDataWriter, GroupKey, PlotSink};
pub use config::{EngineConfig, RunConfig};
pub use error::{Error, FailureReason, ProcessFailure, Result};
pub use matrix::{ScenarioMatrix, ScenarioMatrixBuilder};
pub use metrics::{MetricsCollector, MetricsRecord, SummaryStep};
pub use orchestrator::{create_run_dir, RunSummary, ScenarioOrchestrator};
pub use output_area::{OutputAreaManager, OutputLease};
pub use replay::{parse_selection, ReplayGate, ReplayOutcome, Selection, Viewer};
pub use report::{RunId, RunReport};
pub use runner::{RunOutcome, ScenarioExecutor, SimulationRunner};
pub use scheduler::{JobScheduler, JobStatus, LanePlan, ProgressSnapshot, SimulationJob};
pub use types::{ClosureSet, MetricKind, Scenario, ScenarioIndex, WeightPair};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Agamotto Core
    pub use crate::{
        ClosureSet, Error, JobScheduler, JobStatus, MetricKind, Result, RunConfig, RunReport,
        Scenario, ScenarioExecutor, ScenarioIndex, ScenarioMatrix, ScenarioMatrixBuilder,
        ScenarioOrchestrator, WeightPair,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
