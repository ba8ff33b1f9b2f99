//! Run report
//!
//! Final, serializable summary of a run: every scenario with its status,
//! plus the aggregate groups computed from the successful ones. The
//! reference run is reported on its own and never counted with the matrix.

use crate::aggregation::{AggregateGroup, AggregationReporter, GroupKey};
use crate::error::{Error, FailureReason, Result};
use crate::metrics::MetricsRecord;
use crate::scheduler::SimulationJob;
use crate::types::{MetricKind, ScenarioIndex, WeightPair};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// Report file name inside the run folder
pub const REPORT_FILE: &str = "report.json";

/// Unique run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One scenario line of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Scenario index
    pub index: ScenarioIndex,
    /// Weight split
    pub weight: WeightPair,
    /// Lane the scenario ran on
    pub lane: usize,
    /// Final status name
    pub status: String,
    /// Why it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    /// Retained output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retained_dir: Option<PathBuf>,
    /// Output directory that could not be removed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leftover_dir: Option<PathBuf>,
    /// Engine wall-clock time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    /// Pickup to completion, including extraction and cleanup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_ms: Option<i64>,
    /// Extracted metric values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<IndexMap<MetricKind, f64>>,
}

impl From<&SimulationJob> for ReportEntry {
    fn from(job: &SimulationJob) -> Self {
        Self {
            index: job.index(),
            weight: job.scenario.weight,
            lane: job.lane,
            status: job.status.name().to_string(),
            failure: job.failure().cloned(),
            retained_dir: job.retained_dir.clone(),
            leftover_dir: job.leftover_dir.clone(),
            elapsed_ms: job
                .outcome
                .as_ref()
                .map(|o| u64::try_from(o.elapsed.as_millis()).unwrap_or(u64::MAX)),
            wall_ms: job.duration().map(|d| d.num_milliseconds()),
            metrics: job.metrics.as_ref().map(|m| m.values.clone()),
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Run folder
    pub run_dir: PathBuf,
    /// When scheduling started
    pub started_at: DateTime<Utc>,
    /// When the report was built
    pub finished_at: DateTime<Utc>,
    /// Closed segments shared by every scenario
    pub closures: Vec<String>,
    /// Every scenario, by index
    pub entries: Vec<ReportEntry>,
    /// Scenarios that produced metrics
    pub succeeded: usize,
    /// Scenarios that failed
    pub failed: usize,
    /// Scenarios left out of aggregation
    pub excluded: usize,
    /// Means per weight split
    pub groups: Vec<AggregateGroup>,
    /// Means across every weight split
    pub across_weights: Vec<AggregateGroup>,
    /// Closure-free reference run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReportEntry>,
    /// Metrics of the reference run, when it succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<MetricsRecord>,
}

/// Metrics of the jobs that succeeded
#[must_use]
pub fn successful_records(jobs: &[SimulationJob]) -> Vec<MetricsRecord> {
    jobs.iter()
        .filter(|j| j.status.is_success())
        .filter_map(|j| j.metrics.clone())
        .collect()
}

impl RunReport {
    /// Build the report from finished jobs
    #[must_use]
    pub fn build(
        run_id: RunId,
        run_dir: &Path,
        started_at: DateTime<Utc>,
        jobs: &[SimulationJob],
        reference: Option<&SimulationJob>,
        reporter: &AggregationReporter,
    ) -> Self {
        let records = successful_records(jobs);
        let succeeded = records.len();
        let failed = jobs.len() - succeeded;

        let closures: Vec<String> = jobs
            .first()
            .map(|j| j.scenario.closures.iter().map(String::from).collect())
            .unwrap_or_default();

        Self {
            run_id,
            run_dir: run_dir.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            closures,
            entries: jobs.iter().map(ReportEntry::from).collect(),
            succeeded,
            failed,
            excluded: failed,
            groups: reporter.aggregate(&records),
            across_weights: reporter.aggregate_across_weights(&records),
            reference: reference.map(ReportEntry::from),
            baseline: reference.and_then(baseline_of),
        }
    }

    /// Number of scenarios
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Write the report as pretty JSON
    ///
    /// # Errors
    /// - `Error::Storage` if the file cannot be written
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::storage(path, std::io::Error::other(e)))?;
        std::fs::write(path, bytes).map_err(|e| Error::storage(path, e))?;
        tracing::info!("Report written to {}", path.display());
        Ok(())
    }

    /// Human-readable summary
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let closures = if self.closures.is_empty() {
            "(none)".to_string()
        } else {
            self.closures.join(",")
        };

        let _ = writeln!(out, "Run {} ({})", self.run_id, self.run_dir.display());
        let _ = writeln!(out, "Closures: {closures}");
        let _ = writeln!(
            out,
            "Scenarios: {} total, {} succeeded, {} failed ({} excluded from aggregation)",
            self.total(),
            self.succeeded,
            self.failed,
            self.excluded
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{:>5}  {:<9}  {:<4}  {:<9}  detail", "index", "weight", "lane", "status");
        for entry in &self.entries {
            write_entry(&mut out, entry);
        }

        if let Some(reference) = &self.reference {
            let _ = writeln!(out);
            let _ = writeln!(out, "Reference (no closures):");
            write_entry(&mut out, reference);
            if let Some(baseline) = &self.baseline {
                for (metric, value) in &baseline.values {
                    let _ = writeln!(out, "  {:<12} {value:>14.3}", metric.as_str());
                }
            }
        }

        for group in self.groups.iter().chain(&self.across_weights) {
            let _ = writeln!(out);
            let _ = write!(out, "[{}] {} scenario(s)", group.key, group.size());
            if let GroupKey::Weight(weight) = &group.key {
                let _ = write!(out, ", {:.0}% aware", weight.aware_share() * 100.0);
            }
            let _ = writeln!(out);
            for (metric, value) in &group.means {
                let _ = writeln!(out, "  {:<12} {value:>14.3}", metric.as_str());
            }
        }

        out
    }
}

fn baseline_of(job: &SimulationJob) -> Option<MetricsRecord> {
    if job.status.is_success() {
        job.metrics.clone()
    } else {
        None
    }
}

fn write_entry(out: &mut String, entry: &ReportEntry) {
    let mut detail = match (&entry.failure, &entry.retained_dir) {
        (Some(reason), _) => reason.to_string(),
        (None, Some(dir)) => format!("kept at {}", dir.display()),
        (None, None) => String::new(),
    };
    if let Some(dir) = &entry.leftover_dir {
        if !detail.is_empty() {
            detail.push_str("; ");
        }
        let _ = write!(detail, "left behind at {}", dir.display());
    }
    let _ = writeln!(
        out,
        "{:>5}  {:<9}  {:<4}  {:<9}  {}",
        entry.index.value(),
        entry.weight.to_string(),
        entry.lane,
        entry.status,
        detail
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessFailure;
    use crate::runner::RunOutcome;
    use crate::types::{ClosureSet, Scenario};
    use std::time::Duration;

    fn job(index: usize, weight: (i64, i64), ok: bool) -> SimulationJob {
        let scenario = Scenario {
            index: ScenarioIndex(index),
            closures: ClosureSet::parse(["E1", "E2"]).unwrap(),
            weight: WeightPair::new(weight.0, weight.1).unwrap(),
            config_path: PathBuf::from("a.sumocfg"),
            output_dir: PathBuf::from(format!("/r/output/{index}")),
        };
        let mut job = SimulationJob::new(scenario.clone(), index);
        job.start();
        if ok {
            job.outcome = Some(RunOutcome::success(Duration::from_millis(40)));
            job.succeed(MetricsRecord {
                index: scenario.index,
                weight: scenario.weight,
                closures: scenario.closures,
                values: MetricKind::ALL.iter().map(|&m| (m, 2.0)).collect(),
                steps: Vec::new(),
            });
        } else {
            let failure = ProcessFailure::ExitCode { code: 1 };
            job.outcome = Some(RunOutcome::failed(failure.clone(), Duration::from_millis(5)));
            job.fail(FailureReason::Process { failure });
        }
        job
    }

    #[test]
    fn counts_and_groups() {
        let jobs = vec![job(0, (100, 0), true), job(1, (0, 100), false), job(2, (50, 50), true)];
        let reporter = AggregationReporter::new([MetricKind::Duration]);
        let report = RunReport::build(RunId::new(), Path::new("/r"), Utc::now(), &jobs, None, &reporter);

        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.excluded, 1);
        assert_eq!(report.groups.len(), 2);
        assert!(report.groups.iter().all(|g| !g.members.contains(&ScenarioIndex(1))));
        assert_eq!(report.across_weights.len(), 1);
        assert_eq!(report.across_weights[0].size(), 2);
        assert_eq!(report.closures, vec!["E1", "E2"]);
        assert_eq!(report.entries[1].status, "failed");
        assert_eq!(report.entries[0].elapsed_ms, Some(40));
        assert!(report.entries[0].wall_ms.is_some_and(|ms| ms >= 0));
        assert!(report.reference.is_none());
        assert!(report.baseline.is_none());
    }

    #[test]
    fn all_failed_run_has_no_groups() {
        let jobs = vec![job(0, (100, 0), false), job(1, (0, 100), false)];
        let report = RunReport::build(
            RunId::new(),
            Path::new("/r"),
            Utc::now(),
            &jobs,
            None,
            &AggregationReporter::new(MetricKind::ALL),
        );
        assert_eq!(report.succeeded, 0);
        assert!(report.groups.is_empty());
        assert!(report.across_weights.is_empty());
    }

    #[test]
    fn text_lists_every_scenario() {
        let jobs = vec![job(0, (100, 0), true), job(1, (0, 100), false)];
        let report = RunReport::build(
            RunId::new(),
            Path::new("/r"),
            Utc::now(),
            &jobs,
            None,
            &AggregationReporter::new([MetricKind::Co2]),
        );

        let text = report.render_text();
        assert!(text.contains("Closures: E1,E2"));
        assert!(text.contains("1 failed (1 excluded from aggregation)"));
        assert!(text.contains("engine exited with code 1"));
        assert!(text.contains("[100:0] 1 scenario(s), 100% aware"));
        assert!(!text.contains("Reference"));
        assert!(text.contains("CO2"));
    }

    #[test]
    fn json_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = vec![job(0, (100, 0), true)];
        let report = RunReport::build(
            RunId::new(),
            tmp.path(),
            Utc::now(),
            &jobs,
            None,
            &AggregationReporter::new(MetricKind::ALL),
        );

        let path = tmp.path().join(REPORT_FILE);
        report.write_json(&path).unwrap();
        let loaded: RunReport = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn reference_is_reported_apart_from_the_matrix() {
        let jobs = vec![job(0, (100, 0), true), job(1, (0, 100), true)];
        let mut reference = job(2, (0, 100), true);
        reference.scenario.closures = ClosureSet::empty();
        let report = RunReport::build(
            RunId::new(),
            Path::new("/r"),
            Utc::now(),
            &jobs,
            Some(&reference),
            &AggregationReporter::new([MetricKind::Co2]),
        );

        assert_eq!(report.total(), 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.closures, vec!["E1", "E2"]);
        assert_eq!(report.reference.as_ref().map(|e| e.index), Some(ScenarioIndex(2)));
        let baseline = report.baseline.as_ref().unwrap();
        assert_eq!(baseline.get(MetricKind::Co2), Some(2.0));

        let text = report.render_text();
        assert!(text.contains("Reference (no closures):"));
    }

    #[test]
    fn failed_reference_has_no_baseline() {
        let jobs = vec![job(0, (100, 0), true)];
        let reference = job(1, (0, 100), false);
        let report = RunReport::build(
            RunId::new(),
            Path::new("/r"),
            Utc::now(),
            &jobs,
            Some(&reference),
            &AggregationReporter::new(MetricKind::ALL),
        );

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.reference.as_ref().map(|e| e.status.as_str()), Some("failed"));
        assert!(report.baseline.is_none());
        assert!(report.render_text().contains("engine exited with code 1"));
    }

    #[test]
    fn leftover_directory_is_shown() {
        let mut leftover = job(0, (100, 0), true);
        leftover.leftover_dir = Some(PathBuf::from("/r/output/0"));
        let report = RunReport::build(
            RunId::new(),
            Path::new("/r"),
            Utc::now(),
            &[leftover],
            None,
            &AggregationReporter::new([MetricKind::Co2]),
        );

        assert_eq!(report.entries[0].leftover_dir, Some(PathBuf::from("/r/output/0")));
        assert!(report.render_text().contains("left behind at /r/output/0"));
    }
}
