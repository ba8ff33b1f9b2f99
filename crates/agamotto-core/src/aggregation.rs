//! Metrics aggregation and chart data
//!
//! Groups successful [`MetricsRecord`]s along a comparison axis and
//! computes one arithmetic mean per requested metric. Plotting is
//! delegated to a [`PlotSink`]; [`ChartDataWriter`] is the built-in sink
//! that writes shaped series as JSON for an external renderer. The
//! reference run, when there is one, travels alongside as the baseline
//! every chart is compared against.

use crate::error::{Error, Result};
use crate::metrics::{MetricsRecord, SummaryStep};
use crate::types::{ClosureSet, MetricKind, ScenarioIndex, WeightPair};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Chart data directory inside the run folder
pub const CHARTS_DIR: &str = "charts";

/// Step series chart file
pub const STEPS_CHART: &str = "steps.json";

/// Comparison axis shared by a group's members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "axis", content = "key", rename_all = "snake_case")]
pub enum GroupKey {
    /// Same weight split
    Weight(WeightPair),
    /// Same closure set (spans every weight split of a run)
    Closures(ClosureSet),
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weight(w) => write!(f, "{w}"),
            Self::Closures(c) => write!(f, "closures {c}"),
        }
    }
}

/// Records sharing a comparison axis, with per-metric means
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateGroup {
    /// Shared axis value
    pub key: GroupKey,
    /// Contributing scenarios, ascending
    pub members: Vec<ScenarioIndex>,
    /// Mean per requested metric
    pub means: IndexMap<MetricKind, f64>,
}

impl AggregateGroup {
    /// Number of contributing scenarios
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Mean of one metric
    #[inline]
    #[must_use]
    pub fn mean(&self, metric: MetricKind) -> Option<f64> {
        self.means.get(&metric).copied()
    }
}

/// Receives aggregated data for plotting
pub trait PlotSink {
    /// One metric across all groups, against the reference value if known
    ///
    /// # Errors
    /// Implementation-defined
    fn plot_metric(
        &mut self,
        metric: MetricKind,
        groups: &[AggregateGroup],
        baseline: Option<f64>,
    ) -> Result<()>;

    /// Per-scenario step time series
    ///
    /// # Errors
    /// Implementation-defined
    fn plot_series(&mut self, records: &[MetricsRecord]) -> Result<()> {
        let _ = records;
        Ok(())
    }
}

/// Groups records and computes means
#[derive(Debug, Clone)]
pub struct AggregationReporter {
    metrics: Vec<MetricKind>,
}

impl AggregationReporter {
    /// Reporter for the requested metrics
    #[must_use]
    pub fn new(metrics: impl IntoIterator<Item = MetricKind>) -> Self {
        let mut requested: Vec<MetricKind> = Vec::new();
        for metric in metrics {
            if !requested.contains(&metric) {
                requested.push(metric);
            }
        }
        Self { metrics: requested }
    }

    /// Requested metrics
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    /// Group by weight pair, ordered by weight pair
    #[must_use]
    pub fn aggregate(&self, records: &[MetricsRecord]) -> Vec<AggregateGroup> {
        let mut by_weight: BTreeMap<WeightPair, Vec<&MetricsRecord>> = BTreeMap::new();
        for record in records {
            by_weight.entry(record.weight).or_default().push(record);
        }
        by_weight
            .into_iter()
            .map(|(weight, members)| self.group(GroupKey::Weight(weight), &members))
            .collect()
    }

    /// Group by closure set, spanning every weight split
    #[must_use]
    pub fn aggregate_across_weights(&self, records: &[MetricsRecord]) -> Vec<AggregateGroup> {
        let mut by_closures: Vec<(&ClosureSet, Vec<&MetricsRecord>)> = Vec::new();
        for record in records {
            match by_closures.iter_mut().find(|(c, _)| *c == &record.closures) {
                Some((_, members)) => members.push(record),
                None => by_closures.push((&record.closures, vec![record])),
            }
        }
        by_closures
            .into_iter()
            .map(|(closures, members)| self.group(GroupKey::Closures(closures.clone()), &members))
            .collect()
    }

    fn group(&self, key: GroupKey, members: &[&MetricsRecord]) -> AggregateGroup {
        let mut indices: Vec<ScenarioIndex> = members.iter().map(|r| r.index).collect();
        indices.sort_unstable();

        let means = self
            .metrics
            .iter()
            .map(|&metric| {
                let values: Vec<f64> = members.iter().filter_map(|r| r.get(metric)).collect();
                (metric, mean(&values))
            })
            .collect();

        AggregateGroup {
            key,
            members: indices,
            means,
        }
    }

    /// Aggregate by weight pair and hand every requested metric to `sink`
    ///
    /// Charts are still produced from the baseline alone when no scenario
    /// succeeded.
    ///
    /// # Errors
    /// - Whatever the sink returns
    pub fn publish(
        &self,
        records: &[MetricsRecord],
        baseline: Option<&MetricsRecord>,
        sink: &mut dyn PlotSink,
    ) -> Result<Vec<AggregateGroup>> {
        let groups = self.aggregate(records);
        if groups.is_empty() && baseline.is_none() {
            tracing::info!("No successful scenarios, nothing to plot");
            return Ok(groups);
        }
        for &metric in &self.metrics {
            sink.plot_metric(metric, &groups, baseline.and_then(|b| b.get(metric)))?;
        }
        sink.plot_series(records)?;
        Ok(groups)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    values.iter().sum::<f64>() / n
}

/// One bar of a metric chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Group label
    pub label: String,
    /// Mean value
    pub value: f64,
    /// Contributing scenarios
    pub scenarios: Vec<ScenarioIndex>,
}

/// Chart data for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricChart {
    /// Metric plotted
    pub metric: MetricKind,
    /// Reference run value, drawn as the comparison line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<f64>,
    /// Points sorted by ascending value
    pub points: Vec<ChartPoint>,
}

/// Step series of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesChart {
    /// Scenario index
    pub index: ScenarioIndex,
    /// Weight split label
    pub label: String,
    /// Steps in time order
    pub steps: Vec<SummaryStep>,
}

/// Writes chart data as JSON under `<run_dir>/charts`
#[derive(Debug, Clone)]
pub struct ChartDataWriter {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl ChartDataWriter {
    /// Writer for a run folder
    #[must_use]
    pub fn new(run_dir: &Path) -> Self {
        Self {
            dir: run_dir.join(CHARTS_DIR),
            written: Vec::new(),
        }
    }

    /// Chart directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far
    #[inline]
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write<T: Serialize>(&mut self, file: &str, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::storage(&self.dir, e))?;
        let path = self.dir.join(file);
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| Error::storage(&path, std::io::Error::other(e)))?;
        std::fs::write(&path, bytes).map_err(|e| Error::storage(&path, e))?;
        tracing::debug!("Wrote chart data {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

impl PlotSink for ChartDataWriter {
    fn plot_metric(
        &mut self,
        metric: MetricKind,
        groups: &[AggregateGroup],
        baseline: Option<f64>,
    ) -> Result<()> {
        let mut points: Vec<ChartPoint> = groups
            .iter()
            .filter_map(|g| {
                g.mean(metric).map(|value| ChartPoint {
                    label: g.key.to_string(),
                    value,
                    scenarios: g.members.clone(),
                })
            })
            .collect();
        points.sort_by(|a, b| a.value.total_cmp(&b.value));

        self.write(
            &format!("{metric}.json"),
            &MetricChart {
                metric,
                baseline,
                points,
            },
        )
    }

    fn plot_series(&mut self, records: &[MetricsRecord]) -> Result<()> {
        let series: Vec<SeriesChart> = records
            .iter()
            .filter(|r| !r.steps.is_empty())
            .map(|r| SeriesChart {
                index: r.index,
                label: r.weight.to_string(),
                steps: r.steps.clone(),
            })
            .collect();
        if series.is_empty() {
            return Ok(());
        }
        self.write(STEPS_CHART, &series)
    }
}
