//! Metrics extraction
//!
//! Parses a finished scenario's output artifacts:
//! - `metrics.json` (required): object keyed by metric name, values are
//!   numbers or numeric strings, `""` meaning unavailable (read as `0.0`)
//! - `steps.jsonl` (optional): one summary step per line

use crate::error::{Error, Result};
use crate::types::{ClosureSet, MetricKind, Scenario, ScenarioIndex, WeightPair};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Required metrics artifact
pub const METRICS_FILE: &str = "metrics.json";

/// Optional per-step summary artifact
pub const STEPS_FILE: &str = "steps.jsonl";

/// One simulation step summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SummaryStep {
    /// Simulation time (s)
    pub time: f64,
    /// Vehicles running
    pub running: u64,
    /// Vehicles waiting for insertion
    pub waiting: u64,
    /// Vehicles halting
    pub halting: u64,
    /// Teleports so far
    pub teleports: u64,
    /// Mean speed (m/s)
    pub mean_speed: f64,
    /// Mean waiting time (s)
    pub mean_waiting_time: f64,
}

/// Metrics of one successfully completed scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Scenario the values belong to
    pub index: ScenarioIndex,
    /// Weight split of the scenario
    pub weight: WeightPair,
    /// Closures of the scenario
    pub closures: ClosureSet,
    /// Value per metric, in reporting order
    pub values: IndexMap<MetricKind, f64>,
    /// Step time series (empty when not written)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<SummaryStep>,
}

impl MetricsRecord {
    /// Value of one metric
    #[inline]
    #[must_use]
    pub fn get(&self, metric: MetricKind) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

/// Reads scenario artifacts into [`MetricsRecord`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a collector
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse the artifacts in `output_dir`
    ///
    /// # Errors
    /// - `Error::MetricsParse` if `metrics.json` is missing, malformed, lacks
    ///   a metric or holds a non-numeric value, or a step line is malformed
    pub fn extract(&self, scenario: &Scenario, output_dir: &Path) -> Result<MetricsRecord> {
        let path = output_dir.join(METRICS_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| Error::metrics(&path, e.to_string()))?;
        let values = parse_metrics(&text).map_err(|reason| Error::metrics(&path, reason))?;

        let steps_path = output_dir.join(STEPS_FILE);
        let steps = if steps_path.is_file() {
            let text = std::fs::read_to_string(&steps_path)
                .map_err(|e| Error::metrics(&steps_path, e.to_string()))?;
            parse_steps(&text).map_err(|reason| Error::metrics(&steps_path, reason))?
        } else {
            Vec::new()
        };

        tracing::debug!(
            "Scenario {} metrics parsed ({} steps)",
            scenario.index,
            steps.len()
        );

        Ok(MetricsRecord {
            index: scenario.index,
            weight: scenario.weight,
            closures: scenario.closures.clone(),
            values,
            steps,
        })
    }
}

fn parse_metrics(text: &str) -> std::result::Result<IndexMap<MetricKind, f64>, String> {
    let json: serde_json::Value = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    let object = json
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    let mut values = IndexMap::with_capacity(MetricKind::ALL.len());
    for metric in MetricKind::ALL {
        let raw = object
            .get(metric.as_str())
            .ok_or_else(|| format!("missing metric {metric}"))?;
        values.insert(metric, numeric(metric, raw)?);
    }
    Ok(values)
}

fn numeric(metric: MetricKind, raw: &serde_json::Value) -> std::result::Result<f64, String> {
    match raw {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("metric {metric} is out of range")),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(0.0),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("metric {metric} is not numeric: '{s}'")),
        other => Err(format!("metric {metric} is not numeric: {other}")),
    }
}

fn parse_steps(text: &str) -> std::result::Result<Vec<SummaryStep>, String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| format!("line {}: {e}", n + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scenario() -> Scenario {
        Scenario {
            index: ScenarioIndex(1),
            closures: ClosureSet::parse(["E1"]).unwrap(),
            weight: WeightPair::new(0, 100).unwrap(),
            config_path: PathBuf::from("a.sumocfg"),
            output_dir: PathBuf::from("unused"),
        }
    }

    fn full_metrics(value: f64) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for metric in MetricKind::ALL {
            object.insert(metric.as_str().to_string(), serde_json::json!(value));
        }
        serde_json::Value::Object(object)
    }

    #[test]
    fn extracts_every_metric() {
        let tmp = tempfile::tempdir().unwrap();
        let mut json = full_metrics(12.5);
        json["duration"] = serde_json::json!("311.2");
        json["waitingTime"] = serde_json::json!("");
        std::fs::write(tmp.path().join(METRICS_FILE), json.to_string()).unwrap();

        let record = MetricsCollector::new().extract(&scenario(), tmp.path()).unwrap();
        assert_eq!(record.index, ScenarioIndex(1));
        assert_eq!(record.values.len(), 13);
        assert_eq!(record.get(MetricKind::Duration), Some(311.2));
        assert_eq!(record.get(MetricKind::WaitingTime), Some(0.0));
        assert_eq!(record.get(MetricKind::Co2), Some(12.5));
        assert!(record.steps.is_empty());

        let order: Vec<_> = record.values.keys().copied().collect();
        assert_eq!(order, MetricKind::ALL.to_vec());
    }

    #[test]
    fn parses_step_series() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(METRICS_FILE), full_metrics(1.0).to_string()).unwrap();
        std::fs::write(
            tmp.path().join(STEPS_FILE),
            "{\"time\":0,\"running\":3,\"meanSpeed\":12.1}\n\n{\"time\":1,\"running\":5,\"halting\":1,\"meanWaitingTime\":0.4}\n",
        )
        .unwrap();

        let record = MetricsCollector::new().extract(&scenario(), tmp.path()).unwrap();
        assert_eq!(record.steps.len(), 2);
        assert_eq!(record.steps[0].mean_speed, 12.1);
        assert_eq!(record.steps[1].halting, 1);
        assert_eq!(record.steps[1].teleports, 0);
    }

    #[test]
    fn missing_artifact_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = MetricsCollector::new().extract(&scenario(), tmp.path());
        assert!(matches!(result, Err(Error::MetricsParse { .. })));
    }

    #[test]
    fn missing_metric_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut json = full_metrics(1.0);
        json.as_object_mut().unwrap().remove("noise");
        std::fs::write(tmp.path().join(METRICS_FILE), json.to_string()).unwrap();

        let err = MetricsCollector::new().extract(&scenario(), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("missing metric noise"));
    }

    #[test]
    fn non_numeric_value_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut json = full_metrics(1.0);
        json["fuel"] = serde_json::json!("lots");
        std::fs::write(tmp.path().join(METRICS_FILE), json.to_string()).unwrap();

        let result = MetricsCollector::new().extract(&scenario(), tmp.path());
        assert!(matches!(result, Err(Error::MetricsParse { ref reason, .. }) if reason.contains("fuel")));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(METRICS_FILE), "{ not json").unwrap();

        let result = MetricsCollector::new().extract(&scenario(), tmp.path());
        assert!(matches!(result, Err(Error::MetricsParse { .. })));
    }

    #[test]
    fn malformed_step_line_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(METRICS_FILE), full_metrics(1.0).to_string()).unwrap();
        std::fs::write(tmp.path().join(STEPS_FILE), "{\"time\":0}\n{\"time\":\"x\"}\n").unwrap();

        let err = MetricsCollector::new().extract(&scenario(), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
