//! Testing utilities for the Agamotto workspace
//!
//! Fake simulation engines (plain `/bin/sh` scripts) and fixtures.

#![allow(missing_docs)]

use agamotto_core::metrics::{METRICS_FILE, STEPS_FILE};
use agamotto_core::{EngineConfig, MetricKind, RunConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Shell script standing in for the simulation engine
///
/// Invoked as `sh <script> <output> <aware> <unaware> <index>`. A
/// successful run writes `metrics.json` where every metric equals the
/// aware weight, except `waitingTime` which is reported unavailable (`""`)
/// and `duration` which is a numeric string.
#[derive(Debug)]
pub struct FakeEngine {
    _dir: TempDir,
    script: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct FakeEngineBuilder {
    fail: Vec<usize>,
    skip_metrics: Vec<usize>,
    malformed: Vec<usize>,
    sleep_secs: f64,
    steps: bool,
}

impl FakeEngineBuilder {
    /// Exit with code 3 for these scenario indices
    pub fn failing(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.fail.extend(indices);
        self
    }

    /// Exit 0 without writing metrics for these indices
    pub fn skipping_metrics(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.skip_metrics.extend(indices);
        self
    }

    /// Write unparsable metrics for these indices
    pub fn malformed_metrics(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.malformed.extend(indices);
        self
    }

    /// Sleep before producing output
    pub fn sleeping(mut self, secs: f64) -> Self {
        self.sleep_secs = secs;
        self
    }

    /// Also write a two-step `steps.jsonl`
    pub fn with_steps(mut self) -> Self {
        self.steps = true;
        self
    }

    pub fn build(self) -> FakeEngine {
        let dir = tempfile::tempdir().expect("create fake engine dir");
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, self.script()).expect("write fake engine script");
        FakeEngine { _dir: dir, script }
    }

    fn script(&self) -> String {
        let list = |v: &[usize]| {
            v.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut s = String::from("#!/bin/sh\nout=\"$1\"\naware=\"$2\"\nunaware=\"$3\"\nindex=\"$4\"\n");
        s.push_str("echo \"engine scenario $index weights $aware:$unaware\"\n");
        let _ = writeln!(
            s,
            "case \" {} \" in *\" $index \"*) echo \"failing on purpose\" >&2; exit 3;; esac",
            list(&self.fail)
        );
        if self.sleep_secs > 0.0 {
            let _ = writeln!(s, "sleep {}", self.sleep_secs);
        }
        let _ = writeln!(
            s,
            "case \" {} \" in *\" $index \"*) exit 0;; esac",
            list(&self.skip_metrics)
        );
        let _ = writeln!(
            s,
            "case \" {} \" in *\" $index \"*) printf '{{ not json' > \"$out/{METRICS_FILE}\"; exit 0;; esac",
            list(&self.malformed)
        );

        let (format, args) = metrics_printf();
        let _ = writeln!(s, "printf '{format}' {args} > \"$out/{METRICS_FILE}\"");

        if self.steps {
            let _ = writeln!(
                s,
                "printf '{{\"time\":0,\"running\":%s}}\\n{{\"time\":1,\"running\":%s,\"meanSpeed\":%s}}\\n' \"$aware\" \"$unaware\" \"$aware\" > \"$out/{STEPS_FILE}\""
            );
        }
        s.push_str("exit 0\n");
        s
    }
}

/// printf format and arguments producing the metrics object
fn metrics_printf() -> (String, String) {
    let mut fields = Vec::new();
    let mut args = Vec::new();
    for metric in MetricKind::ALL {
        match metric {
            MetricKind::WaitingTime => fields.push(format!("\"{metric}\":\"\"")),
            MetricKind::Duration => {
                fields.push(format!("\"{metric}\":\"%s\""));
                args.push("\"$aware\"");
            }
            _ => {
                fields.push(format!("\"{metric}\":%s"));
                args.push("\"$aware\"");
            }
        }
    }
    (format!("{{{}}}", fields.join(",")), args.join(" "))
}

impl FakeEngine {
    pub fn builder() -> FakeEngineBuilder {
        FakeEngineBuilder::default()
    }

    /// Engine that always succeeds immediately
    pub fn succeeding() -> Self {
        Self::builder().build()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Invocation of this script for both headless and GUI runs
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            program: "/bin/sh".to_string(),
            gui_program: "/bin/sh".to_string(),
            args: vec![
                self.script.display().to_string(),
                "{output}".to_string(),
                "{aware}".to_string(),
                "{unaware}".to_string(),
                "{index}".to_string(),
            ],
            ..EngineConfig::default()
        }
    }

    /// Run configuration using this engine, writing runs under `run_root`
    pub fn run_config(&self, run_root: &Path) -> RunConfig {
        RunConfig::new("scenario.sumocfg")
            .with_run_root(run_root)
            .with_engine(self.engine_config())
    }
}

/// Write a complete `metrics.json` with every metric set to `value`
pub fn write_metrics(dir: &Path, value: f64) {
    let object: serde_json::Map<String, serde_json::Value> = MetricKind::ALL
        .iter()
        .map(|m| (m.as_str().to_string(), serde_json::json!(value)))
        .collect();
    std::fs::write(
        dir.join(METRICS_FILE),
        serde_json::Value::Object(object).to_string(),
    )
    .expect("write metrics.json");
}

/// Collect the file names directly inside `dir`, sorted
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(std::result::Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_mentions_every_metric() {
        let engine = FakeEngine::builder().failing([1, 4]).sleeping(0.5).with_steps().build();
        let text = std::fs::read_to_string(engine.script()).unwrap();

        for metric in MetricKind::ALL {
            assert!(text.contains(&format!("\"{metric}\"")));
        }
        assert!(text.contains("case \" 1 4 \""));
        assert!(text.contains("sleep 0.5"));
        assert!(text.contains(STEPS_FILE));
    }

    #[test]
    fn engine_config_points_at_script() {
        let engine = FakeEngine::succeeding();
        let config = engine.engine_config();
        assert_eq!(config.program, "/bin/sh");
        assert_eq!(config.args[0], engine.script().display().to_string());
        assert_eq!(config.args[1], "{output}");
    }

    #[test]
    fn metrics_format_argument_count_matches() {
        let (format, args) = metrics_printf();
        assert_eq!(format.matches("%s").count(), args.split(' ').count());
        assert!(format.contains("\"waitingTime\":\"\""));
    }
}
