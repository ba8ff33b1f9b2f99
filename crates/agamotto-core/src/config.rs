//! Run configuration
//!
//! A `RunConfig` is built once (from defaults, a TOML file and CLI
//! overrides), validated, and then shared read-only as `Arc<RunConfig>`
//! by every component for the whole run.

use crate::error::{Error, Result};
use crate::types::MetricKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the external engine is invoked
///
/// `args` is a template. Placeholders are substituted per scenario:
/// `{config}`, `{net}`, `{routes}`, `{closures}`, `{aware}`, `{unaware}`,
/// `{output}`, `{scenario_file}`, `{index}`, `{delay}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Headless engine executable
    pub program: String,
    /// Graphical engine executable (GUI mode and replay)
    pub gui_program: String,
    /// Argument template
    pub args: Vec<String>,
    /// Step delay (ms) for headless runs
    pub headless_delay: u32,
    /// Step delay (ms) when running with the GUI
    pub gui_delay: u32,
    /// Step delay (ms) for interactive replay
    pub replay_delay: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "agamotto-engine".to_string(),
            gui_program: "agamotto-engine-gui".to_string(),
            args: [
                "-c", "{config}",
                "--net-file", "{net}",
                "--route-files", "{routes}",
                "--close", "{closures}",
                "--weights", "{aware}:{unaware}",
                "--output-dir", "{output}",
                "--scenario", "{scenario_file}",
                "--delay", "{delay}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            headless_delay: 0,
            gui_delay: 3,
            replay_delay: 10,
        }
    }
}

/// Process-wide configuration for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Engine scenario configuration file
    pub config_path: PathBuf,
    /// Road network file handed to the engine
    pub net_file: Option<PathBuf>,
    /// Route file handed to the engine
    pub route_file: Option<PathBuf>,
    /// Directory under which run folders are created
    pub run_root: PathBuf,
    /// Minimum scenarios committed to a lane before another lane opens
    pub min_sim: usize,
    /// Maximum number of concurrent lanes
    pub max_concurrent: usize,
    /// Run scenarios in the graphical engine (forces a single lane)
    pub show_gui: bool,
    /// Keep engine logs and traces inside each scenario directory
    pub debug: bool,
    /// Retain scenario output directories after metrics extraction
    pub keep_output: bool,
    /// Run the closure-free reference simulation before the matrix
    pub reference: bool,
    /// Closed segment identifiers, applied to every scenario
    pub closures: Vec<String>,
    /// Awareness weight pairs `(aware, unaware)`; empty means the canonical three
    pub weights: Vec<(i64, i64)>,
    /// Per-process timeout in seconds (0 disables it)
    pub timeout_secs: u64,
    /// Metrics to aggregate and chart
    pub metrics: Vec<MetricKind>,
    /// Engine invocation
    pub engine: EngineConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            net_file: None,
            route_file: None,
            run_root: PathBuf::from("runs"),
            min_sim: 1,
            max_concurrent: std::thread::available_parallelism().map_or(1, usize::from),
            show_gui: false,
            debug: false,
            keep_output: false,
            reference: true,
            closures: Vec::new(),
            weights: Vec::new(),
            timeout_secs: 1800,
            metrics: MetricKind::ALL.to_vec(),
            engine: EngineConfig::default(),
        }
    }
}

impl RunConfig {
    /// Create configuration for an engine config file
    #[inline]
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            ..Self::default()
        }
    }

    /// Load settings from a TOML file
    ///
    /// # Errors
    /// - `Error::Config` if the file cannot be read or parsed
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    /// - `Error::Config` on malformed TOML or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// With minimum batch size
    #[inline]
    #[must_use]
    pub fn with_min_sim(mut self, min_sim: usize) -> Self {
        self.min_sim = min_sim;
        self
    }

    /// With maximum lane count
    #[inline]
    #[must_use]
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// With GUI mode
    #[inline]
    #[must_use]
    pub fn with_gui(mut self, show_gui: bool) -> Self {
        self.show_gui = show_gui;
        self
    }

    /// With debug artifacts
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// With output retention
    #[inline]
    #[must_use]
    pub fn with_keep_output(mut self, keep: bool) -> Self {
        self.keep_output = keep;
        self
    }

    /// With or without the reference simulation
    #[inline]
    #[must_use]
    pub fn with_reference(mut self, reference: bool) -> Self {
        self.reference = reference;
        self
    }

    /// With closed segments
    #[must_use]
    pub fn with_closures<I, S>(mut self, closures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.closures = closures.into_iter().map(Into::into).collect();
        self
    }

    /// With weight pairs
    #[must_use]
    pub fn with_weights(mut self, weights: impl IntoIterator<Item = (i64, i64)>) -> Self {
        self.weights = weights.into_iter().collect();
        self
    }

    /// With per-process timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// With requested metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: impl IntoIterator<Item = MetricKind>) -> Self {
        self.metrics = metrics.into_iter().collect();
        self
    }

    /// With run folder root
    #[inline]
    #[must_use]
    pub fn with_run_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.run_root = root.into();
        self
    }

    /// With engine invocation
    #[inline]
    #[must_use]
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Per-process timeout, `None` when disabled
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Check run-level parameters before anything is scheduled
    ///
    /// Scenario-level parameters (closures, weights) are checked by the
    /// matrix builder.
    ///
    /// # Errors
    /// - `Error::InvalidParameter` on the first violated constraint
    pub fn validate(&self) -> Result<()> {
        if self.min_sim == 0 {
            return Err(Error::invalid("min_sim must be >= 1"));
        }
        if self.max_concurrent == 0 {
            return Err(Error::invalid("max_concurrent must be >= 1"));
        }
        if self.config_path.as_os_str().is_empty() {
            return Err(Error::invalid("config_path is required"));
        }
        if self.metrics.is_empty() {
            return Err(Error::invalid("at least one metric must be requested"));
        }
        let program = if self.show_gui {
            &self.engine.gui_program
        } else {
            &self.engine.program
        };
        if program.trim().is_empty() {
            return Err(Error::invalid("engine program must not be empty"));
        }
        Ok(())
    }
}
