//! Post-run replay
//!
//! Looks a scenario up by index and asks the graphical viewer to replay
//! it, from its retained output directory when there is one, otherwise
//! from a fresh directory under `<run_dir>/replay/<index>`.

use crate::error::{Error, Result};
use crate::matrix::ScenarioMatrix;
use crate::output_area::SCENARIO_FILE;
use crate::runner::SimulationRunner;
use crate::types::{Scenario, ScenarioIndex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Replay directory inside the run folder
pub const REPLAY_DIR: &str = "replay";

/// Interactive choice at the replay prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Replay this scenario
    Scenario(ScenarioIndex),
    /// Leave the prompt
    Quit,
}

/// Interpret prompt input: a scenario number, or `q`/`Q` to quit
///
/// # Errors
/// - `Error::UnknownScenario` for anything else, including out-of-range
///   numbers
pub fn parse_selection(input: &str, available: usize) -> Result<Selection> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") {
        return Ok(Selection::Quit);
    }
    match input.parse::<usize>() {
        Ok(i) if i < available => Ok(Selection::Scenario(ScenarioIndex(i))),
        _ => Err(Error::UnknownScenario {
            requested: input.to_string(),
            available,
        }),
    }
}

/// External graphical viewer
#[async_trait::async_trait]
pub trait Viewer: Send + Sync {
    /// Show the scenario and wait for the viewer to close
    ///
    /// Returns the viewer's exit code when it has one.
    async fn view(&self, scenario: &Scenario, output_dir: &Path) -> Result<Option<i32>>;
}

#[async_trait::async_trait]
impl Viewer for SimulationRunner {
    async fn view(&self, scenario: &Scenario, output_dir: &Path) -> Result<Option<i32>> {
        self.launch_viewer(scenario, output_dir).await
    }
}

/// Result of one replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Scenario replayed
    pub index: ScenarioIndex,
    /// Directory handed to the viewer
    pub output_dir: PathBuf,
    /// True when a retained directory was reused
    pub from_retained: bool,
    /// Viewer exit code (informational)
    pub exit_code: Option<i32>,
}

/// Replays finished scenarios in the viewer
pub struct ReplayGate {
    matrix: ScenarioMatrix,
    run_dir: PathBuf,
    retained: HashMap<ScenarioIndex, PathBuf>,
    viewer: Arc<dyn Viewer>,
}

impl std::fmt::Debug for ReplayGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayGate")
            .field("scenarios", &self.matrix.len())
            .field("run_dir", &self.run_dir)
            .field("retained", &self.retained.len())
            .finish_non_exhaustive()
    }
}

impl ReplayGate {
    /// Gate over a finished run
    #[must_use]
    pub fn new(matrix: ScenarioMatrix, run_dir: impl Into<PathBuf>, viewer: Arc<dyn Viewer>) -> Self {
        Self {
            matrix,
            run_dir: run_dir.into(),
            retained: HashMap::new(),
            viewer,
        }
    }

    /// Register retained output directories
    #[must_use]
    pub fn with_retained(mut self, retained: impl IntoIterator<Item = (ScenarioIndex, PathBuf)>) -> Self {
        self.retained.extend(retained);
        self
    }

    /// Scenarios available for replay
    #[inline]
    #[must_use]
    pub fn matrix(&self) -> &ScenarioMatrix {
        &self.matrix
    }

    /// Parse prompt input against this run
    ///
    /// # Errors
    /// - `Error::UnknownScenario` for invalid input
    pub fn select(&self, input: &str) -> Result<Selection> {
        parse_selection(input, self.matrix.len())
    }

    /// Replay one scenario in the viewer
    ///
    /// # Errors
    /// - `Error::UnknownScenario` if the index is not part of the run
    /// - `Error::Storage` if a fresh replay directory cannot be prepared
    /// - `Error::SimulationProcess` if the viewer cannot be launched
    pub async fn replay(&self, index: ScenarioIndex) -> Result<ReplayOutcome> {
        let scenario = self.matrix.require(index)?;

        let (output_dir, from_retained) = match self.retained.get(&index) {
            Some(dir) if dir.is_dir() => (dir.clone(), true),
            _ => (self.fresh_dir(scenario)?, false),
        };

        tracing::info!(
            "Replaying scenario {} from {}",
            scenario.label(),
            output_dir.display()
        );
        let exit_code = self.viewer.view(scenario, &output_dir).await?;
        tracing::info!("Viewer for scenario {} exited with {:?}", index, exit_code);

        Ok(ReplayOutcome {
            index,
            output_dir,
            from_retained,
            exit_code,
        })
    }

    fn fresh_dir(&self, scenario: &Scenario) -> Result<PathBuf> {
        let dir = self.run_dir.join(REPLAY_DIR).join(scenario.index.to_string());
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(|e| Error::storage(&dir, e))?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| Error::storage(&dir, e))?;

        let mut staged = scenario.clone();
        staged.output_dir.clone_from(&dir);
        let manifest = dir.join(SCENARIO_FILE);
        let bytes = serde_json::to_vec_pretty(&staged)
            .map_err(|e| Error::storage(&manifest, std::io::Error::other(e)))?;
        std::fs::write(&manifest, bytes).map_err(|e| Error::storage(&manifest, e))?;
        Ok(dir)
    }
}
