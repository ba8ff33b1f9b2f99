//! Per-scenario output directories
//!
//! Every scenario gets an exclusive working directory for the duration of
//! its lane step:
//! - `acquire` creates it (exclusively) and stages `scenario.json`
//! - `release` deletes it, or retains it and records the path
//! - an unreleased [`OutputLease`] releases itself on drop, so panics and
//!   early returns never leak a directory

use crate::error::{Error, Result};
use crate::types::{Scenario, ScenarioIndex};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scenario descriptor written into every output directory
pub const SCENARIO_FILE: &str = "scenario.json";

/// Debug artifacts subdirectory
pub const LOGS_DIR: &str = "logs";

/// Owns the lifecycle of scenario output directories
#[derive(Debug)]
pub struct OutputAreaManager {
    /// Retention applied by leases dropped without explicit release
    keep_by_default: bool,
    /// Create the debug logs directory on acquire
    debug: bool,
    /// Directories currently leased
    live: DashMap<PathBuf, ScenarioIndex>,
    /// Directories kept after release
    retained: DashMap<ScenarioIndex, PathBuf>,
}

impl OutputAreaManager {
    /// Create a manager
    #[inline]
    #[must_use]
    pub fn new(keep_by_default: bool, debug: bool) -> Self {
        Self {
            keep_by_default,
            debug,
            live: DashMap::new(),
            retained: DashMap::new(),
        }
    }

    /// Create the scenario's output directory
    ///
    /// The leaf directory is created exclusively: a directory left over from
    /// another scenario or run is never reused.
    ///
    /// # Errors
    /// - `Error::Storage` if the directory exists, is leased, or cannot be
    ///   created or written
    pub fn acquire(self: &Arc<Self>, scenario: &Scenario) -> Result<OutputLease> {
        let path = scenario.output_dir.clone();

        match self.live.entry(path.clone()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                return Err(Error::storage(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("output directory already leased by scenario {}", entry.get()),
                    ),
                ));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(scenario.index);
            }
        }

        if let Err(e) = self.create(scenario, &path) {
            self.live.remove(&path);
            return Err(e);
        }

        tracing::debug!("Acquired output area {} for scenario {}", path.display(), scenario.index);

        Ok(OutputLease {
            index: scenario.index,
            path,
            debug: self.debug,
            manager: Arc::clone(self),
            released: false,
        })
    }

    fn create(&self, scenario: &Scenario, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::storage(parent, e))?;
        }
        std::fs::create_dir(path).map_err(|e| Error::storage(path, e))?;

        if self.debug {
            let logs = path.join(LOGS_DIR);
            std::fs::create_dir(&logs).map_err(|e| Error::storage(&logs, e))?;
        }

        let manifest = path.join(SCENARIO_FILE);
        let bytes = serde_json::to_vec_pretty(scenario)
            .map_err(|e| Error::storage(&manifest, std::io::Error::other(e)))?;
        std::fs::write(&manifest, bytes).map_err(|e| Error::storage(&manifest, e))
    }

    /// Release a lease, deleting the directory unless `keep`
    ///
    /// Returns the retained path when kept.
    ///
    /// # Errors
    /// - `Error::Storage` if deletion fails (the directory is left behind)
    pub fn release(&self, mut lease: OutputLease, keep: bool) -> Result<Option<PathBuf>> {
        lease.released = true;
        self.finish(lease.index, &lease.path, keep)
    }

    fn finish(&self, index: ScenarioIndex, path: &Path, keep: bool) -> Result<Option<PathBuf>> {
        self.live.remove(path);

        if keep {
            self.retained.insert(index, path.to_path_buf());
            tracing::debug!("Retained output area {} for scenario {}", path.display(), index);
            return Ok(Some(path.to_path_buf()));
        }

        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(path, e)),
        }
    }

    /// Retained directory of a scenario, if any
    #[must_use]
    pub fn retained(&self, index: ScenarioIndex) -> Option<PathBuf> {
        self.retained.get(&index).map(|p| p.value().clone())
    }

    /// All retained directories, ordered by scenario index
    #[must_use]
    pub fn retained_paths(&self) -> Vec<(ScenarioIndex, PathBuf)> {
        let mut paths: Vec<_> = self
            .retained
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        paths.sort_by_key(|(index, _)| *index);
        paths
    }

    /// Number of directories currently leased
    #[inline]
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// Exclusive use of one scenario output directory
#[derive(Debug)]
pub struct OutputLease {
    index: ScenarioIndex,
    path: PathBuf,
    debug: bool,
    manager: Arc<OutputAreaManager>,
    released: bool,
}

impl OutputLease {
    /// Scenario owning the directory
    #[inline]
    #[must_use]
    pub fn index(&self) -> ScenarioIndex {
        self.index
    }

    /// Output directory
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Debug logs directory, when debug capture is on
    #[must_use]
    pub fn logs_dir(&self) -> Option<PathBuf> {
        self.debug.then(|| self.path.join(LOGS_DIR))
    }

    /// Path of the staged scenario descriptor
    #[must_use]
    pub fn scenario_file(&self) -> PathBuf {
        self.path.join(SCENARIO_FILE)
    }
}

impl Drop for OutputLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let keep = self.manager.keep_by_default;
        if let Err(e) = self.manager.finish(self.index, &self.path, keep) {
            tracing::warn!("Failed to release output area for scenario {}: {}", self.index, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClosureSet, WeightPair};

    fn scenario(root: &Path, index: usize) -> Scenario {
        Scenario {
            index: ScenarioIndex(index),
            closures: ClosureSet::parse(["E1"]).unwrap(),
            weight: WeightPair::new(50, 50).unwrap(),
            config_path: PathBuf::from("run.sumocfg"),
            output_dir: root.join("output").join(index.to_string()),
        }
    }

    #[test]
    fn acquire_creates_directory_with_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(OutputAreaManager::new(false, false));
        let s = scenario(tmp.path(), 0);

        let lease = manager.acquire(&s).unwrap();
        assert!(lease.path().is_dir());
        assert!(lease.scenario_file().is_file());
        assert!(lease.logs_dir().is_none());
        assert_eq!(manager.live_count(), 1);

        let staged: Scenario =
            serde_json::from_slice(&std::fs::read(lease.scenario_file()).unwrap()).unwrap();
        assert_eq!(staged, s);

        manager.release(lease, false).unwrap();
    }

    #[test]
    fn release_deletes_unless_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(OutputAreaManager::new(false, false));

        let gone = scenario(tmp.path(), 0);
        let lease = manager.acquire(&gone).unwrap();
        assert_eq!(manager.release(lease, false).unwrap(), None);
        assert!(!gone.output_dir.exists());

        let kept = scenario(tmp.path(), 1);
        let lease = manager.acquire(&kept).unwrap();
        let retained = manager.release(lease, true).unwrap();
        assert_eq!(retained.as_deref(), Some(kept.output_dir.as_path()));
        assert!(kept.output_dir.join(SCENARIO_FILE).is_file());
        assert_eq!(manager.retained(ScenarioIndex(1)), Some(kept.output_dir.clone()));
        assert_eq!(manager.retained(ScenarioIndex(0)), None);
        assert_eq!(manager.live_count(), 0);
    }

    #[test]
    fn same_directory_cannot_be_acquired_twice() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(OutputAreaManager::new(false, false));
        let s = scenario(tmp.path(), 0);

        let lease = manager.acquire(&s).unwrap();
        assert!(matches!(manager.acquire(&s), Err(Error::Storage { .. })));
        manager.release(lease, false).unwrap();
    }

    #[test]
    fn stale_directory_is_not_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(OutputAreaManager::new(false, false));
        let s = scenario(tmp.path(), 0);
        std::fs::create_dir_all(&s.output_dir).unwrap();

        assert!(matches!(manager.acquire(&s), Err(Error::Storage { .. })));
        assert_eq!(manager.live_count(), 0);
    }

    #[test]
    fn debug_creates_logs_dir_and_delete_still_applies() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Arc::new(OutputAreaManager::new(false, true));
        let s = scenario(tmp.path(), 0);

        let lease = manager.acquire(&s).unwrap();
        let logs = lease.logs_dir().unwrap();
        assert!(logs.is_dir());
        std::fs::write(logs.join("trace.log"), "x").unwrap();

        manager.release(lease, false).unwrap();
        assert!(!s.output_dir.exists());
    }

    #[test]
    fn dropped_lease_releases_with_default_policy() {
        let tmp = tempfile::tempdir().unwrap();

        let deleting = Arc::new(OutputAreaManager::new(false, false));
        let s = scenario(tmp.path(), 0);
        drop(deleting.acquire(&s).unwrap());
        assert!(!s.output_dir.exists());
        assert_eq!(deleting.live_count(), 0);

        let keeping = Arc::new(OutputAreaManager::new(true, false));
        let s = scenario(tmp.path(), 1);
        drop(keeping.acquire(&s).unwrap());
        assert!(s.output_dir.exists());
        assert_eq!(keeping.retained_paths(), vec![(ScenarioIndex(1), s.output_dir)]);
    }

    #[test]
    fn root_under_regular_file_is_storage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let manager = Arc::new(OutputAreaManager::new(false, false));
        let result = manager.acquire(&scenario(&file, 0));

        assert!(matches!(result, Err(Error::Storage { .. })));
        assert_eq!(manager.live_count(), 0);
        assert!(file.is_file());
    }
}
