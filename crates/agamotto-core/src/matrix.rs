//! Scenario matrix construction
//!
//! Expands the run parameters into an ordered list of scenarios: one per
//! distinct weight pair, all sharing the run's closure set. Pure data
//! construction, nothing touches the filesystem here.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::types::{ClosureSet, Scenario, ScenarioIndex, WeightPair};
use std::path::{Path, PathBuf};

/// Subdirectory of the run folder holding per-scenario output
pub const OUTPUT_DIR_NAME: &str = "output";

/// Subdirectory of the run folder holding the reference run's output
pub const REFERENCE_DIR_NAME: &str = "reference";

/// Builder for a [`ScenarioMatrix`]
#[derive(Debug, Clone)]
pub struct ScenarioMatrixBuilder {
    config_path: PathBuf,
    output_root: PathBuf,
    closures: Vec<String>,
    weights: Vec<(i64, i64)>,
}

impl ScenarioMatrixBuilder {
    /// Start a matrix for the given engine config, writing under `run_dir`
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>, run_dir: &Path) -> Self {
        Self {
            config_path: config_path.into(),
            output_root: run_dir.join(OUTPUT_DIR_NAME),
            closures: Vec::new(),
            weights: Vec::new(),
        }
    }

    /// Builder seeded from a run configuration
    #[must_use]
    pub fn from_config(config: &RunConfig, run_dir: &Path) -> Self {
        Self::new(config.config_path.clone(), run_dir)
            .closures(config.closures.iter().cloned())
            .weights(config.weights.iter().copied())
    }

    /// Closed segment identifiers
    #[must_use]
    pub fn closures<I, S>(mut self, closures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.closures = closures.into_iter().map(Into::into).collect();
        self
    }

    /// Raw weight pairs; validated in [`build`](Self::build)
    #[must_use]
    pub fn weights(mut self, weights: impl IntoIterator<Item = (i64, i64)>) -> Self {
        self.weights = weights.into_iter().collect();
        self
    }

    /// Produce the scenario matrix
    ///
    /// # Errors
    /// - `Error::InvalidParameter` for a negative or all-zero weight pair, or
    ///   an empty closure identifier
    pub fn build(self) -> Result<ScenarioMatrix> {
        let closures = ClosureSet::parse(&self.closures)?;

        let mut pairs: Vec<WeightPair> = Vec::with_capacity(self.weights.len());
        for &(aware, unaware) in &self.weights {
            let pair = WeightPair::new(aware, unaware)?;
            if pairs.contains(&pair) {
                tracing::debug!("Dropping repeated weight pair {}", pair);
                continue;
            }
            pairs.push(pair);
        }
        if pairs.is_empty() {
            pairs.extend(WeightPair::CANONICAL);
        }

        let scenarios = pairs
            .into_iter()
            .enumerate()
            .map(|(i, weight)| Scenario {
                index: ScenarioIndex(i),
                closures: closures.clone(),
                weight,
                config_path: self.config_path.clone(),
                output_dir: self.output_root.join(i.to_string()),
            })
            .collect();

        Ok(ScenarioMatrix {
            closures,
            scenarios,
        })
    }
}

/// Ordered, immutable set of scenarios for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioMatrix {
    closures: ClosureSet,
    scenarios: Vec<Scenario>,
}

impl ScenarioMatrix {
    /// Shared closure set
    #[inline]
    #[must_use]
    pub fn closures(&self) -> &ClosureSet {
        &self.closures
    }

    /// All scenarios in index order
    #[inline]
    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Number of scenarios
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// True when there is nothing to run
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Look up a scenario by index
    #[must_use]
    pub fn get(&self, index: ScenarioIndex) -> Option<&Scenario> {
        self.scenarios.get(index.0)
    }

    /// Look up a scenario or fail with `UnknownScenario`
    ///
    /// # Errors
    /// - `Error::UnknownScenario` if the index is out of range
    pub fn require(&self, index: ScenarioIndex) -> Result<&Scenario> {
        self.get(index).ok_or_else(|| Error::UnknownScenario {
            requested: index.to_string(),
            available: self.len(),
        })
    }

    /// Closure-free scenario to compare the matrix against
    ///
    /// Its index is the first one past the matrix, so it never collides
    /// with a matrix scenario.
    #[must_use]
    pub fn reference_scenario(&self, config_path: &Path, run_dir: &Path) -> Scenario {
        Scenario {
            index: ScenarioIndex(self.len()),
            closures: ClosureSet::empty(),
            weight: WeightPair::REFERENCE,
            config_path: config_path.to_path_buf(),
            output_dir: run_dir.join(REFERENCE_DIR_NAME),
        }
    }

    /// Iterate scenarios
    pub fn iter(&self) -> std::slice::Iter<'_, Scenario> {
        self.scenarios.iter()
    }
}

impl<'a> IntoIterator for &'a ScenarioMatrix {
    type Item = &'a Scenario;
    type IntoIter = std::slice::Iter<'a, Scenario>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn builder() -> ScenarioMatrixBuilder {
        ScenarioMatrixBuilder::new("/cfg/run.sumocfg", Path::new("/runs/r1"))
    }

    #[test]
    fn defaults_to_canonical_pairs() {
        let matrix = builder().closures(["E1"]).build().unwrap();

        assert_eq!(matrix.len(), 3);
        let weights: Vec<_> = matrix.iter().map(|s| s.weight).collect();
        assert_eq!(weights, WeightPair::CANONICAL.to_vec());
    }

    #[test]
    fn reference_scenario_sits_past_the_matrix() {
        let matrix = builder().closures(["E1"]).weights([(100, 0), (0, 100)]).build().unwrap();
        let reference = matrix.reference_scenario(Path::new("/cfg/run.sumocfg"), Path::new("/runs/r1"));

        assert_eq!(reference.index, ScenarioIndex(2));
        assert!(reference.closures.is_empty());
        assert_eq!(reference.output_dir, PathBuf::from("/runs/r1/reference"));
        assert!(matrix.iter().all(|s| s.output_dir != reference.output_dir));
        assert!(matrix.get(reference.index).is_none());
    }

    #[test]
    fn one_scenario_per_pair_sharing_closures() {
        let matrix = builder()
            .closures(["E1", "E2"])
            .weights([(100, 0), (70, 30), (0, 100)])
            .build()
            .unwrap();

        assert_eq!(matrix.len(), 3);
        for (i, scenario) in matrix.iter().enumerate() {
            assert_eq!(scenario.index, ScenarioIndex(i));
            assert_eq!(&scenario.closures, matrix.closures());
            assert_eq!(scenario.config_path, PathBuf::from("/cfg/run.sumocfg"));
            assert_eq!(
                scenario.output_dir,
                PathBuf::from(format!("/runs/r1/output/{i}"))
            );
        }
    }

    #[test]
    fn empty_closures_is_baseline() {
        let matrix = builder().weights([(50, 50)]).build().unwrap();
        assert!(matrix.closures().is_empty());
        assert_eq!(matrix.len(), 1);
    }

    #[test]
    fn repeated_pairs_collapse() {
        let matrix = builder()
            .weights([(50, 50), (100, 0), (50, 50)])
            .build()
            .unwrap();
        assert_eq!(matrix.len(), 2);
    }

    #[test]
    fn rejects_negative_weight() {
        let result = builder().weights([(100, 0), (-10, 110)]).build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn rejects_empty_closure_id() {
        let result = builder().closures(["E1", ""]).build();
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn require_unknown_index() {
        let matrix = builder().build().unwrap();
        assert!(matrix.require(ScenarioIndex(2)).is_ok());
        assert!(matches!(
            matrix.require(ScenarioIndex(3)),
            Err(Error::UnknownScenario { available: 3, .. })
        ));
    }

    proptest! {
        #[test]
        fn distinct_weights_give_unique_scenarios(
            raw in proptest::collection::hash_set((0i64..=100, 1i64..=100), 1..20)
        ) {
            let weights: Vec<_> = raw.into_iter().collect();
            let matrix = builder().closures(["E7"]).weights(weights.clone()).build().unwrap();

            prop_assert_eq!(matrix.len(), weights.len());
            let indices: HashSet<_> = matrix.iter().map(|s| s.index).collect();
            prop_assert_eq!(indices.len(), weights.len());
            let dirs: HashSet<_> = matrix.iter().map(|s| s.output_dir.clone()).collect();
            prop_assert_eq!(dirs.len(), weights.len());
            prop_assert!(matrix.iter().all(|s| &s.closures == matrix.closures()));
        }
    }
}
