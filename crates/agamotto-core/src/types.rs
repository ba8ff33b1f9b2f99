//! Core types for the scenario scheduler
//!
//! Defines the fundamental scenario vocabulary:
//! - Scenario indices
//! - Closure sets and awareness weight pairs
//! - Scenario descriptors
//! - Supported metric kinds

use crate::error::{Error, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Stable ordinal of a scenario within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioIndex(pub usize);

impl ScenarioIndex {
    /// Numeric value
    #[inline]
    #[must_use]
    pub fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for ScenarioIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of closed road-segment identifiers
///
/// Parsed once per run and shared, unchanged, by every scenario.
/// An empty set is the "no closure" baseline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClosureSet(IndexSet<String>);

impl ClosureSet {
    /// Empty closure set
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse identifiers, keeping first-seen order and dropping duplicates
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if an identifier is empty or whitespace
    pub fn parse<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = IndexSet::new();
        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() {
                return Err(Error::invalid("closure identifier must not be empty"));
            }
            set.insert(id.to_string());
        }
        Ok(Self(set))
    }

    /// Number of closed segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the "no closure" baseline
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check membership
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Iterate identifiers in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Identifiers joined with `sep`
    #[must_use]
    pub fn joined(&self, sep: &str) -> String {
        self.iter().collect::<Vec<_>>().join(sep)
    }
}

impl fmt::Display for ClosureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&self.joined(" "))
        }
    }
}

/// Split between vehicles aware of a closure in advance and those that
/// discover it on approach
///
/// The pair is a ratio. It is never normalized and need not sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeightPair {
    /// Weight of vehicles informed in advance (navigation)
    pub aware: u32,
    /// Weight of vehicles informed at proximity (road sign)
    pub unaware: u32,
}

impl WeightPair {
    /// Default pairs used when none are supplied
    pub const CANONICAL: [WeightPair; 3] = [
        WeightPair { aware: 100, unaware: 0 },
        WeightPair { aware: 0, unaware: 100 },
        WeightPair { aware: 50, unaware: 50 },
    ];

    /// Split used by the reference run; with nothing closed it has no effect
    pub const REFERENCE: WeightPair = WeightPair { aware: 0, unaware: 100 };

    /// Validate and build a weight pair
    ///
    /// # Errors
    /// - `Error::InvalidParameter` if either value is negative, too large, or
    ///   both are zero
    pub fn new(aware: i64, unaware: i64) -> Result<Self> {
        if aware < 0 || unaware < 0 {
            return Err(Error::invalid(format!(
                "weight pair ({aware},{unaware}) contains a negative value"
            )));
        }
        if aware == 0 && unaware == 0 {
            return Err(Error::invalid("weight pair (0,0) carries no ratio"));
        }
        let convert = |v: i64| {
            u32::try_from(v).map_err(|_| Error::invalid(format!("weight {v} is out of range")))
        };
        Ok(Self {
            aware: convert(aware)?,
            unaware: convert(unaware)?,
        })
    }

    /// Fraction of vehicles informed in advance
    #[must_use]
    pub fn aware_share(&self) -> f64 {
        let total = f64::from(self.aware) + f64::from(self.unaware);
        f64::from(self.aware) / total
    }
}

impl fmt::Display for WeightPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.aware, self.unaware)
    }
}

impl FromStr for WeightPair {
    type Err = Error;

    /// Parses `aware:unaware` or `aware,unaware`
    fn from_str(s: &str) -> Result<Self> {
        let (aware, unaware) = s
            .split_once(':')
            .or_else(|| s.split_once(','))
            .ok_or_else(|| Error::invalid(format!("weight pair '{s}' must look like aware:unaware")))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| Error::invalid(format!("weight pair '{s}' is not numeric")))
        };
        Self::new(parse(aware)?, parse(unaware)?)
    }
}

/// One simulated experiment: the run's closures with one weight split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unique, stable index within the run
    pub index: ScenarioIndex,
    /// Closed segments (identical across the run)
    pub closures: ClosureSet,
    /// Awareness split
    pub weight: WeightPair,
    /// Engine configuration file
    pub config_path: PathBuf,
    /// Exclusive output directory
    pub output_dir: PathBuf,
}

impl Scenario {
    /// Short human label, e.g. `#2 [50:50]`
    #[must_use]
    pub fn label(&self) -> String {
        format!("#{} [{}]", self.index, self.weight)
    }
}

/// Metric types produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Mean trip duration
    #[serde(rename = "duration")]
    Duration,
    /// Mean route length
    #[serde(rename = "routeLength")]
    RouteLength,
    /// Mean waiting time
    #[serde(rename = "waitingTime")]
    WaitingTime,
    /// Mean speed
    #[serde(rename = "speed")]
    Speed,
    /// Mean time loss
    #[serde(rename = "timeloss")]
    TimeLoss,
    /// Simulated time until the network emptied
    #[serde(rename = "totalTime")]
    TotalTime,
    /// CO2 emission
    #[serde(rename = "CO2")]
    Co2,
    /// CO emission
    #[serde(rename = "CO")]
    Co,
    /// Hydrocarbon emission
    #[serde(rename = "HC")]
    Hc,
    /// Particulate emission
    #[serde(rename = "PMx")]
    Pmx,
    /// Nitrogen oxide emission
    #[serde(rename = "NOx")]
    Nox,
    /// Fuel consumption
    #[serde(rename = "fuel")]
    Fuel,
    /// Noise emission
    #[serde(rename = "noise")]
    Noise,
}

impl MetricKind {
    /// Every supported metric, in reporting order
    pub const ALL: [MetricKind; 13] = [
        MetricKind::Duration,
        MetricKind::RouteLength,
        MetricKind::WaitingTime,
        MetricKind::Speed,
        MetricKind::TimeLoss,
        MetricKind::TotalTime,
        MetricKind::Co2,
        MetricKind::Co,
        MetricKind::Hc,
        MetricKind::Pmx,
        MetricKind::Nox,
        MetricKind::Fuel,
        MetricKind::Noise,
    ];

    /// Key used in engine artifacts
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Duration => "duration",
            MetricKind::RouteLength => "routeLength",
            MetricKind::WaitingTime => "waitingTime",
            MetricKind::Speed => "speed",
            MetricKind::TimeLoss => "timeloss",
            MetricKind::TotalTime => "totalTime",
            MetricKind::Co2 => "CO2",
            MetricKind::Co => "CO",
            MetricKind::Hc => "HC",
            MetricKind::Pmx => "PMx",
            MetricKind::Nox => "NOx",
            MetricKind::Fuel => "fuel",
            MetricKind::Noise => "noise",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = Error;

    /// Case-insensitive match on the artifact key
    fn from_str(s: &str) -> Result<Self> {
        MetricKind::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid(format!("unknown metric '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_set_keeps_order_and_dedups() {
        let set = ClosureSet::parse(["E3", "E1", "E3", " E2 "]).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.joined(","), "E3,E1,E2");
        assert!(set.contains("E2"));
    }

    #[test]
    fn closure_set_rejects_empty_identifier() {
        let result = ClosureSet::parse(["E1", "  "]);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn closure_set_display() {
        assert_eq!(ClosureSet::empty().to_string(), "(none)");
        assert_eq!(ClosureSet::parse(["a", "b"]).unwrap().to_string(), "a b");
    }

    #[test]
    fn weight_pair_validation() {
        assert!(WeightPair::new(70, 30).is_ok());
        assert!(WeightPair::new(3, 1).is_ok());
        assert!(matches!(WeightPair::new(-1, 100), Err(Error::InvalidParameter(_))));
        assert!(matches!(WeightPair::new(0, 0), Err(Error::InvalidParameter(_))));
        assert!(WeightPair::new(i64::from(u32::MAX) + 1, 0).is_err());
    }

    #[test]
    fn weight_pair_is_not_normalized() {
        let pair = WeightPair::new(3, 1).unwrap();
        assert_eq!(pair.aware, 3);
        assert_eq!(pair.unaware, 1);
        assert!((pair.aware_share() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn weight_pair_from_str() {
        assert_eq!("70:30".parse::<WeightPair>().unwrap(), WeightPair::new(70, 30).unwrap());
        assert_eq!("0, 100".parse::<WeightPair>().unwrap(), WeightPair::new(0, 100).unwrap());
        assert!("70".parse::<WeightPair>().is_err());
        assert!("a:b".parse::<WeightPair>().is_err());
        assert!("-5:10".parse::<WeightPair>().is_err());
    }

    #[test]
    fn metric_kind_round_trip_names() {
        for metric in MetricKind::ALL {
            assert_eq!(metric.as_str().parse::<MetricKind>().unwrap(), metric);
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json, format!("\"{}\"", metric.as_str()));
        }
        assert_eq!("co2".parse::<MetricKind>().unwrap(), MetricKind::Co2);
        assert!("electricity".parse::<MetricKind>().is_err());
    }
}
