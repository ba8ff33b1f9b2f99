//! Error types for the scenario scheduler
//!
//! Provides the error taxonomy for:
//! - Configuration problems detected before scheduling (fatal)
//! - Output directory failures (scoped to one scenario)
//! - Simulation process failures (scoped to one scenario)
//! - Metrics artifact parse failures (scoped to one scenario)
//! - Replay lookups (user-facing only)

use crate::types::ScenarioIndex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result alias used across the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main scheduler error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad configuration or scenario parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Output directory could not be created, written or removed
    #[error("storage error at {}: {source}", .path.display())]
    Storage {
        /// Path that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// External engine exited abnormally or was killed
    #[error("simulation process failed for scenario {index}: {failure}")]
    SimulationProcess {
        /// Scenario that failed
        index: ScenarioIndex,
        /// What went wrong
        failure: ProcessFailure,
    },

    /// Metrics artifacts missing or malformed
    #[error("metrics parse error in {}: {reason}", .path.display())]
    MetricsParse {
        /// Artifact path
        path: PathBuf,
        /// Parse failure description
        reason: String,
    },

    /// Replay lookup for an index that does not exist
    #[error("unknown scenario '{requested}' (valid range 0-{})", .available.saturating_sub(1))]
    UnknownScenario {
        /// What the user asked for
        requested: String,
        /// Number of scenarios in the run
        available: usize,
    },

    /// Configuration file could not be read or parsed
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`]
    #[inline]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Shorthand for [`Error::Storage`]
    #[inline]
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`Error::MetricsParse`]
    #[inline]
    pub fn metrics(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MetricsParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if error aborts the whole run
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidParameter(_) | Self::Config(_))
    }

    /// Convert a scenario-scoped error into the reason recorded on its job
    #[must_use]
    pub fn into_failure_reason(self) -> FailureReason {
        match self {
            Self::Storage { .. } => FailureReason::Storage {
                message: self.to_string(),
            },
            Self::SimulationProcess { failure, .. } => FailureReason::Process { failure },
            Self::MetricsParse { .. } => FailureReason::MetricsParse {
                message: self.to_string(),
            },
            other => FailureReason::LaneAborted {
                message: other.to_string(),
            },
        }
    }
}

/// Why an external engine invocation did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessFailure {
    /// Process could not be started
    #[error("failed to spawn engine: {message}")]
    Spawn {
        /// OS error description
        message: String,
    },

    /// Waiting on the process failed
    #[error("failed to wait on engine: {message}")]
    Wait {
        /// OS error description
        message: String,
    },

    /// Non-zero exit
    #[error("engine exited with code {code}")]
    ExitCode {
        /// Exit code reported by the OS
        code: i32,
    },

    /// Terminated by a signal
    #[error("engine terminated by signal {}", .signal.map_or_else(|| "unknown".to_string(), |s| s.to_string()))]
    Signal {
        /// Signal number when known
        signal: Option<i32>,
    },

    /// Killed after exceeding the configured timeout
    #[error("engine killed after {millis} ms timeout")]
    Timeout {
        /// Timeout that elapsed, in milliseconds
        millis: u64,
    },
}

/// Reason recorded on a failed simulation job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Output directory unavailable
    Storage {
        /// Error description
        message: String,
    },
    /// Engine process failed
    Process {
        /// Process failure detail
        failure: ProcessFailure,
    },
    /// Metrics artifacts missing or malformed
    MetricsParse {
        /// Error description
        message: String,
    },
    /// Lane task died before the scenario finished
    LaneAborted {
        /// Error description
        message: String,
    },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage { message } | Self::MetricsParse { message } => f.write_str(message),
            Self::Process { failure } => write!(f, "{failure}"),
            Self::LaneAborted { message } => write!(f, "lane aborted: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::invalid("max_concurrent must be >= 1");
        assert!(err.to_string().contains("invalid parameter"));

        let err = Error::UnknownScenario {
            requested: "9".to_string(),
            available: 3,
        };
        assert_eq!(err.to_string(), "unknown scenario '9' (valid range 0-2)");
    }

    #[test]
    fn error_classification() {
        assert!(Error::invalid("x").is_fatal());
        assert!(Error::Config("x".to_string()).is_fatal());
        assert!(!Error::storage("/nope", std::io::Error::other("denied")).is_fatal());
        assert!(!Error::metrics("/m.json", "bad").is_fatal());
    }

    #[test]
    fn failure_reason_conversion() {
        let err = Error::SimulationProcess {
            index: ScenarioIndex(2),
            failure: ProcessFailure::Timeout { millis: 5000 },
        };
        assert_eq!(
            err.into_failure_reason(),
            FailureReason::Process {
                failure: ProcessFailure::Timeout { millis: 5000 }
            }
        );

        let reason = Error::metrics("/out/metrics.json", "missing metric CO2").into_failure_reason();
        assert!(matches!(reason, FailureReason::MetricsParse { ref message } if message.contains("CO2")));
    }

    #[test]
    fn process_failure_display() {
        assert_eq!(
            ProcessFailure::ExitCode { code: 3 }.to_string(),
            "engine exited with code 3"
        );
        assert_eq!(
            ProcessFailure::Signal { signal: None }.to_string(),
            "engine terminated by signal unknown"
        );
        assert_eq!(
            ProcessFailure::Timeout { millis: 250 }.to_string(),
            "engine killed after 250 ms timeout"
        );
    }

    #[test]
    fn failure_reason_serializes_tagged() {
        let reason = FailureReason::Process {
            failure: ProcessFailure::ExitCode { code: 1 },
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "process");
        assert_eq!(json["failure"]["kind"], "exit_code");
        assert_eq!(json["failure"]["code"], 1);
    }
}
