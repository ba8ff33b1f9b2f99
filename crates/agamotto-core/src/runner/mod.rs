//! Simulation runner
//!
//! Executes one scenario as an external engine process and reports how it
//! ended. Process failures are returned as values: nothing raised here
//! crosses the lane boundary.
//!
//! The [`ScenarioExecutor`] trait is the seam the scheduler drives; the
//! process-backed [`SimulationRunner`] is the production implementation.

pub mod invocation;

use crate::config::{EngineConfig, RunConfig};
use crate::error::{Error, ProcessFailure, Result};
use crate::output_area::OutputLease;
use crate::types::Scenario;
use invocation::{Invocation, InvocationContext};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

/// Engine stdout capture file (debug mode)
pub const STDOUT_LOG: &str = "engine.stdout.log";
/// Engine stderr capture file (debug mode)
pub const STDERR_LOG: &str = "engine.stderr.log";
/// Runner trace file (debug mode)
pub const TRACE_LOG: &str = "trace.log";

/// Outcome of one engine invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Exit code when the process exited normally
    pub exit_code: Option<i32>,
    /// Captured stdout (debug only)
    pub stdout_path: Option<PathBuf>,
    /// Captured stderr (debug only)
    pub stderr_path: Option<PathBuf>,
    /// Wall-clock time spent
    pub elapsed: Duration,
    /// Set when the run did not succeed
    pub failure: Option<ProcessFailure>,
}

impl RunOutcome {
    /// Successful outcome
    #[must_use]
    pub fn success(elapsed: Duration) -> Self {
        Self {
            exit_code: Some(0),
            stdout_path: None,
            stderr_path: None,
            elapsed,
            failure: None,
        }
    }

    /// Failed outcome
    #[must_use]
    pub fn failed(failure: ProcessFailure, elapsed: Duration) -> Self {
        Self {
            exit_code: None,
            stdout_path: None,
            stderr_path: None,
            elapsed,
            failure: Some(failure),
        }
    }

    /// True when the engine exited with status 0
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Executes a single scenario inside a leased output directory
///
/// Implement this trait to change how scenarios are run; the scheduler
/// only ever talks to this seam.
#[async_trait::async_trait]
pub trait ScenarioExecutor: Send + Sync {
    /// Run the scenario to completion (or timeout)
    async fn run(&self, scenario: &Scenario, lease: &OutputLease) -> RunOutcome;
}

/// Process-backed scenario executor
#[derive(Debug, Clone)]
pub struct SimulationRunner {
    engine: EngineConfig,
    net_file: Option<PathBuf>,
    route_file: Option<PathBuf>,
    timeout: Option<Duration>,
    gui: bool,
}

impl SimulationRunner {
    /// Create a runner from the run configuration
    #[must_use]
    pub fn new(config: &RunConfig) -> Self {
        Self {
            engine: config.engine.clone(),
            net_file: config.net_file.clone(),
            route_file: config.route_file.clone(),
            timeout: config.timeout(),
            gui: config.show_gui,
        }
    }

    /// Override the per-process timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for a scenario run
    #[must_use]
    pub fn invocation(&self, scenario: &Scenario, output_dir: &Path) -> Invocation {
        let delay = if self.gui {
            self.engine.gui_delay
        } else {
            self.engine.headless_delay
        };
        self.render(scenario, output_dir, self.gui, delay)
    }

    /// Command line for an interactive replay
    #[must_use]
    pub fn replay_invocation(&self, scenario: &Scenario, output_dir: &Path) -> Invocation {
        self.render(scenario, output_dir, true, self.engine.replay_delay)
    }

    fn render(&self, scenario: &Scenario, output_dir: &Path, gui: bool, delay: u32) -> Invocation {
        let scenario_file = output_dir.join(crate::output_area::SCENARIO_FILE);
        invocation::render(
            &self.engine,
            scenario,
            &InvocationContext {
                net_file: self.net_file.as_deref(),
                route_file: self.route_file.as_deref(),
                output_dir,
                scenario_file: &scenario_file,
                gui,
                delay,
            },
        )
    }

    /// Launch the graphical engine and wait for the user to close it
    ///
    /// # Errors
    /// - `Error::SimulationProcess` if the viewer cannot be started or waited on
    pub async fn launch_viewer(&self, scenario: &Scenario, output_dir: &Path) -> Result<Option<i32>> {
        let invocation = self.replay_invocation(scenario, output_dir);
        tracing::info!("Launching viewer for scenario {}: {}", scenario.index, invocation);

        let status = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::SimulationProcess {
                index: scenario.index,
                failure: ProcessFailure::Spawn {
                    message: e.to_string(),
                },
            })?;

        Ok(status.code())
    }

    async fn execute(
        &self,
        scenario: &Scenario,
        lease: &OutputLease,
        invocation: &Invocation,
        capture: Option<(&Path, &Path)>,
    ) -> RunOutcome {
        let started = Instant::now();

        let (stdout, stderr) = match capture {
            Some((out, err)) => match (open_capture(out), open_capture(err)) {
                (Ok(o), Ok(e)) => (o, e),
                (Err(e), _) | (_, Err(e)) => {
                    return RunOutcome::failed(
                        ProcessFailure::Spawn {
                            message: format!("cannot open capture file: {e}"),
                        },
                        started.elapsed(),
                    );
                }
            },
            None => (Stdio::null(), Stdio::null()),
        };

        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(lease.path())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let spawned = command.spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Scenario {} failed to spawn {}: {}", scenario.index, invocation.program, e);
                return RunOutcome::failed(
                    ProcessFailure::Spawn {
                        message: e.to_string(),
                    },
                    started.elapsed(),
                );
            }
        };

        // leader of its own process group
        let group = child.id();

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    terminate(&mut child, group, scenario).await;
                    tracing::warn!("Scenario {} timed out after {:?}", scenario.index, limit);
                    return RunOutcome::failed(
                        ProcessFailure::Timeout {
                            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        },
                        started.elapsed(),
                    );
                }
            },
            None => child.wait().await,
        };

        let elapsed = started.elapsed();
        match waited {
            Ok(status) => {
                let failure = classify(status);
                RunOutcome {
                    exit_code: status.code(),
                    stdout_path: None,
                    stderr_path: None,
                    elapsed,
                    failure,
                }
            }
            Err(e) => RunOutcome::failed(
                ProcessFailure::Wait {
                    message: e.to_string(),
                },
                elapsed,
            ),
        }
    }
}

#[async_trait::async_trait]
impl ScenarioExecutor for SimulationRunner {
    async fn run(&self, scenario: &Scenario, lease: &OutputLease) -> RunOutcome {
        let invocation = self.invocation(scenario, lease.path());
        tracing::debug!("Scenario {} invocation: {}", scenario.index, invocation);

        let logs = lease.logs_dir();
        let capture = logs
            .as_ref()
            .map(|dir| (dir.join(STDOUT_LOG), dir.join(STDERR_LOG)));

        let mut outcome = self
            .execute(
                scenario,
                lease,
                &invocation,
                capture.as_ref().map(|(o, e)| (o.as_path(), e.as_path())),
            )
            .await;

        if let (Some(dir), Some((out, err))) = (logs, capture) {
            outcome.stdout_path = Some(out);
            outcome.stderr_path = Some(err);
            write_trace(&dir.join(TRACE_LOG), scenario, &invocation, &outcome);
        }

        match &outcome.failure {
            None => tracing::debug!("Scenario {} engine finished in {:?}", scenario.index, outcome.elapsed),
            Some(failure) => tracing::warn!("Scenario {} engine failed: {}", scenario.index, failure),
        }

        outcome
    }
}

/// Kill the engine's whole process group, then reap the engine itself
async fn terminate(child: &mut tokio::process::Child, group: Option<u32>, scenario: &Scenario) {
    #[cfg(unix)]
    if let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!("Failed to kill process group {} of scenario {}: {}", pgid, scenario.index, e),
        }
    }
    #[cfg(not(unix))]
    let _ = group;

    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill timed-out engine for scenario {}: {}", scenario.index, e);
    }
}

fn open_capture(path: &Path) -> std::io::Result<Stdio> {
    std::fs::File::create(path).map(Stdio::from)
}

fn classify(status: ExitStatus) -> Option<ProcessFailure> {
    if status.success() {
        return None;
    }
    match status.code() {
        Some(code) => Some(ProcessFailure::ExitCode { code }),
        None => Some(ProcessFailure::Signal {
            signal: signal_of(status),
        }),
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

fn write_trace(path: &Path, scenario: &Scenario, invocation: &Invocation, outcome: &RunOutcome) {
    let status = outcome
        .failure
        .as_ref()
        .map_or_else(|| "ok".to_string(), ToString::to_string);
    let text = format!(
        "scenario: {}\nclosures: {}\nweight: {}\ninvocation: {}\nelapsed_ms: {}\nstatus: {}\n",
        scenario.index,
        scenario.closures,
        scenario.weight,
        invocation,
        outcome.elapsed.as_millis(),
        status,
    );
    if let Err(e) = std::fs::write(path, text) {
        tracing::warn!("Cannot write trace {}: {}", path.display(), e);
    }
}
