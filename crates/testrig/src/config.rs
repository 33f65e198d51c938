//! Configuration for instance acquisition.
//!
//! `ManagerConfig` carries everything a fresh launch needs: the launch
//! arguments of the real instance, the maintenance runs that must complete
//! before it starts, and the stray helper processes to sweep away first.
//! The lists are data, not code, so a test-orchestration layer can ship
//! them per application.

use std::path::PathBuf;
use std::time::Duration;

/// Default timings. All overridable through [`ManagerConfig`].
pub struct Timing;

impl Timing {
    /// The host application can take a long, variable time to finish
    /// starting. The bound exists so a broken launch eventually fails
    /// instead of hanging the session, not to police slow starts.
    pub const READY_TIMEOUT: Duration = Duration::from_secs(3600);
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
    pub const POLL_INTERVAL_MAX: Duration = Duration::from_secs(5);
    /// Grace window between a termination request and a forced kill.
    pub const STOP_GRACE: Duration = Duration::from_secs(2);
    /// Settle time after a graceful shutdown request before killing.
    pub const SHUTDOWN_SETTLE: Duration = Duration::from_millis(500);
    /// Per-request timeout for automation endpoint probes.
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
}

/// Configuration for launching and managing the application under test.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Short name used for PID files and log file names.
    pub app_name: String,
    /// Product version identifier, resolved through the locator.
    pub version: String,
    /// Arguments the real instance is launched with.
    pub launch_args: Vec<String>,
    /// Maintenance launches run to completion, in order, before every
    /// fresh spawn (e.g. a cache clear and a pending-configuration apply).
    /// Each entry is one argument list for the application binary.
    pub maintenance_runs: Vec<Vec<String>>,
    /// Stray helper processes killed by name before a fresh spawn.
    /// Absence of a listed process is not an error.
    pub stray_processes: Vec<String>,
    /// Bound on the readiness wait after a spawn.
    pub ready_timeout: Duration,
    /// Initial readiness poll interval; doubles up to `poll_interval_max`.
    pub poll_interval: Duration,
    pub poll_interval_max: Duration,
    /// Grace window for terminating the instance process.
    pub stop_grace: Duration,
    /// Directory for launch logs and the PID file. `None` discards output.
    pub log_dir: Option<PathBuf>,
}

impl ManagerConfig {
    /// Create a config with default timings and empty run lists.
    pub fn new(app_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
            launch_args: Vec::new(),
            maintenance_runs: Vec::new(),
            stray_processes: Vec::new(),
            ready_timeout: Timing::READY_TIMEOUT,
            poll_interval: Timing::POLL_INTERVAL,
            poll_interval_max: Timing::POLL_INTERVAL_MAX,
            stop_grace: Timing::STOP_GRACE,
            log_dir: None,
        }
    }

    /// Set the launch arguments of the real instance.
    pub fn with_launch_args(mut self, args: Vec<String>) -> Self {
        self.launch_args = args;
        self
    }

    /// Append one maintenance launch (an argument list run to completion
    /// before every fresh spawn).
    pub fn with_maintenance_run(mut self, args: Vec<String>) -> Self {
        self.maintenance_runs.push(args);
        self
    }

    /// Append one stray helper process name to sweep before spawning.
    pub fn with_stray_process(mut self, name: impl Into<String>) -> Self {
        self.stray_processes.push(name.into());
        self
    }

    /// Set the readiness wait bound.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Set the initial readiness poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the termination grace window.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Set the directory for launch logs and the PID file.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}
