//! Process spawn/kill services.
//!
//! [`ProcessHost`] is the OS-service seam the manager launches through;
//! [`OsProcessHost`] is the real implementation. Tests inject stubs.

use crate::config::ManagerConfig;
use crate::error::{Result, RigError};
use crate::platform;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// A spawned application process under management.
#[async_trait]
pub trait ManagedProcess: Send {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Whether the process has exited.
    async fn has_exited(&mut self) -> Result<bool>;

    /// Terminate the process, gracefully first. A second call is a no-op.
    async fn terminate(&mut self) -> Result<()>;
}

impl std::fmt::Debug for dyn ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.pid())
            .finish()
    }
}

/// OS services for launching the application and sweeping leftovers.
#[async_trait]
pub trait ProcessHost: Send + Sync {
    /// Run the application binary to completion (a maintenance launch).
    /// A non-zero exit is a launch failure.
    async fn run_to_exit(&self, exe: &Path, args: &[String]) -> Result<()>;

    /// Spawn the real instance process.
    async fn spawn(&self, exe: &Path, args: &[String]) -> Result<Box<dyn ManagedProcess>>;

    /// Kill processes whose command line matches any of `names`,
    /// best-effort. Absence of a listed process is not an error. Returns
    /// the number of processes taken down.
    async fn kill_by_name(&self, names: &[String]) -> u32;

    /// Terminate an instance recorded in a PID file left by a previous
    /// session, best-effort.
    async fn reap_stale(&self);
}

/// Real process host backed by tokio and the platform module.
pub struct OsProcessHost {
    app_name: String,
    log_dir: Option<PathBuf>,
    stop_grace: Duration,
}

impl OsProcessHost {
    /// Create a host from the manager configuration.
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            log_dir: config.log_dir.clone(),
            stop_grace: config.stop_grace,
        }
    }

    fn pid_file(&self) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.pid", self.app_name)))
    }

    /// Stdio pair for a launch, logging to a timestamped file under
    /// `log_dir` or discarding when no log dir is configured.
    fn launch_stdio(&self, kind: &str) -> Result<(Stdio, Stdio)> {
        let Some(dir) = &self.log_dir else {
            return Ok((Stdio::null(), Stdio::null()));
        };

        std::fs::create_dir_all(dir).map_err(|e| RigError::io_with_path(e, dir))?;
        let path = dir.join(format!(
            "{}-{}-{}.log",
            self.app_name,
            kind,
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
        let file = std::fs::File::create(&path).map_err(|e| RigError::io_with_path(e, &path))?;
        let stdout = file
            .try_clone()
            .map_err(|e| RigError::io_with_path(e, &path))?;
        Ok((Stdio::from(stdout), Stdio::from(file)))
    }

    fn command(&self, exe: &Path, args: &[String], kind: &str) -> Result<Command> {
        if !exe.exists() {
            return Err(RigError::Launch {
                message: format!("executable not found: {}", exe.display()),
            });
        }

        let (stdout, stderr) = self.launch_stdio(kind)?;
        let mut cmd = Command::new(exe);
        cmd.args(args).stdout(stdout).stderr(stderr);
        if let Some(dir) = exe.parent() {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl ProcessHost for OsProcessHost {
    async fn run_to_exit(&self, exe: &Path, args: &[String]) -> Result<()> {
        let mut cmd = self.command(exe, args, "maintenance")?;

        debug!("Maintenance run {:?} starting", args);
        let status = cmd.status().await.map_err(|e| RigError::Launch {
            message: format!("maintenance run {:?} failed to start: {}", args, e),
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(RigError::Launch {
                message: format!("maintenance run {:?} exited with {}", args, status),
            })
        }
    }

    async fn spawn(&self, exe: &Path, args: &[String]) -> Result<Box<dyn ManagedProcess>> {
        let mut cmd = self.command(exe, args, "launch")?;

        // Detach into its own group so signals aimed at the test session
        // cannot take the instance down mid-acquisition.
        #[cfg(unix)]
        cmd.process_group(0);

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let child = cmd.spawn().map_err(|e| RigError::Launch {
            message: format!("failed to spawn {}: {}", exe.display(), e),
        })?;
        let pid = child.id().ok_or_else(|| RigError::Launch {
            message: format!("{} exited before it could be tracked", exe.display()),
        })?;

        if let Some(pid_path) = self.pid_file() {
            if let Err(e) = std::fs::write(&pid_path, pid.to_string()) {
                warn!("Failed to write PID file {}: {}", pid_path.display(), e);
            }
        }

        info!("Spawned {} with PID {}", exe.display(), pid);

        Ok(Box::new(OsProcess {
            pid,
            child: Some(child),
            stop_grace: self.stop_grace,
            pid_file: self.pid_file(),
        }))
    }

    async fn kill_by_name(&self, names: &[String]) -> u32 {
        let names = names.to_vec();
        let grace = self.stop_grace;
        let own_pid = std::process::id();

        tokio::task::spawn_blocking(move || {
            let mut killed = 0;
            for name in &names {
                for (pid, cmdline) in platform::find_processes(name) {
                    if pid == own_pid {
                        continue;
                    }
                    debug!("Stray process {} matches '{}': {}", pid, name, cmdline);
                    match platform::terminate(pid, grace) {
                        Ok(true) => {
                            info!("Stopped stray process {} ('{}')", pid, name);
                            killed += 1;
                        }
                        Ok(false) => warn!("Stray process {} survived termination", pid),
                        Err(e) => warn!("Failed to stop stray process {}: {}", pid, e),
                    }
                }
            }
            killed
        })
        .await
        .unwrap_or(0)
    }

    async fn reap_stale(&self) {
        let Some(pid_path) = self.pid_file() else {
            return;
        };
        let Ok(raw) = std::fs::read_to_string(&pid_path) else {
            return;
        };

        if let Ok(pid) = raw.trim().parse::<u32>() {
            if pid != std::process::id() && platform::is_process_alive(pid) {
                warn!(
                    "Instance {} from a previous session is still running; terminating",
                    pid
                );
                let grace = self.stop_grace;
                let result =
                    tokio::task::spawn_blocking(move || platform::terminate(pid, grace)).await;
                if let Ok(Err(e)) = result {
                    warn!("Failed to stop stale instance {}: {}", pid, e);
                }
            }
        } else {
            debug!("Ignoring unparseable PID file {}", pid_path.display());
        }

        if let Err(e) = std::fs::remove_file(&pid_path) {
            warn!("Failed to remove PID file {}: {}", pid_path.display(), e);
        }
    }
}

/// A real OS process spawned by [`OsProcessHost`].
struct OsProcess {
    pid: u32,
    child: Option<Child>,
    stop_grace: Duration,
    pid_file: Option<PathBuf>,
}

#[async_trait]
impl ManagedProcess for OsProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn has_exited(&mut self) -> Result<bool> {
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(_)) => Ok(true),
                Ok(None) => Ok(false),
                Err(e) => Err(RigError::Launch {
                    message: format!("failed to check process {}: {}", self.pid, e),
                }),
            },
            None => Ok(true),
        }
    }

    async fn terminate(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let pid = self.pid;
        let grace = self.stop_grace;
        let gone = tokio::task::spawn_blocking(move || platform::terminate(pid, grace))
            .await
            .map_err(|e| RigError::Other(format!("termination task failed: {}", e)))??;

        // Collect the exit status if the runtime still holds it.
        let _ = child.try_wait();

        if let Some(pid_path) = self.pid_file.take() {
            if let Err(e) = std::fs::remove_file(&pid_path) {
                debug!("Failed to remove PID file {}: {}", pid_path.display(), e);
            }
        }

        if gone {
            Ok(())
        } else {
            Err(RigError::Other(format!(
                "process {} survived termination",
                pid
            )))
        }
    }
}
