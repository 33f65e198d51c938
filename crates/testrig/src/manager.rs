//! Instance acquisition, reuse, and recovery.
//!
//! The manager owns at most one instance of the application under test and
//! guarantees that whatever it hands out is alive and clean. A held
//! instance is reused when its probes succeed; on any doubt it is replaced
//! by a full fresh launch. Failures while discarding an old instance are
//! absorbed (they only cost a restart), while failures while establishing
//! a new one surface to the caller.

use crate::automation::{AutomationConnector, AutomationSession, HttpAutomation};
use crate::cancel::CancellationToken;
use crate::config::ManagerConfig;
use crate::error::{Result, RigError};
use crate::locator::{InstallLocator, RegistryLocator};
use crate::process::{Instance, ManagedProcess, OsProcessHost, ProcessHost};
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Manages the lifecycle of the single application instance integration
/// tests run against.
///
/// One manager per test session, passed explicitly to consumers. All
/// acquisition operations take `&mut self`, so serialized access is a
/// compile-time property; the handle returned by an acquisition is valid
/// until the next acquisition or [`InstanceManager::shutdown`] call.
pub struct InstanceManager {
    config: ManagerConfig,
    locator: Box<dyn InstallLocator>,
    host: Box<dyn ProcessHost>,
    connector: Box<dyn AutomationConnector>,
    cancel: CancellationToken,
    held: Option<Instance>,
}

impl InstanceManager {
    /// Create a manager over explicit collaborators.
    pub fn new(
        config: ManagerConfig,
        locator: Box<dyn InstallLocator>,
        host: Box<dyn ProcessHost>,
        connector: Box<dyn AutomationConnector>,
    ) -> Self {
        Self {
            config,
            locator,
            host,
            connector,
            cancel: CancellationToken::new(),
            held: None,
        }
    }

    /// Create a manager with the default collaborators: a JSON install
    /// registry, the OS process host, and an HTTP automation endpoint.
    pub fn with_defaults(
        config: ManagerConfig,
        registry_path: impl Into<PathBuf>,
        automation_url: impl Into<String>,
    ) -> Self {
        let host = OsProcessHost::new(&config);
        Self::new(
            config,
            Box::new(RegistryLocator::new(registry_path)),
            Box::new(host),
            Box::new(HttpAutomation::new(automation_url)),
        )
    }

    /// Replace the cancellation token bounding readiness waits.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that aborts a pending readiness wait when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// PID of the held instance, if any.
    pub fn held_pid(&self) -> Option<u32> {
        self.held.as_ref().map(Instance::pid)
    }

    /// Return the held instance when it is alive and clean, otherwise
    /// replace it. The preferred entry point.
    ///
    /// Never returns a handle known to be dead: a failed liveness check or
    /// cleanup probe is logged, the old instance discarded, and a fresh
    /// one launched in its place.
    ///
    /// # Errors
    ///
    /// Only when a genuinely new instance could not be produced; see
    /// [`InstanceManager::acquire_fresh`].
    pub async fn acquire(&mut self) -> Result<&mut Instance> {
        if self.probe_held().await && self.held.is_some() {
            let instance = self.held.as_mut().expect("held is Some");
            debug!("Reusing instance {}", instance.pid());
            return Ok(instance);
        }
        self.acquire_fresh().await
    }

    /// Discard the held instance (best-effort teardown) and launch a new
    /// one.
    ///
    /// The held slot is cleared *before* teardown, so a teardown failure
    /// can never leave the manager pointing at a half-dead instance; at
    /// worst the old process is orphaned.
    ///
    /// # Errors
    ///
    /// [`RigError::InstallNotFound`] / [`RigError::Locator`] when the
    /// install cannot be resolved, [`RigError::Launch`] when a maintenance
    /// run or the spawn fails or the instance dies while starting,
    /// [`RigError::ReadyTimeout`] / [`RigError::Cancelled`] when the
    /// readiness wait ends early. In every error case the held slot stays
    /// empty.
    pub async fn acquire_fresh(&mut self) -> Result<&mut Instance> {
        if let Some(mut old) = self.held.take() {
            if let Err(e) = old.close().await {
                warn!(
                    "Teardown of instance {} failed: {}; the process may be orphaned",
                    old.pid(),
                    e
                );
            }
        }

        let instance = self.launch().await?;
        info!("Instance {} ready", instance.pid());
        Ok(self.held.insert(instance))
    }

    /// Tear down the held instance if present. Idempotent; teardown
    /// failures are logged, never returned.
    pub async fn shutdown(&mut self) {
        if let Some(mut instance) = self.held.take() {
            info!("Shutting down instance {}", instance.pid());
            if let Err(e) = instance.close().await {
                warn!("Teardown of instance {} failed: {}", instance.pid(), e);
            }
        }
    }

    /// Best-effort probe of the held instance: alive, then open work
    /// closed. Any failure means "not reusable".
    async fn probe_held(&mut self) -> bool {
        let Some(instance) = self.held.as_mut() else {
            return false;
        };

        match instance.is_running().await {
            Ok(true) => {}
            Ok(false) => {
                info!("Held instance {} is no longer running", instance.pid());
                return false;
            }
            Err(e) => {
                warn!(
                    "Liveness check on instance {} failed: {}; replacing it",
                    instance.pid(),
                    e
                );
                return false;
            }
        }

        if let Err(e) = instance.close_open_work().await {
            warn!(
                "Cleanup of open work in instance {} failed: {}; replacing it",
                instance.pid(),
                e
            );
            return false;
        }

        true
    }

    /// The fresh-launch sequence: maintenance runs, stray sweep, spawn,
    /// readiness wait.
    async fn launch(&mut self) -> Result<Instance> {
        let app = self.locator.locate(&self.config.version)?;

        // Maintenance runs must finish before the real instance starts,
        // or it could read stale or partially-applied state.
        for args in &self.config.maintenance_runs {
            self.host.run_to_exit(&app.executable, args).await?;
        }

        self.host.reap_stale().await;
        if !self.config.stray_processes.is_empty() {
            let killed = self.host.kill_by_name(&self.config.stray_processes).await;
            if killed > 0 {
                info!("Swept {} stray helper process(es)", killed);
            }
        }

        let mut process = self
            .host
            .spawn(&app.executable, &self.config.launch_args)
            .await?;

        match self.wait_for_automation(process.as_mut()).await {
            Ok(session) => Ok(Instance::new(process, session)),
            Err(e) => {
                // The wait failure surfaces; cleaning up the half-started
                // process is discard-path work and is absorbed.
                if let Err(kill_err) = process.terminate().await {
                    warn!(
                        "Cleanup of failed launch {} failed: {}",
                        process.pid(),
                        kill_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Poll until the automation endpoint accepts a connection, bounded by
    /// the configured timeout and the cancellation token, failing fast if
    /// the process exits while starting.
    async fn wait_for_automation(
        &self,
        process: &mut dyn ManagedProcess,
    ) -> Result<Box<dyn AutomationSession>> {
        let start = Instant::now();
        let mut delay = self.config.poll_interval;

        loop {
            self.cancel.check()?;

            if process.has_exited().await? {
                return Err(RigError::Launch {
                    message: format!(
                        "instance {} exited before its automation endpoint came up",
                        process.pid()
                    ),
                });
            }

            if let Some(session) = self.connector.try_connect().await {
                debug!("Automation endpoint ready after {:?}", start.elapsed());
                return Ok(session);
            }

            if start.elapsed() >= self.config.ready_timeout {
                return Err(RigError::ReadyTimeout(self.config.ready_timeout));
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.config.poll_interval_max);
        }
    }
}
