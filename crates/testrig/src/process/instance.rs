//! The instance handle.

use crate::automation::AutomationSession;
use crate::config::Timing;
use crate::error::Result;
use crate::process::ManagedProcess;
use tracing::{debug, warn};

/// One running instance of the application under test.
///
/// Owned exclusively by the manager; callers borrow it between
/// acquisitions. The automation session is attached only after the
/// readiness wait has succeeded. Teardown happens exactly once; calling
/// [`Instance::close`] again afterwards is a no-op.
pub struct Instance {
    pid: u32,
    process: Option<Box<dyn ManagedProcess>>,
    automation: Option<Box<dyn AutomationSession>>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("pid", &self.pid)
            .field("process", &self.process.is_some())
            .field("automation", &self.automation.is_some())
            .finish()
    }
}

impl Instance {
    pub(crate) fn new(
        process: Box<dyn ManagedProcess>,
        automation: Box<dyn AutomationSession>,
    ) -> Self {
        Self {
            pid: process.pid(),
            process: Some(process),
            automation: Some(automation),
        }
    }

    /// OS process id of the instance.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the instance reports itself alive over its automation
    /// endpoint. A torn-down instance is not running.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::RigError::Automation`] when the endpoint is
    /// unreachable; the manager treats that the same as not running.
    pub async fn is_running(&mut self) -> Result<bool> {
        match self.automation.as_mut() {
            Some(session) => session.is_running().await,
            None => Ok(false),
        }
    }

    /// Close any open work inside the instance. Best-effort; a no-op
    /// after teardown.
    pub async fn close_open_work(&mut self) -> Result<()> {
        match self.automation.as_mut() {
            Some(session) => session.close_open_work().await,
            None => Ok(()),
        }
    }

    /// Tear the instance down: request a graceful shutdown through the
    /// automation endpoint, then terminate the process. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process itself could not be
    /// terminated; a failed graceful-shutdown request is absorbed.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut process) = self.process.take() else {
            debug!("Instance {} already closed", self.pid);
            return Ok(());
        };

        if let Some(session) = self.automation.as_mut() {
            match session.request_shutdown().await {
                Ok(()) => tokio::time::sleep(Timing::SHUTDOWN_SETTLE).await,
                Err(e) => warn!(
                    "Graceful shutdown request for instance {} failed: {}",
                    self.pid, e
                ),
            }
        }
        self.automation = None;

        process.terminate().await
    }
}
