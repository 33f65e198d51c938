//! Automation endpoint client.
//!
//! A running instance exposes a remote-control endpoint once it has
//! finished starting. The manager only depends on the two traits here;
//! the HTTP implementation covers applications that expose their
//! automation surface over a local HTTP port.

use crate::config::Timing;
use crate::error::{Result, RigError};
use async_trait::async_trait;
use tracing::debug;

/// Remote-control session with a running instance.
///
/// All three operations may fail with [`RigError::Automation`] when the
/// endpoint has become unreachable. The manager treats any such failure on
/// a held instance as "not reusable" and replaces the instance.
#[async_trait]
pub trait AutomationSession: Send {
    /// Whether the instance reports itself alive. Never blocks
    /// indefinitely.
    async fn is_running(&mut self) -> Result<bool>;

    /// Close any open work inside the instance (project, document,
    /// session). Best-effort.
    async fn close_open_work(&mut self) -> Result<()>;

    /// Ask the instance to shut down gracefully. Best-effort; the caller
    /// still terminates the process afterwards.
    async fn request_shutdown(&mut self) -> Result<()>;
}

/// Readiness probe producing an [`AutomationSession`].
#[async_trait]
pub trait AutomationConnector: Send + Sync {
    /// Attempt one connection to the endpoint.
    ///
    /// `None` means the endpoint is not up yet (connection refused, not
    /// responding); the caller keeps polling. A `Some` session has passed
    /// one successful liveness exchange.
    async fn try_connect(&self) -> Option<Box<dyn AutomationSession>>;
}

/// HTTP automation endpoint.
///
/// Expects the instance to serve `GET /health` once ready, and to accept
/// `POST /work/close` and `POST /shutdown`.
pub struct HttpAutomation {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAutomation {
    /// Create a connector for an endpoint base URL, e.g.
    /// `http://127.0.0.1:8470`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Timing::PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl AutomationConnector for HttpAutomation {
    async fn try_connect(&self) -> Option<Box<dyn AutomationSession>> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Some(Box::new(HttpSession {
                base_url: self.base_url.clone(),
                client: self.client.clone(),
            })),
            Ok(resp) => {
                debug!("Endpoint returned {}, still starting", resp.status());
                None
            }
            Err(e) => {
                debug!("Endpoint probe failed: {}", e);
                None
            }
        }
    }
}

/// Session over an established HTTP automation endpoint.
pub struct HttpSession {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSession {
    async fn post(&self, path: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(RigError::Automation {
                message: format!("{} returned {}", path, resp.status()),
            })
        }
    }
}

#[async_trait]
impl AutomationSession for HttpSession {
    async fn is_running(&mut self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let resp = self.client.get(&url).send().await?;
        Ok(resp.status().is_success())
    }

    async fn close_open_work(&mut self) -> Result<()> {
        self.post("/work/close").await
    }

    async fn request_shutdown(&mut self) -> Result<()> {
        self.post("/shutdown").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Port 1 is reserved and never has a listener; probes against it
    // exercise the unreachable-endpoint paths without a server.
    const DEAD_ENDPOINT: &str = "http://127.0.0.1:1";

    #[test]
    fn test_base_url_normalized() {
        let automation = HttpAutomation::new("http://127.0.0.1:8470/");
        assert_eq!(automation.base_url, "http://127.0.0.1:8470");
    }

    #[tokio::test]
    async fn test_try_connect_unreachable_is_none() {
        let automation = HttpAutomation::new(DEAD_ENDPOINT);
        assert!(automation.try_connect().await.is_none());
    }

    #[tokio::test]
    async fn test_session_unreachable_is_communication_error() {
        let mut session = HttpSession {
            base_url: DEAD_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        };

        let err = session.is_running().await.unwrap_err();
        assert!(matches!(err, RigError::Automation { .. }));

        let err = session.close_open_work().await.unwrap_err();
        assert!(matches!(err, RigError::Automation { .. }));
    }
}
