//! Testrig - lifecycle manager for the application instance integration
//! tests run against.
//!
//! The crate owns one concern: any caller asking for "an instance" of the
//! application under test gets one that is definitely alive and in a clean
//! state. A previously launched instance is reused when its liveness and
//! cleanup probes succeed; otherwise it is discarded and replaced through a
//! full fresh launch (maintenance runs, stray-process sweep, spawn,
//! readiness wait).
//!
//! It is a library component consumed by a test-orchestration layer; it
//! owns no CLI, wire protocol, or file format, and it manages exactly one
//! instance slot for one calling thread of control at a time.
//!
//! # Example
//!
//! ```rust,ignore
//! use testrig::{InstanceManager, ManagerConfig};
//!
//! #[tokio::main]
//! async fn main() -> testrig::Result<()> {
//!     let config = ManagerConfig::new("hostapp", "2024.1")
//!         .with_launch_args(vec!["--automation".into()])
//!         .with_maintenance_run(vec!["--clear-cache".into()])
//!         .with_maintenance_run(vec!["--apply-config".into()])
//!         .with_stray_process("hostapp-helper");
//!
//!     let mut manager = InstanceManager::with_defaults(
//!         config,
//!         "/etc/hostapp/installs.json",
//!         "http://127.0.0.1:8470",
//!     );
//!
//!     let instance = manager.acquire().await?;
//!     println!("Testing against instance {}", instance.pid());
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod automation;
pub mod cancel;
pub mod config;
pub mod error;
pub mod locator;
pub mod manager;
pub mod platform;
pub mod process;

// Re-export commonly used types
pub use automation::{AutomationConnector, AutomationSession, HttpAutomation};
pub use cancel::{CancellationToken, CancelledError};
pub use config::{ManagerConfig, Timing};
pub use error::{Result, RigError};
pub use locator::{FixedLocator, InstallLocator, InstalledApp, RegistryLocator};
pub use manager::InstanceManager;
pub use process::{Instance, ManagedProcess, OsProcessHost, ProcessHost};
