//! Acquisition state-machine tests over stub collaborators.
//!
//! The stubs journal every host and endpoint interaction so the tests can
//! assert not just outcomes but how many launch sequences actually ran and
//! in what order.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use testrig::{
    AutomationConnector, AutomationSession, FixedLocator, InstanceManager, ManagedProcess,
    ManagerConfig, ProcessHost, Result, RigError,
};

/// Shared fixture state: an event journal plus switches that make the
/// stub instance look dead, unreachable, or impossible to tear down.
struct World {
    journal: Mutex<Vec<String>>,
    next_pid: AtomicU32,
    instance_alive: AtomicBool,
    liveness_errors: AtomicBool,
    close_work_errors: AtomicBool,
    terminate_errors: AtomicBool,
}

impl World {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            journal: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(100),
            instance_alive: AtomicBool::new(true),
            liveness_errors: AtomicBool::new(false),
            close_work_errors: AtomicBool::new(false),
            terminate_errors: AtomicBool::new(false),
        })
    }

    fn log(&self, event: impl Into<String>) {
        self.journal.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

struct StubProcess {
    pid: u32,
    world: Arc<World>,
}

#[async_trait]
impl ManagedProcess for StubProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn has_exited(&mut self) -> Result<bool> {
        Ok(false)
    }

    async fn terminate(&mut self) -> Result<()> {
        self.world.log(format!("terminate {}", self.pid));
        if self.world.terminate_errors.load(Ordering::SeqCst) {
            Err(RigError::Other("termination refused".into()))
        } else {
            Ok(())
        }
    }
}

struct StubHost {
    world: Arc<World>,
}

#[async_trait]
impl ProcessHost for StubHost {
    async fn run_to_exit(&self, _exe: &Path, args: &[String]) -> Result<()> {
        self.world.log(format!("maintenance {}", args.join(" ")));
        Ok(())
    }

    async fn spawn(&self, _exe: &Path, _args: &[String]) -> Result<Box<dyn ManagedProcess>> {
        let pid = self.world.next_pid.fetch_add(1, Ordering::SeqCst);
        self.world.log(format!("spawn {}", pid));
        Ok(Box::new(StubProcess {
            pid,
            world: self.world.clone(),
        }))
    }

    async fn kill_by_name(&self, _names: &[String]) -> u32 {
        self.world.log("sweep");
        0
    }

    async fn reap_stale(&self) {
        self.world.log("reap");
    }
}

struct StubSession {
    world: Arc<World>,
}

#[async_trait]
impl AutomationSession for StubSession {
    async fn is_running(&mut self) -> Result<bool> {
        if self.world.liveness_errors.load(Ordering::SeqCst) {
            return Err(RigError::Automation {
                message: "endpoint unreachable".into(),
            });
        }
        Ok(self.world.instance_alive.load(Ordering::SeqCst))
    }

    async fn close_open_work(&mut self) -> Result<()> {
        if self.world.close_work_errors.load(Ordering::SeqCst) {
            return Err(RigError::Automation {
                message: "close rejected".into(),
            });
        }
        Ok(())
    }

    async fn request_shutdown(&mut self) -> Result<()> {
        self.world.log("shutdown-request");
        Ok(())
    }
}

struct StubConnector {
    world: Arc<World>,
}

#[async_trait]
impl AutomationConnector for StubConnector {
    async fn try_connect(&self) -> Option<Box<dyn AutomationSession>> {
        Some(Box::new(StubSession {
            world: self.world.clone(),
        }))
    }
}

/// Manager wired to the stubs, configured with the canonical maintenance
/// pair and one stray helper name.
fn manager(world: &Arc<World>) -> InstanceManager {
    let config = ManagerConfig::new("hostapp", "2024.1")
        .with_launch_args(vec!["--automation".into()])
        .with_maintenance_run(vec!["--clear-cache".into()])
        .with_maintenance_run(vec!["--apply-config".into()])
        .with_stray_process("hostapp-helper");

    InstanceManager::new(
        config,
        Box::new(FixedLocator::new("/opt/hostapp", "/opt/hostapp/bin/hostapp")),
        Box::new(StubHost {
            world: world.clone(),
        }),
        Box::new(StubConnector {
            world: world.clone(),
        }),
    )
}

#[tokio::test]
async fn cold_start_runs_one_full_launch_sequence() {
    let world = World::new();
    let mut manager = manager(&world);

    let pid = manager.acquire().await.unwrap().pid();

    assert_eq!(manager.held_pid(), Some(pid));
    assert_eq!(
        world.events(),
        vec![
            "maintenance --clear-cache",
            "maintenance --apply-config",
            "reap",
            "sweep",
            "spawn 100",
        ]
    );
}

#[tokio::test]
async fn healthy_instance_is_reused() {
    let world = World::new();
    let mut manager = manager(&world);

    let first = manager.acquire().await.unwrap().pid();
    let second = manager.acquire().await.unwrap().pid();
    let third = manager.acquire().await.unwrap().pid();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(world.count("spawn"), 1);
    assert_eq!(world.count("maintenance"), 2);
}

#[tokio::test]
async fn dead_instance_is_replaced() {
    let world = World::new();
    let mut manager = manager(&world);

    let first = manager.acquire().await.unwrap().pid();
    world.instance_alive.store(false, Ordering::SeqCst);

    let second = manager.acquire().await.unwrap().pid();

    assert_ne!(first, second);
    assert_eq!(manager.held_pid(), Some(second));
    assert_eq!(world.count("spawn"), 2);
}

#[tokio::test]
async fn liveness_error_triggers_exactly_one_relaunch() {
    let world = World::new();
    let mut manager = manager(&world);

    let first = manager.acquire().await.unwrap().pid();
    world.liveness_errors.store(true, Ordering::SeqCst);

    let second = manager.acquire().await.unwrap().pid();

    assert_ne!(first, second);
    // One additional full sequence, not two.
    assert_eq!(world.count("spawn"), 2);
    assert_eq!(world.count("maintenance"), 4);
    assert_eq!(world.count("sweep"), 2);
}

#[tokio::test]
async fn cleanup_error_triggers_relaunch() {
    let world = World::new();
    let mut manager = manager(&world);

    let first = manager.acquire().await.unwrap().pid();
    world.close_work_errors.store(true, Ordering::SeqCst);

    let second = manager.acquire().await.unwrap().pid();

    assert_ne!(first, second);
    assert_eq!(world.count("spawn"), 2);
}

#[tokio::test]
async fn acquire_fresh_always_yields_a_new_pid() {
    let world = World::new();
    let mut manager = manager(&world);

    let first = manager.acquire().await.unwrap().pid();
    let second = manager.acquire_fresh().await.unwrap().pid();

    assert_ne!(first, second);
    assert_eq!(manager.held_pid(), Some(second));
    // The old instance was handed to teardown before the relaunch.
    assert_eq!(world.count(&format!("terminate {}", first)), 1);
}

#[tokio::test]
async fn teardown_failure_does_not_block_replacement() {
    let world = World::new();
    let mut manager = manager(&world);

    let first = manager.acquire().await.unwrap().pid();
    world.terminate_errors.store(true, Ordering::SeqCst);

    let second = manager.acquire_fresh().await.unwrap().pid();

    assert_ne!(first, second);
    assert_eq!(manager.held_pid(), Some(second));
    assert_eq!(world.count("spawn"), 2);
}

#[tokio::test]
async fn shutdown_twice_never_spawns() {
    let world = World::new();
    let mut manager = manager(&world);

    let pid = manager.acquire().await.unwrap().pid();

    manager.shutdown().await;
    manager.shutdown().await;

    assert_eq!(manager.held_pid(), None);
    assert_eq!(world.count("spawn"), 1);
    assert_eq!(world.count(&format!("terminate {}", pid)), 1);
}

#[tokio::test]
async fn shutdown_absorbs_teardown_failure() {
    let world = World::new();
    let mut manager = manager(&world);

    manager.acquire().await.unwrap();
    world.terminate_errors.store(true, Ordering::SeqCst);

    // Must not panic or surface the failure.
    manager.shutdown().await;
    manager.shutdown().await;

    assert_eq!(manager.held_pid(), None);
}

#[tokio::test]
async fn shutdown_without_instance_is_inert() {
    let world = World::new();
    let mut manager = manager(&world);

    manager.shutdown().await;

    assert!(world.events().is_empty());
}
