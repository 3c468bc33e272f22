//! Tests for batch execution.
//!
//! Validates serial and parallel scheduling, per-job environments and
//! failure isolation.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Barrier;
use vmrig::action::factory;
use vmrig::{
    Batch, Builder, BusyCoordinator, Config, Driver, Environment, Error, Machine, MachineState,
    Middleware, Next, Provider, Registry, Result, RunOptions, Runner,
};

struct StaticDriver;

#[async_trait]
impl Driver for StaticDriver {
    fn name(&self) -> &str {
        "static"
    }

    async fn read_state(&self, _id: Option<&str>) -> Result<MachineState> {
        Ok(MachineState::PowerOff)
    }
}

fn machine(name: &str, parallel: bool) -> Arc<Machine> {
    Arc::new(Machine::new(
        name,
        Provider::new("static", parallel),
        Arc::new(StaticDriver),
    ))
}

/// Blocks until every job of the batch reached it.
struct Rendezvous {
    barrier: Arc<Barrier>,
}

#[async_trait]
impl Middleware for Rendezvous {
    async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
        self.barrier.wait().await;
        next.run(env).await
    }
}

fn runner(dir: &TempDir, registry: Registry<Builder>) -> Arc<Runner> {
    let mut config = Config::with_home(dir.path());
    config.trap_signals = false;
    Arc::new(
        Runner::new(config, Arc::new(registry), Arc::new(BusyCoordinator::new()))
            .with_force_exit(|code| panic!("unexpected forced exit with code {code}")),
    )
}

fn recording_registry(log: &Arc<Mutex<Vec<String>>>) -> Registry<Builder> {
    let mut registry = Runner::default_registry();
    let log = Arc::clone(log);
    registry.register("up", move || {
        let log = Arc::clone(&log);
        let mut builder = Builder::named("up");
        builder.use_fn("record", move |env| {
            let machine = env.require_machine()?.name().to_string();
            if machine == "broken" {
                return Err(Error::action_failed("up", "provider exploded"));
            }
            env.insert("booted", machine.clone());
            log.lock().unwrap().push(machine);
            Ok(())
        });
        builder
    });
    registry
}

// =============================================================================
// Scheduling Tests
// =============================================================================

#[test]
fn test_parallel_requires_parallel_safe_providers() {
    let dir = TempDir::new().unwrap();
    let runner = runner(&dir, Runner::default_registry());

    let mut batch = Batch::new(Arc::clone(&runner), true);
    batch
        .push("up", RunOptions::new().with_machine(machine("web", true)))
        .push("up", RunOptions::new().with_machine(machine("db", true)));
    assert!(batch.runs_in_parallel());

    batch.push("up", RunOptions::new().with_machine(machine("legacy", false)));
    assert!(!batch.runs_in_parallel());

    let mut without_machine = Batch::new(Arc::clone(&runner), true);
    without_machine.push("up", RunOptions::new());
    assert!(!without_machine.runs_in_parallel());

    let mut serial = Batch::new(runner, false);
    serial.push("up", RunOptions::new().with_machine(machine("web", true)));
    assert!(!serial.runs_in_parallel());
}

#[tokio::test]
async fn test_serial_batch_runs_in_submission_order() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = runner(&dir, recording_registry(&log));

    let mut batch = Batch::new(runner, false);
    for name in ["web", "db", "cache"] {
        batch.push("up", RunOptions::new().with_machine(machine(name, true)));
    }
    assert_eq!(batch.len(), 3);

    let envs = batch.run().await.into_result().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["web", "db", "cache"]);
    let booted: Vec<&String> = envs.iter().map(|e| e.get::<String>("booted").unwrap()).collect();
    assert_eq!(booted, vec!["web", "db", "cache"], "one environment per job");
}

#[tokio::test]
async fn test_parallel_batch_runs_jobs_concurrently() {
    let dir = TempDir::new().unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let mut registry = Runner::default_registry();
    let shared = Arc::clone(&barrier);
    registry.register("sync", move || {
        let barrier = Arc::clone(&shared);
        let mut builder = Builder::named("sync");
        builder.use_middleware(
            factory("rendezvous", move |_, _| {
                Ok(Box::new(Rendezvous {
                    barrier: Arc::clone(&barrier),
                }) as Box<dyn Middleware>)
            }),
            Vec::new(),
        );
        builder
    });

    let mut batch = Batch::new(runner(&dir, registry), true);
    batch
        .push("sync", RunOptions::new().with_machine(machine("web", true)))
        .push("sync", RunOptions::new().with_machine(machine("db", true)));

    let report = tokio::time::timeout(Duration::from_secs(5), batch.run())
        .await
        .expect("jobs should meet at the barrier");

    assert_eq!(report.failures(), 0);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[tokio::test]
async fn test_failure_does_not_cancel_siblings() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let runner = runner(&dir, recording_registry(&log));

    let mut batch = Batch::new(runner, true);
    for name in ["web", "broken", "db"] {
        batch.push("up", RunOptions::new().with_machine(machine(name, true)));
    }

    let report = batch.run().await;

    assert_eq!(report.failures(), 1);
    let machines: Vec<_> = report
        .outcomes()
        .iter()
        .map(|o| (o.machine.as_deref().unwrap(), o.is_ok()))
        .collect();
    assert_eq!(
        machines,
        vec![("web", true), ("broken", false), ("db", true)],
        "outcomes keep submission order"
    );

    let mut finished = log.lock().unwrap().clone();
    finished.sort();
    assert_eq!(finished, vec!["db", "web"]);

    match report.into_result() {
        Err(Error::Batch { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("broken"), "should name the machine");
            assert!(failures[0].contains("provider exploded"));
        }
        other => panic!("expected batch error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_batch() {
    let dir = TempDir::new().unwrap();
    let batch = Batch::new(runner(&dir, Runner::default_registry()), true);

    assert!(batch.is_empty());
    let report = batch.run().await;
    assert!(report.outcomes().is_empty());
    assert!(report.into_result().unwrap().is_empty());
}
