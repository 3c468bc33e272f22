//! Tests for the busy/interrupt coordinator.
//!
//! Validates callback registration lifetimes, firing order, de-duplication
//! and the interrupt token.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vmrig::{BusyCoordinator, Error, InterruptCallback, InterruptToken};

fn recording(id: usize, log: &Arc<Mutex<Vec<usize>>>) -> InterruptCallback {
    let log = Arc::clone(log);
    Arc::new(move || log.lock().unwrap().push(id))
}

// =============================================================================
// Registration Tests
// =============================================================================

#[tokio::test]
async fn test_callback_registered_only_inside_block() {
    let busy = BusyCoordinator::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let callback = recording(1, &log);

    assert!(!busy.is_busy());
    busy.busy(Arc::clone(&callback), async {
        assert!(busy.is_busy());
        assert_eq!(busy.fire(), 1);
    })
    .await;

    assert!(!busy.is_busy());
    assert_eq!(busy.fire(), 0, "no callback after the block");
    assert_eq!(*log.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn test_callback_unregistered_when_block_fails() {
    let busy = BusyCoordinator::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let result: Result<(), Error> = busy
        .busy(recording(1, &log), async {
            Err(Error::action_failed("up", "boom"))
        })
        .await;

    assert!(result.is_err());
    assert!(!busy.is_busy());
}

#[tokio::test]
async fn test_callback_unregistered_when_block_is_dropped() {
    let busy = Arc::new(BusyCoordinator::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    let timed_out = tokio::time::timeout(
        Duration::from_millis(10),
        busy.busy(recording(1, &log), std::future::pending::<()>()),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(!busy.is_busy(), "cancelled block must unregister");
}

#[tokio::test]
async fn test_nested_blocks_fire_most_recent_first() {
    let busy = BusyCoordinator::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    busy.busy(recording(1, &log), async {
        busy.busy(recording(2, &log), async {
            assert_eq!(busy.registered(), 2);
            busy.fire();
        })
        .await;
        assert_eq!(busy.registered(), 1);
    })
    .await;

    assert_eq!(*log.lock().unwrap(), vec![2, 1]);
}

#[tokio::test]
async fn test_same_callback_registers_once() {
    let busy = BusyCoordinator::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let callback: InterruptCallback = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    busy.busy(Arc::clone(&callback), async {
        busy.busy(Arc::clone(&callback), async {
            assert_eq!(busy.registered(), 1);
            busy.fire();
        })
        .await;
        assert!(busy.is_busy(), "outer block still holds the callback");
    })
    .await;

    assert_eq!(fired.load(Ordering::SeqCst), 1, "duplicates fire once");
    assert!(!busy.is_busy());
}

#[test]
fn test_first_interrupt_notice_once() {
    let busy = BusyCoordinator::new();
    assert!(busy.take_first_interrupt_notice());
    assert!(!busy.take_first_interrupt_notice());
}

#[test]
fn test_signal_trap_requires_runtime() {
    let busy = Arc::new(BusyCoordinator::new());
    assert!(busy.install_signal_trap().is_err());
}

#[tokio::test]
async fn test_signal_trap_installed_once() {
    let busy = Arc::new(BusyCoordinator::new());
    assert!(busy.install_signal_trap().unwrap());
    assert!(!busy.install_signal_trap().unwrap());
}

// =============================================================================
// Interrupt Token Tests
// =============================================================================

#[tokio::test]
async fn test_token_shared_between_clones() {
    let token = InterruptToken::new();
    let clone = token.clone();

    assert!(!clone.is_interrupted());
    token.interrupt();
    assert!(clone.is_interrupted());
}

#[tokio::test]
async fn test_cancelled_wakes_waiters() {
    let token = InterruptToken::new();
    let waiter = {
        let token = token.clone();
        tokio::spawn(async move { token.cancelled().await })
    };

    tokio::task::yield_now().await;
    token.interrupt();

    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should wake")
        .unwrap();
}
