//! Tests for error types.
//!
//! Validates display formatting and error classification.

use std::path::PathBuf;
use vmrig::Error;

// =============================================================================
// Pipeline Error Tests
// =============================================================================

#[test]
fn test_invalid_middleware_display() {
    let err = Error::InvalidMiddleware {
        spec: "provision".to_string(),
        reason: "not a registered action".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("provision"), "should include the spec");
    assert!(msg.contains("not a registered action"), "should include the reason");
}

#[test]
fn test_invalid_action_display() {
    let msg = Error::InvalidAction("reload".to_string()).to_string();
    assert!(msg.contains("reload"), "should include the action name");
}

#[test]
fn test_action_failed_helper() {
    let err = Error::action_failed("up", "VBoxManage exited with 1");
    match &err {
        Error::ActionFailed { action, reason } => {
            assert_eq!(action, "up");
            assert_eq!(reason, "VBoxManage exited with 1");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
    assert!(err.to_string().contains("'up' failed"));
}

#[test]
fn test_batch_display_lists_failures() {
    let err = Error::Batch {
        failures: vec!["web: boom".to_string(), "db: bang".to_string()],
    };
    let msg = err.to_string();

    assert!(msg.starts_with("2 batch job(s) failed"), "got: {msg}");
    assert!(msg.contains("web: boom"));
    assert!(msg.contains("db: bang"));
}

// =============================================================================
// Capability Error Tests
// =============================================================================

#[test]
fn test_capability_not_found_display() {
    let err = Error::CapabilityNotFound {
        cap: "mount_nfs_folder".to_string(),
        host: "ubuntu".to_string(),
    };
    let msg = err.to_string();

    assert!(msg.contains("mount_nfs_folder"), "should include the capability");
    assert!(msg.contains("ubuntu"), "should include the host");
}

#[test]
fn test_capability_host_errors_display() {
    let not_detected = Error::CapabilityHostNotDetected {
        kind: "guest".to_string(),
    };
    assert!(not_detected.to_string().contains("guest"));

    let explicit = Error::CapabilityHostExplicitNotDetected {
        value: "haiku".to_string(),
    };
    assert!(explicit.to_string().contains("haiku"));

    let cycle = Error::CapabilityHostCycle {
        name: "a".to_string(),
    };
    assert!(cycle.to_string().contains("cyclic"));
}

// =============================================================================
// Locking and Interrupt Tests
// =============================================================================

#[test]
fn test_locked_display() {
    let msg = Error::Locked {
        name: "machine-action-web".to_string(),
    }
    .to_string();
    assert!(msg.contains("machine-action-web"));
}

#[test]
fn test_lock_failed_display() {
    let msg = Error::LockFailed {
        path: PathBuf::from("/var/lib/vmrig/locks/global.lock"),
        reason: "permission denied".to_string(),
    }
    .to_string();

    assert!(msg.contains("global.lock"), "should include the path");
    assert!(msg.contains("permission denied"));
}

#[test]
fn test_only_interrupted_is_interrupt() {
    assert!(Error::Interrupted.is_interrupt());
    assert!(!Error::action_failed("up", "boom").is_interrupt());
    assert!(!Error::Internal("x".to_string()).is_interrupt());
}

// =============================================================================
// Conversion Tests
// =============================================================================

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: Error = io.into();
    assert!(matches!(err, Error::Io(_)));
    assert!(err.to_string().contains("missing"));
}

#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Serialization(_)));
}
