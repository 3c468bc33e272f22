//! Tests for runner configuration.
//!
//! Validates defaults, JSON loading and validation.

use std::fs;
use tempfile::TempDir;
use vmrig::{Config, Error, BEFORE_RUN_HOOK, FORCE_EXIT_CODE, LOCK_DIR_NAME};

#[test]
fn test_with_home_defaults() {
    let config = Config::with_home("/srv/vmrig");

    assert_eq!(config.lock_dir, config.home_dir.join(LOCK_DIR_NAME));
    assert_eq!(config.before_run_hook.as_deref(), Some(BEFORE_RUN_HOOK));
    assert_eq!(config.force_exit_code, FORCE_EXIT_CODE);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_json_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"lock_dir": "/tmp/vmrig-locks", "before_run_hook": null, "trap_signals": false}"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();

    assert_eq!(config.lock_dir.to_str(), Some("/tmp/vmrig-locks"));
    assert!(config.before_run_hook.is_none());
    assert!(!config.trap_signals);
    assert_eq!(config.force_exit_code, FORCE_EXIT_CODE, "missing fields use defaults");
}

#[test]
fn test_load_rejects_malformed_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();

    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("config.json"), "should name the file");
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = Config::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_validate_rejects_blank_hook() {
    let mut config = Config::with_home("/srv/vmrig");
    config.before_run_hook = Some("  ".to_string());
    assert!(config.validate().is_err());

    config.before_run_hook = None;
    config.lock_dir = Default::default();
    assert!(config.validate().is_err());
}
