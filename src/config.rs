//! Runner configuration.
//!
//! Configuration is resolved from, in order of precedence:
//!
//! 1. An explicit JSON file passed to [`Config::load`]
//! 2. The `VMRIG_HOME` environment variable ([`Config::from_env`])
//! 3. Platform defaults (`~/.vmrig`)
//!
//! Fields missing from a JSON file take their default values.

use crate::constants::{
    BEFORE_RUN_HOOK, FORCE_EXIT_CODE, HOME_DIR_NAME, HOME_ENV_VAR, LOCK_DIR_NAME,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration shared by the runner, lock manager and signal trap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for runtime state.
    pub home_dir: PathBuf,
    /// Directory holding lock files.
    pub lock_dir: PathBuf,
    /// Action run once before every top-level action (if registered).
    pub before_run_hook: Option<String>,
    /// Install the process interrupt trap on first run.
    pub trap_signals: bool,
    /// Exit code used when a second interrupt forces termination.
    pub force_exit_code: i32,
}

impl Config {
    /// Builds a configuration rooted at `home_dir`.
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        Self {
            lock_dir: home_dir.join(LOCK_DIR_NAME),
            home_dir,
            before_run_hook: Some(BEFORE_RUN_HOOK.to_string()),
            trap_signals: true,
            force_exit_code: FORCE_EXIT_CODE,
        }
    }

    /// Resolves the configuration from the environment.
    pub fn from_env() -> Self {
        match std::env::var_os(HOME_ENV_VAR) {
            Some(home) if !home.is_empty() => Self::with_home(PathBuf::from(home)),
            _ => Self::default(),
        }
    }

    /// Loads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for obviously unusable values.
    pub fn validate(&self) -> Result<()> {
        if self.lock_dir.as_os_str().is_empty() {
            return Err(Error::Config("lock_dir must not be empty".to_string()));
        }
        if let Some(hook) = &self.before_run_hook {
            if hook.trim().is_empty() {
                return Err(Error::Config(
                    "before_run_hook must not be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_home(default_home_dir())
    }
}

/// Returns the platform-appropriate home directory.
///
/// - Unix/macOS: `~/.vmrig`
/// - Windows: `%LOCALAPPDATA%\vmrig`
fn default_home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir()
            .map(|d| d.join("vmrig"))
            .unwrap_or_else(|| PathBuf::from(HOME_DIR_NAME))
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .map(|h| h.join(HOME_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(HOME_DIR_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_home_derives_lock_dir() {
        let config = Config::with_home("/tmp/vmrig-test");
        assert_eq!(config.lock_dir, PathBuf::from("/tmp/vmrig-test/locks"));
        assert_eq!(config.before_run_hook.as_deref(), Some(BEFORE_RUN_HOOK));
        assert!(config.trap_signals);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"trap_signals": false}"#).unwrap();
        assert!(!config.trap_signals);
        assert_eq!(config.force_exit_code, FORCE_EXIT_CODE);
    }

    #[test]
    fn test_blank_hook_rejected() {
        let mut config = Config::with_home("/tmp/vmrig-test");
        config.before_run_hook = Some("  ".to_string());
        assert!(config.validate().is_err());
    }
}
