//! User interface sink consumed by middleware.
//!
//! Middleware report status through a [`Ui`]. Pipeline logic never depends on
//! UI calls having effects beyond display, so every method is infallible
//! except [`Ui::ask`], which non-interactive implementations reject.

use crate::error::{Error, Result};
use tracing::{error, info, warn};

/// Output sink for user-facing status messages.
pub trait Ui: Send + Sync {
    /// Informational message.
    fn info(&self, message: &str);

    /// Warning message.
    fn warn(&self, message: &str);

    /// Error message.
    fn error(&self, message: &str);

    /// Prompts the user and returns the answer.
    fn ask(&self, prompt: &str) -> Result<String> {
        Err(Error::NotSupported(format!(
            "cannot ask '{prompt}': UI is not interactive"
        )))
    }

    /// Reports progress of a long-running operation.
    fn report_progress(&self, progress: u64, total: u64) {
        let _ = (progress, total);
    }

    /// Clears the current output line (after progress reporting).
    fn clear_line(&self) {}
}

/// Non-interactive UI that forwards every message to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogUi {
    /// Prefix prepended to every message (usually the machine name).
    prefix: Option<String>,
}

impl LogUi {
    /// Creates a UI without prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a UI that prefixes messages with `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn format(&self, message: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("==> {prefix}: {message}"),
            None => message.to_string(),
        }
    }
}

impl Ui for LogUi {
    fn info(&self, message: &str) {
        info!(target: "vmrig::ui", "{}", self.format(message));
    }

    fn warn(&self, message: &str) {
        warn!(target: "vmrig::ui", "{}", self.format(message));
    }

    fn error(&self, message: &str) {
        error!(target: "vmrig::ui", "{}", self.format(message));
    }

    fn report_progress(&self, progress: u64, total: u64) {
        if total > 0 {
            info!(target: "vmrig::ui", progress, total, "{}", self.format("progress"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_formatting() {
        let ui = LogUi::with_prefix("default");
        assert_eq!(ui.format("Booting VM..."), "==> default: Booting VM...");
        assert_eq!(LogUi::new().format("plain"), "plain");
    }

    #[test]
    fn test_ask_not_supported() {
        let ui = LogUi::new();
        assert!(matches!(ui.ask("continue?"), Err(Error::NotSupported(_))));
    }
}
