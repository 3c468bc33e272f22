//! # Pipeline Constants
//!
//! Defines default paths, well-known environment keys, interrupt messages and
//! recursion bounds for the action pipeline. These constants are the
//! **single source of truth** for values shared between the runner, the
//! warden, the lock manager and the builtin middleware.
//!
//! ## Cross-References
//!
//! - [`crate::config`]: Uses the directory and hook defaults
//! - [`crate::lock`]: Uses the lock file suffix
//! - [`crate::action::runner`]: Uses the interrupt messages and exit code
//! - [`crate::action::builder`]: Uses the nesting bound

// =============================================================================
// Paths
// =============================================================================

/// Directory name created under the user's home for runtime state.
pub const HOME_DIR_NAME: &str = ".vmrig";

/// Sub-directory of the home directory holding lock files.
pub const LOCK_DIR_NAME: &str = "locks";

/// Suffix appended to every lock file name.
pub const LOCK_FILE_SUFFIX: &str = ".lock";

/// Environment variable overriding the home directory.
pub const HOME_ENV_VAR: &str = "VMRIG_HOME";

/// Environment variable holding the log filter directive.
pub const LOG_ENV_VAR: &str = "VMRIG_LOG";

/// Log filter used when neither `VMRIG_LOG` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "warn";

// =============================================================================
// Actions
// =============================================================================

/// Name of the action run once before every top-level action.
pub const BEFORE_RUN_HOOK: &str = "before_run";

/// Lock name used when an action does not target a machine.
pub const GLOBAL_LOCK_NAME: &str = "global";

/// Prefix of the per-machine action lock name.
pub const MACHINE_LOCK_PREFIX: &str = "machine-action-";

/// Environment key holding the boolean outcome of condition middleware.
pub const RESULT_KEY: &str = "result";

/// Maximum depth of nested builders and registry references.
///
/// **Rationale**: A named stack that (indirectly) references itself would
/// otherwise recurse until the stack overflows. 32 levels is far deeper than
/// any real composition.
pub const MAX_BUILDER_DEPTH: usize = 32;

// =============================================================================
// Interrupts
// =============================================================================

/// Shown on the first interrupt of the process.
pub const INTERRUPT_WAITING_MESSAGE: &str =
    "Waiting for cleanup before exiting... (interrupt again to force exit)";

/// Shown when a second interrupt forces termination.
pub const INTERRUPT_FORCE_MESSAGE: &str = "Exiting immediately, without cleanup!";

/// Process exit code used when a second interrupt forces termination.
pub const FORCE_EXIT_CODE: i32 = 1;
