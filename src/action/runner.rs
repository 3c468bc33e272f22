//! # Action Runner
//!
//! The single entry point for executing actions.
//!
//! ## Run Sequence
//!
//! ```text
//! run(action, options)
//!   │
//!   ├─ resolve action          Named → registry lookup, else wrap
//!   ├─ before-run hook         once per top-level run, never for itself
//!   ├─ apply action hooks      on a copy of the resolved builder
//!   ├─ acquire lock            machine lock or the global lock, re-entrant
//!   ├─ busy(interrupt callback)
//!   │    └─ Warden::run(build(builder))
//!   └─ release lock            on every exit path
//! ```
//!
//! ## Interrupts
//!
//! The runner's busy callback implements the escalation policy:
//!
//! | Signal | Effect |
//! |--------|--------|
//! | first  | warn "waiting for cleanup" (once per process), set the interrupt token |
//! | second | warn "exiting immediately", call the force-exit hook |
//!
//! The default force-exit hook terminates the process with
//! [`Config::force_exit_code`].

use super::builder::{Builder, MiddlewareSpec};
use super::builtin::InitLogging;
use super::hook::Hook;
use super::middleware::{InlineFn, MiddlewareFactory};
use super::warden::Warden;
use crate::busy::{BusyCoordinator, InterruptCallback};
use crate::config::Config;
use crate::constants::{
    BEFORE_RUN_HOOK, GLOBAL_LOCK_NAME, INTERRUPT_FORCE_MESSAGE, INTERRUPT_WAITING_MESSAGE,
};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::interrupt::InterruptToken;
use crate::lock::LockManager;
use crate::machine::Machine;
use crate::registry::Registry;
use crate::ui::{LogUi, Ui};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Hook called when a second interrupt forces termination.
pub type ForceExitFn = Arc<dyn Fn(i32) + Send + Sync>;

// =============================================================================
// Actions and Options
// =============================================================================

/// Something the runner can execute.
#[derive(Clone)]
pub enum Action {
    /// A builder registered under this name.
    Named(String),
    /// An ad-hoc builder.
    Builder(Builder),
    /// A single middleware, run as a one-step chain.
    Middleware(Arc<dyn MiddlewareFactory>),
    /// A plain function, run as a one-step chain.
    Callable { name: String, func: InlineFn },
}

impl Action {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn callable<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Environment) -> Result<()> + Send + Sync + 'static,
    {
        Self::Callable {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Name logged for this action.
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name.as_str(),
            Self::Builder(builder) => builder.name().unwrap_or("<builder>"),
            Self::Middleware(factory) => factory.name(),
            Self::Callable { name, .. } => name.as_str(),
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Builder(builder) => f.debug_tuple("Builder").field(builder).finish(),
            Self::Middleware(factory) => f.debug_tuple("Middleware").field(&factory.name()).finish(),
            Self::Callable { name, .. } => f.debug_struct("Callable").field("name", name).finish(),
        }
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Builder> for Action {
    fn from(builder: Builder) -> Self {
        Self::Builder(builder)
    }
}

impl From<Arc<dyn MiddlewareFactory>> for Action {
    fn from(factory: Arc<dyn MiddlewareFactory>) -> Self {
        Self::Middleware(factory)
    }
}

/// Extra inputs merged into a fresh environment.
#[derive(Default)]
pub struct RunOptions {
    machine: Option<Arc<Machine>>,
    interrupt: Option<InterruptToken>,
    values: Vec<(String, Box<dyn Any + Send + Sync>)>,
}

impl RunOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_machine(mut self, machine: Arc<Machine>) -> Self {
        self.machine = Some(machine);
        self
    }

    #[must_use]
    pub fn with_interrupt(mut self, token: InterruptToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    /// Seeds `key` with `value` before the chain runs.
    #[must_use]
    pub fn with_value<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.values.push((key.into(), Box::new(value)));
        self
    }

    pub fn machine(&self) -> Option<&Arc<Machine>> {
        self.machine.as_ref()
    }

    fn apply(self, mut env: Environment) -> Environment {
        if let Some(machine) = self.machine {
            env = env.with_machine(machine);
        }
        if let Some(token) = self.interrupt {
            env = env.with_interrupt(token);
        }
        for (key, value) in self.values {
            env.insert_boxed(key, value);
        }
        env
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = self.values.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("RunOptions")
            .field("machine", &self.machine.as_ref().map(|m| m.name()))
            .field("values", &keys)
            .finish()
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Resolves and executes actions.
pub struct Runner {
    config: Config,
    registry: Arc<Registry<Builder>>,
    hooks: HashMap<String, Vec<Hook>>,
    busy: Arc<BusyCoordinator>,
    locks: LockManager,
    ui: Arc<dyn Ui>,
    force_exit: ForceExitFn,
}

impl Runner {
    /// Creates a runner over `registry`, sharing the process coordinator `busy`.
    pub fn new(config: Config, registry: Arc<Registry<Builder>>, busy: Arc<BusyCoordinator>) -> Self {
        let locks = LockManager::new(config.lock_dir.clone());
        Self {
            config,
            registry,
            hooks: HashMap::new(),
            busy,
            locks,
            ui: Arc::new(LogUi::new()),
            force_exit: Arc::new(|code| std::process::exit(code)),
        }
    }

    /// Registry containing the default before-run stack.
    pub fn default_registry() -> Registry<Builder> {
        let mut registry = Registry::new();
        registry.register(BEFORE_RUN_HOOK, || {
            let mut builder = Builder::named(BEFORE_RUN_HOOK);
            builder.use_middleware(InitLogging::factory(), Vec::new());
            builder
        });
        registry
    }

    /// Uses `ui` for environments created by this runner.
    #[must_use]
    pub fn with_ui(mut self, ui: Arc<dyn Ui>) -> Self {
        self.ui = ui;
        self
    }

    /// Replaces the hook called on a forced exit.
    #[must_use]
    pub fn with_force_exit<F>(mut self, force_exit: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.force_exit = Arc::new(force_exit);
        self
    }

    /// Uses a caller-provided lock manager (shared between runners).
    #[must_use]
    pub fn with_lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = locks;
        self
    }

    /// Registers `hook` for every run of `action`.
    pub fn register_hook(&mut self, action: impl Into<String>, hook: Hook) {
        self.hooks.entry(action.into()).or_default().push(hook);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry<Builder>> {
        &self.registry
    }

    pub fn busy(&self) -> &Arc<BusyCoordinator> {
        &self.busy
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Creates a top-level environment from `options`.
    pub fn environment(&self, options: RunOptions) -> Environment {
        options.apply(Environment::new(Arc::clone(&self.ui)))
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Runs `action` in a fresh environment and returns it.
    pub async fn run(&self, action: impl Into<Action>, options: RunOptions) -> Result<Environment> {
        let mut env = self.environment(options);
        self.run_with_env(action.into(), &mut env).await?;
        Ok(env)
    }

    /// Runs `action` inside an in-flight action.
    ///
    /// The child environment shares the parent's locks, interrupt token,
    /// machine and UI, and the before-run hook is not run again.
    pub async fn run_nested(
        &self,
        parent: &Environment,
        action: impl Into<Action>,
        options: RunOptions,
    ) -> Result<Environment> {
        let mut env = options.apply(parent.child());
        self.run_with_env(action.into(), &mut env).await?;
        Ok(env)
    }

    /// Runs `action` against a caller-owned environment.
    pub async fn run_with_env(&self, action: Action, env: &mut Environment) -> Result<()> {
        let name = action.name().to_string();
        let builder = self.hooked(&name, self.resolve(action)?)?;

        env.set_action_registry(Arc::clone(&self.registry));
        if !env.is_nested() {
            self.run_before_hook(&name, env).await?;
        }
        env.set_action_name(&name);

        info!(
            action = %name,
            machine = env.machine().map(|m| m.name()).unwrap_or("-"),
            "running action"
        );

        let lock_name = env
            .machine()
            .map(|m| m.lock_name())
            .unwrap_or_else(|| GLOBAL_LOCK_NAME.to_string());
        let _lock = self.locks.acquire(&lock_name, env.held_locks())?;

        if self.config.trap_signals {
            if let Err(e) = self.busy.install_signal_trap() {
                warn!(error = %e, "interrupt trap unavailable");
            }
        }

        let callback = {
            let ui = Arc::clone(env.ui());
            let token = env.interrupt_token().clone();
            env.interrupt_callback_or_init(|| self.interrupt_callback(ui, token))
        };

        let stack = builder.build(env, Some(&self.registry))?;
        let mut warden = Warden::new(stack);
        let result = self.busy.busy(callback, warden.run(env)).await;

        match &result {
            Ok(()) => info!(action = %name, "action completed"),
            Err(e) if e.is_interrupt() => warn!(action = %name, "action interrupted"),
            Err(e) => error!(action = %name, error = %e, "action failed"),
        }
        result
    }

    fn resolve(&self, action: Action) -> Result<Builder> {
        match action {
            Action::Named(name) => self
                .registry
                .get(&name)
                .cloned()
                .ok_or(Error::InvalidAction(name)),
            Action::Builder(builder) => Ok(builder),
            Action::Middleware(factory) => {
                let mut builder = Builder::named(factory.name());
                builder.use_middleware(factory, Vec::new());
                Ok(builder)
            }
            Action::Callable { name, func } => {
                let mut builder = Builder::named(name.clone());
                builder.push(MiddlewareSpec::Inline { name, func });
                Ok(builder)
            }
        }
    }

    fn hooked(&self, name: &str, mut builder: Builder) -> Result<Builder> {
        if let Some(hooks) = self.hooks.get(name) {
            debug!(action = name, hooks = hooks.len(), "applying action hooks");
            for hook in hooks {
                hook.apply(&mut builder)?;
            }
        }
        Ok(builder)
    }

    async fn run_before_hook(&self, action: &str, env: &mut Environment) -> Result<()> {
        let Some(hook) = self.config.before_run_hook.as_deref() else {
            return Ok(());
        };
        if hook == action {
            return Ok(());
        }
        let Some(builder) = self.registry.get(hook) else {
            return Ok(());
        };

        debug!(hook, action, "running before-run hook");
        let mut hook_env = env.child();
        hook_env.set_action_name(hook);
        let stack = builder.build(&hook_env, Some(&self.registry))?;
        Warden::new(stack).run(&mut hook_env).await
    }

    fn interrupt_callback(&self, ui: Arc<dyn Ui>, token: InterruptToken) -> InterruptCallback {
        let busy = Arc::downgrade(&self.busy);
        let force_exit = Arc::clone(&self.force_exit);
        let code = self.config.force_exit_code;

        Arc::new(move || {
            if token.is_interrupted() {
                ui.warn(INTERRUPT_FORCE_MESSAGE);
                force_exit(code);
                return;
            }
            if busy
                .upgrade()
                .is_some_and(|busy| busy.take_first_interrupt_notice())
            {
                ui.warn(INTERRUPT_WAITING_MESSAGE);
            }
            token.interrupt();
        })
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}
