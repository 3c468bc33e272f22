//! # Environment Context
//!
//! The mutable state threaded through every middleware of one action run.
//!
//! ```text
//! Environment
//! ├── action_name      name the runner resolved
//! ├── machine          Option<Arc<Machine>>
//! ├── ui               Arc<dyn Ui>
//! ├── interrupt        InterruptToken (shared with the signal callback)
//! ├── held_locks       HeldLocks (shared with nested runs)
//! ├── error            message of the failure that unwound the chain
//! └── values           "timeout" → u32, "result" → bool, ...
//! ```
//!
//! Middleware mutate the environment in place; later middleware see every
//! earlier mutation. Values are stored type-erased and read back with the
//! type they were written with:
//!
//! ```rust,ignore
//! env.insert("timeout", 4u32);
//! *env.get_mut::<u32>("timeout").unwrap() /= 2;
//! assert_eq!(env.get::<u32>("timeout"), Some(&2));
//! ```
//!
//! One environment is owned by exactly one in-flight run. Batch runs create
//! one per machine.

use crate::action::Builder;
use crate::busy::InterruptCallback;
use crate::error::{Error, Result};
use crate::interrupt::InterruptToken;
use crate::lock::HeldLocks;
use crate::machine::Machine;
use crate::registry::Registry;
use crate::ui::Ui;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Value = Box<dyn Any + Send + Sync>;

/// Shared state bag of one action run.
pub struct Environment {
    action_name: String,
    machine: Option<Arc<Machine>>,
    ui: Arc<dyn Ui>,
    interrupt: InterruptToken,
    held_locks: HeldLocks,
    error: Option<String>,
    nested: bool,
    registry: Option<Arc<Registry<Builder>>>,
    interrupt_callback: Option<InterruptCallback>,
    values: HashMap<String, Value>,
}

impl Environment {
    /// Creates an empty environment reporting through `ui`.
    pub fn new(ui: Arc<dyn Ui>) -> Self {
        Self {
            action_name: String::new(),
            machine: None,
            ui,
            interrupt: InterruptToken::new(),
            held_locks: HeldLocks::new(),
            error: None,
            nested: false,
            registry: None,
            interrupt_callback: None,
            values: HashMap::new(),
        }
    }

    /// Sets the machine acted on.
    #[must_use]
    pub fn with_machine(mut self, machine: Arc<Machine>) -> Self {
        self.machine = Some(machine);
        self
    }

    /// Uses an existing interrupt token (e.g., one shared by a batch).
    #[must_use]
    pub fn with_interrupt(mut self, token: InterruptToken) -> Self {
        self.interrupt = token;
        self
    }

    /// Creates the environment of a run nested inside this one.
    ///
    /// The child shares the machine, UI, interrupt token and held locks, and
    /// starts with no values.
    pub fn child(&self) -> Self {
        Self {
            action_name: String::new(),
            machine: self.machine.clone(),
            ui: Arc::clone(&self.ui),
            interrupt: self.interrupt.clone(),
            held_locks: self.held_locks.clone(),
            error: None,
            nested: true,
            registry: self.registry.clone(),
            interrupt_callback: self.interrupt_callback.clone(),
            values: HashMap::new(),
        }
    }

    // =========================================================================
    // Well-Known Slots
    // =========================================================================

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub(crate) fn set_action_name(&mut self, name: impl Into<String>) {
        self.action_name = name.into();
    }

    pub fn machine(&self) -> Option<&Arc<Machine>> {
        self.machine.as_ref()
    }

    /// The machine, or an error naming the current action.
    pub fn require_machine(&self) -> Result<&Arc<Machine>> {
        self.machine
            .as_ref()
            .ok_or_else(|| Error::action_failed(&self.action_name, "action requires a machine"))
    }

    pub fn ui(&self) -> &Arc<dyn Ui> {
        &self.ui
    }

    pub fn interrupt_token(&self) -> &InterruptToken {
        &self.interrupt
    }

    /// Returns true once the run has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_interrupted()
    }

    /// Requests a cooperative stop of the chain.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    pub fn held_locks(&self) -> &HeldLocks {
        &self.held_locks
    }

    /// True for environments created by [`Environment::child`].
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Registry used to resolve named middleware during this run.
    pub fn action_registry(&self) -> Option<&Arc<Registry<Builder>>> {
        self.registry.as_ref()
    }

    pub(crate) fn set_action_registry(&mut self, registry: Arc<Registry<Builder>>) {
        self.registry = Some(registry);
    }

    /// Interrupt callback registered for this call path.
    ///
    /// Nested runs reuse their parent's callback so one signal interrupts
    /// the call path once.
    pub(crate) fn interrupt_callback_or_init(
        &mut self,
        init: impl FnOnce() -> InterruptCallback,
    ) -> InterruptCallback {
        Arc::clone(self.interrupt_callback.get_or_insert_with(init))
    }

    /// Message of the failure that unwound the chain, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn set_error(&mut self, error: &Error) {
        self.error = Some(error.to_string());
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    pub(crate) fn insert_boxed(&mut self, key: String, value: Value) {
        self.values.insert(key, value);
    }

    /// Reads `key` as `T`. `None` if missing or stored with another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Removes `key` and returns it as `T`.
    ///
    /// A value stored with another type is left in place.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.values
            .remove(key)
            .and_then(|v| v.downcast().ok())
            .map(|boxed| *boxed)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("action_name", &self.action_name)
            .field("machine", &self.machine.as_ref().map(|m| m.name()))
            .field("interrupted", &self.is_interrupted())
            .field("error", &self.error)
            .field("nested", &self.nested)
            .field("keys", &self.keys())
            .finish()
    }
}
