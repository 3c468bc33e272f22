//! # vmrig
//!
//! **Middleware Action Pipeline and Capability Dispatch for VM Lifecycles**
//!
//! This crate is the orchestration core of a VM lifecycle manager. Every
//! lifecycle operation (up, halt, package, ...) is an *action*: a chain of
//! independently written middleware threaded through one shared
//! environment. OS-specific behavior (mounting folders, setting hostnames,
//! configuring networks) is resolved at runtime through *capability hosts*
//! that detect the host and guest operating systems.
//!
//! The hypervisor driver, transport, configuration language and concrete
//! middleware bodies plug into the interfaces defined here.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              vmrig                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                        Runner                               │    │
//! │  │   resolve → before-run hook → lock → busy → Warden          │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                  Builder + Warden                         │      │
//! │  │  m0 ─▶ m1 ─▶ m2   (before/after, recover on failure)      │      │
//! │  │            Environment (shared, mutable)                  │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                  Capability Hosts                         │      │
//! │  │  Guest(machine) │ Host(platform) │ SyncedFolder(machine)  │      │
//! │  │  ubuntu → debian → linux   (first level that implements)  │      │
//! │  └───────────────────────────────────────────────────────────┘      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  Registry │ BusyCoordinator │ LockManager │ InterruptToken │ Driver │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Execution Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Entry in order, exit in reverse | nested `Next::run` calls |
//! | Short-circuit | a middleware that does not call `next` ends the chain |
//! | Cleanup on failure | [`Warden`] recovers entered middleware, most recent first |
//! | Exclusive access | [`LockManager`], re-entrant per call path |
//! | Graceful interrupt | [`BusyCoordinator`] callback sets the [`InterruptToken`] |
//! | Forced interrupt | a second signal calls the force-exit hook |
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmrig::{BusyCoordinator, Builder, Config, RunOptions, Runner};
//!
//! #[tokio::main]
//! async fn main() -> vmrig::Result<()> {
//!     let mut registry = Runner::default_registry();
//!     registry.register("hello", || {
//!         let mut builder = Builder::named("hello");
//!         builder.use_fn("greet", |env| {
//!             env.ui().info("hello");
//!             Ok(())
//!         });
//!         builder
//!     });
//!
//!     let runner = Runner::new(
//!         Config::from_env(),
//!         Arc::new(registry),
//!         Arc::new(BusyCoordinator::new()),
//!     );
//!     runner.run("hello", RunOptions::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod busy;
pub mod capability;
pub mod config;
pub mod constants;
pub mod driver;
pub mod environment;
pub mod error;
pub mod interrupt;
pub mod lock;
pub mod logging;
pub mod machine;
pub mod platform;
pub mod registry;
pub mod ui;

// Re-exports
pub use action::{
    Action, Batch, BatchOutcome, BatchReport, Builder, Hook, Middleware, MiddlewareFactory,
    MiddlewareSpec, Next, Position, RunOptions, Runner, Warden,
};
pub use busy::{BusyCoordinator, InterruptCallback};
pub use capability::{
    CapabilityHost, CapabilityImpl, CapabilityRegistry, Guest, Host, HostCandidates, SyncedFolder,
    SyncedFolderRegistry,
};
pub use config::Config;
pub use constants::*;
pub use driver::{Driver, ForwardedPort, MachineState, NetworkAdapter};
pub use environment::Environment;
pub use error::{Error, Result};
pub use interrupt::InterruptToken;
pub use lock::{HeldLocks, LockGuard, LockManager};
pub use machine::{Machine, Provider};
pub use platform::{Arch, Os, Platform};
pub use registry::Registry;
pub use ui::{LogUi, Ui};
