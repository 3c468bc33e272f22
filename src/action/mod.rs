//! # Action Pipeline
//!
//! Composes independently written middleware into one executable chain.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Runner                                                           │
//! │   resolve → before-run hook → hooks → lock → busy(interrupt)     │
//! │                                                                  │
//! │   ┌────────────────────────────────────────────────────────────┐ │
//! │   │ Warden                                                     │ │
//! │   │   m0.call ──▶ m1.call ──▶ m2.call                          │ │
//! │   │     ▲ after     ▲ after     │                              │ │
//! │   │     └───────────┴───────────┘  (recover on failure)        │ │
//! │   └────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Module | Role |
//! |--------|------|
//! | [`middleware`] | the `Middleware` contract, `Next`, factories |
//! | [`builder`] | editable middleware lists, flattening, construction |
//! | [`warden`] | ordered execution with recovery and interrupt checks |
//! | [`hook`] | patches applied to registered stacks |
//! | [`runner`] | the public entry point |
//! | [`batch`] | one action per machine, serial or parallel |
//! | [`builtin`] | middleware shipped with the crate |

pub mod batch;
pub mod builder;
pub mod builtin;
pub mod hook;
pub mod middleware;
pub mod runner;
pub mod warden;

pub use batch::{Batch, BatchOutcome, BatchReport};
pub use builder::{Builder, MiddlewareSpec, Position};
pub use hook::Hook;
pub use middleware::{factory, InlineFn, Middleware, MiddlewareFactory, Next};
pub use runner::{Action, ForceExitFn, RunOptions, Runner};
pub use warden::Warden;
