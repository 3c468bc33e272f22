//! # Warden
//!
//! Runs a built chain and guarantees cleanup on failure.
//!
//! ## Execution
//!
//! ```text
//! step(0) ─▶ m0.call ─▶ next.run ─▶ step(1) ─▶ m1.call ─▶ next.run ─▶ step(2) ─▶ m2.call
//!                                                                                 │ Err
//!            m0.recover ◀──────────────── m1.recover ◀──────────── m2.recover ◀──┘
//! ```
//!
//! Each level records how deep the chain has been entered. When an error
//! surfaces at level `i`, every deeper entered level that has not been
//! recovered yet is recovered, most recently entered first. The error then
//! propagates to level `i - 1`, which is recovered in turn, and so on up to
//! the top of the chain.
//!
//! The middleware whose own `call` returned the error is not recovered: it
//! is expected to clean up before failing. Middleware that never ran are
//! never recovered, and no middleware is recovered twice.
//!
//! ## Nested Chains
//!
//! [`Warden::run_then`] runs a chain whose end continues an enclosing chain
//! through its [`Next`]. Both chains share one unwind: a failure in the
//! enclosing remainder recovers its own levels, then every level of the
//! nested chain, then the enclosing levels above it.
//!
//! ## Interruption
//!
//! The environment's interrupt token is checked before entering each level
//! and after each level returns. A set token turns into
//! [`Error::Interrupted`], which unwinds through the same recovery path.
//! Interruption is cooperative: a running middleware is never preempted.
//!
//! ## Recovery Errors
//!
//! Errors returned by `recover` are logged and dropped. The caller always
//! sees the error that started the unwind.

use super::middleware::{Middleware, Next};
use crate::environment::Environment;
use crate::error::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// How far a run has progressed through its stack.
#[derive(Debug)]
pub(crate) struct Progress {
    /// Number of levels whose `call` was entered.
    entered: usize,
    /// Levels at or above this index have already been recovered.
    recovered_below: usize,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            entered: 0,
            recovered_below: usize::MAX,
        }
    }
}

/// Runs level `depth` (the head of `stack`) and everything behind it,
/// then `tail` once `stack` is exhausted.
pub(crate) fn step<'a>(
    stack: &'a mut [Box<dyn Middleware>],
    progress: &'a mut Progress,
    depth: usize,
    env: &'a mut Environment,
    tail: Option<Box<Next<'a>>>,
) -> StepFuture<'a> {
    Box::pin(async move {
        let Some((current, rest)) = stack.split_first_mut() else {
            let Some(tail) = tail else {
                return Ok(());
            };
            let result = (*tail).run(env).await;
            if result.is_err() {
                // The tail unwinds itself; every level of this stack is still pending.
                progress.recovered_below = progress.recovered_below.min(depth);
            }
            return result;
        };

        if env.is_interrupted() {
            debug!(depth, middleware = current.name(), "interrupted before entering");
            progress.recovered_below = progress.recovered_below.min(depth);
            return Err(Error::Interrupted);
        }

        progress.entered = progress.entered.max(depth + 1);
        debug!(depth, middleware = current.name(), "entering middleware");

        let result = current
            .call(env, Next::new(rest, progress, depth + 1, tail))
            .await;

        let (err, raised_here) = match result {
            Ok(()) if env.is_interrupted() => (Error::Interrupted, false),
            Ok(()) => {
                debug!(depth, middleware = current.name(), "middleware returned");
                return Ok(());
            }
            // A deeper level that failed has already lowered the mark to depth + 1.
            Err(err) => {
                let raised_here = progress.recovered_below > depth + 1;
                (err, raised_here)
            }
        };

        if raised_here {
            debug!(depth, middleware = current.name(), error = %err, "middleware failed");
        }

        let upper = progress.recovered_below.min(progress.entered);
        for level in (depth + 1..upper).rev() {
            recover_one(&mut rest[level - depth - 1], env, &err).await;
        }
        if !raised_here {
            recover_one(current, env, &err).await;
        }
        progress.recovered_below = progress.recovered_below.min(depth);

        Err(err)
    })
}

async fn recover_one(
    middleware: &mut Box<dyn Middleware>,
    env: &mut Environment,
    cause: &(dyn std::fmt::Display + Sync),
) {
    debug!(middleware = middleware.name(), cause = %cause, "recovering middleware");
    if let Err(e) = middleware.recover(env).await {
        warn!(
            middleware = middleware.name(),
            error = %e,
            "recover failed, keeping original error"
        );
    }
}

/// Owns one built chain and its progress.
pub struct Warden {
    stack: Vec<Box<dyn Middleware>>,
    progress: Progress,
}

impl Warden {
    pub fn new(stack: Vec<Box<dyn Middleware>>) -> Self {
        Self {
            stack,
            progress: Progress::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Runs the chain from the top.
    ///
    /// On failure, the error message (but not an interrupt) is recorded in
    /// the environment before it is returned.
    pub async fn run(&mut self, env: &mut Environment) -> Result<()> {
        self.progress = Progress::default();
        let result = step(&mut self.stack, &mut self.progress, 0, env, None).await;

        if let Err(e) = &result {
            if e.is_interrupt() {
                debug!("chain interrupted");
            } else {
                debug!(error = %e, "chain failed");
                env.set_error(e);
            }
        }
        result
    }

    /// Runs the chain with `next` as its continuation.
    ///
    /// The last middleware's `next.run` continues the enclosing chain, so
    /// these middleware wrap everything behind `next` and can stop it by not
    /// delegating. A failure behind `next` unwinds this chain as well. The
    /// error is not recorded in the environment; the enclosing warden does
    /// that.
    pub async fn run_then(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
        self.progress = Progress::default();
        step(&mut self.stack, &mut self.progress, 0, env, Some(Box::new(next))).await
    }

    /// Recovers every entered level not recovered yet, most recent first.
    ///
    /// Used when a completed chain must be undone because something after
    /// it failed.
    pub async fn recover(&mut self, env: &mut Environment) {
        let upper = self.progress.recovered_below.min(self.progress.entered);
        for level in (0..upper).rev() {
            recover_one(&mut self.stack[level], env, &"enclosing chain failed").await;
        }
        self.progress.recovered_below = 0;
    }
}

impl std::fmt::Debug for Warden {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stack.iter().map(|m| m.name()).collect();
        f.debug_struct("Warden")
            .field("stack", &names)
            .field("progress", &self.progress)
            .finish()
    }
}
