//! Middleware contract.
//!
//! A middleware wraps the remainder of the chain. It receives the shared
//! [`Environment`] and a [`Next`] handle; code before `next.run(env)` runs on
//! the way in, code after it runs on the way out. Not calling `next` at all
//! short-circuits the rest of the chain.
//!
//! ```rust,ignore
//! struct Halve;
//!
//! #[async_trait]
//! impl Middleware for Halve {
//!     async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
//!         *env.get_mut::<u32>("timeout").unwrap() /= 2;
//!         next.run(env).await?;
//!         *env.get_mut::<u32>("timeout").unwrap() *= 2;
//!         Ok(())
//!     }
//! }
//! ```
//!
//! Middleware are constructed fresh for every run by a [`MiddlewareFactory`],
//! so state kept in `self` lives exactly as long as one run.

use super::warden::{self, Progress};
use crate::environment::Environment;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One step of an action chain.
#[async_trait]
pub trait Middleware: Send {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Runs this step. Call `next.run(env)` to continue the chain.
    async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()>;

    /// Undoes the work of [`Middleware::call`] after a failure further down
    /// the chain (or after an interrupt).
    ///
    /// Called at most once, only if `call` was entered, and not when `call`
    /// itself produced the error. Errors are logged and never replace the
    /// failure being unwound.
    async fn recover(&mut self, env: &mut Environment) -> Result<()> {
        let _ = env;
        Ok(())
    }
}

/// The remainder of the chain after the current middleware.
///
/// Consumed by [`Next::run`], so the remainder runs at most once. A nested
/// chain started with [`Warden::run_then`](super::Warden::run_then) carries
/// the enclosing chain's `Next` as its tail, which runs after the last
/// nested middleware.
pub struct Next<'a> {
    stack: &'a mut [Box<dyn Middleware>],
    progress: &'a mut Progress,
    depth: usize,
    tail: Option<Box<Next<'a>>>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        stack: &'a mut [Box<dyn Middleware>],
        progress: &'a mut Progress,
        depth: usize,
        tail: Option<Box<Next<'a>>>,
    ) -> Self {
        Self {
            stack,
            progress,
            depth,
            tail,
        }
    }

    /// Number of middleware left in the chain, including any tail.
    pub fn remaining(&self) -> usize {
        self.stack.len() + self.tail.as_ref().map_or(0, |tail| tail.remaining())
    }

    /// Runs the remainder of the chain.
    pub async fn run(self, env: &mut Environment) -> Result<()> {
        warden::step(self.stack, self.progress, self.depth, env, self.tail).await
    }
}

// =============================================================================
// Factories
// =============================================================================

/// Constructs a fresh middleware instance for every run.
pub trait MiddlewareFactory: Send + Sync {
    /// Name used to locate this middleware in a builder.
    fn name(&self) -> &str;

    /// Builds an instance from the environment and the builder arguments.
    fn construct(&self, env: &Environment, args: &[Value]) -> Result<Box<dyn Middleware>>;
}

type ConstructFn = dyn Fn(&Environment, &[Value]) -> Result<Box<dyn Middleware>> + Send + Sync;

struct FnFactory {
    name: String,
    construct: Box<ConstructFn>,
}

impl MiddlewareFactory for FnFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn construct(&self, env: &Environment, args: &[Value]) -> Result<Box<dyn Middleware>> {
        (self.construct)(env, args)
    }
}

/// Wraps a constructor closure into a named factory.
pub fn factory<F>(name: impl Into<String>, construct: F) -> Arc<dyn MiddlewareFactory>
where
    F: Fn(&Environment, &[Value]) -> Result<Box<dyn Middleware>> + Send + Sync + 'static,
{
    Arc::new(FnFactory {
        name: name.into(),
        construct: Box::new(construct),
    })
}

// =============================================================================
// Inline Callables
// =============================================================================

/// Plain function used as a middleware step.
pub type InlineFn = Arc<dyn Fn(&mut Environment) -> Result<()> + Send + Sync>;

/// Runs an inline function, then continues the chain.
pub(crate) struct InlineMiddleware {
    name: String,
    func: InlineFn,
}

impl InlineMiddleware {
    pub(crate) fn new(name: String, func: InlineFn) -> Self {
        Self { name, func }
    }
}

#[async_trait]
impl Middleware for InlineMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
        (self.func)(env)?;
        next.run(env).await
    }
}
