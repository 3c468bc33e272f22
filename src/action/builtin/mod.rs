//! Builtin middleware.
//!
//! | Middleware | Effect |
//! |------------|--------|
//! | [`EnvSet`] | writes fixed values into the environment |
//! | [`InitLogging`] | installs the tracing subscriber (default before-run stack) |
//! | [`IsState`] | stores whether the machine is in a given state under `result` |
//! | [`Call`] | runs a condition stack, then a stack chosen from its outcome |

mod call;
mod env_set;
mod is_state;

pub use call::Call;
pub use env_set::EnvSet;
pub use is_state::IsState;

use super::middleware::{factory, Middleware, MiddlewareFactory, Next};
use crate::environment::Environment;
use crate::error::Result;
use crate::logging;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Installs the global tracing subscriber, then continues.
#[derive(Debug, Default)]
pub struct InitLogging;

impl InitLogging {
    pub const NAME: &'static str = "init_logging";

    pub fn factory() -> Arc<dyn MiddlewareFactory> {
        factory(Self::NAME, |_, _| Ok(Box::new(InitLogging) as Box<dyn Middleware>))
    }
}

#[async_trait]
impl Middleware for InitLogging {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
        if logging::try_init() {
            debug!("logging initialized");
        }
        next.run(env).await
    }
}
