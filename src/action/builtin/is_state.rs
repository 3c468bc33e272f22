use crate::action::middleware::{factory, Middleware, MiddlewareFactory, Next};
use crate::constants::RESULT_KEY;
use crate::driver::MachineState;
use crate::environment::Environment;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Stores whether the machine is in a given state under `result`.
///
/// Arguments: the state name, and optionally `{"invert": true}`.
#[derive(Debug, Clone)]
pub struct IsState {
    state: MachineState,
    invert: bool,
}

impl IsState {
    pub const NAME: &'static str = "is_state";

    pub fn new(state: MachineState, invert: bool) -> Self {
        Self { state, invert }
    }

    pub fn factory() -> Arc<dyn MiddlewareFactory> {
        factory(Self::NAME, |_, args| {
            let invalid = |reason: &str| Error::InvalidMiddleware {
                spec: Self::NAME.to_string(),
                reason: reason.to_string(),
            };

            let state = match args.first() {
                Some(Value::String(state)) => MachineState::from_driver_str(state),
                _ => return Err(invalid("first argument must be a state name")),
            };
            let invert = match args.get(1) {
                None => false,
                Some(Value::Object(opts)) => opts
                    .get("invert")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                Some(_) => return Err(invalid("second argument must be an options object")),
            };

            Ok(Box::new(IsState::new(state, invert)) as Box<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for IsState {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
        let current = env.require_machine()?.state().await?;
        let matches = (current == self.state) != self.invert;

        debug!(
            expected = %self.state,
            current = %current,
            invert = self.invert,
            result = matches,
            "checked machine state"
        );
        env.insert(RESULT_KEY, matches);
        next.run(env).await
    }
}
