use crate::action::middleware::{factory, Middleware, MiddlewareFactory, Next};
use crate::environment::Environment;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Writes a fixed set of values into the environment, then continues.
///
/// Takes one argument, a JSON object. Every member is stored as a
/// [`serde_json::Value`] under its key.
#[derive(Debug, Clone)]
pub struct EnvSet {
    values: Map<String, Value>,
}

impl EnvSet {
    pub const NAME: &'static str = "env_set";

    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn factory() -> Arc<dyn MiddlewareFactory> {
        factory(Self::NAME, |_, args| {
            let values = match args {
                [Value::Object(values)] => values.clone(),
                _ => {
                    return Err(Error::InvalidMiddleware {
                        spec: Self::NAME.to_string(),
                        reason: "expects a single JSON object argument".to_string(),
                    });
                }
            };
            Ok(Box::new(EnvSet::new(values)) as Box<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for EnvSet {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
        for (key, value) in &self.values {
            env.insert(key.clone(), value.clone());
        }
        next.run(env).await
    }
}
