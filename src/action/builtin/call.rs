use crate::action::builder::Builder;
use crate::action::middleware::{factory, Middleware, MiddlewareFactory, Next};
use crate::action::warden::Warden;
use crate::environment::Environment;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

type BranchFn = Arc<dyn Fn(&Environment, &mut Builder) + Send + Sync>;

/// Runs a condition stack, then a stack chosen from its outcome.
///
/// ```text
/// Call(condition, branch)
///   1. run `condition` on the shared environment
///   2. branch(env, &mut builder)       e.g. inspect env["result"]
///   3. run `builder`; its last `next` continues the outer chain
/// ```
///
/// Branch middleware wrap the rest of the outer chain: code after their
/// `next.run` runs once the outer remainder returns, and a branch middleware
/// that does not delegate stops the outer chain there. Unwinding covers the
/// combined chain, recovering the branch and then the condition.
pub struct Call {
    condition: Builder,
    branch: BranchFn,
    condition_warden: Option<Warden>,
    branch_warden: Option<Warden>,
}

impl Call {
    pub const NAME: &'static str = "call";

    pub fn new<F>(condition: Builder, branch: F) -> Self
    where
        F: Fn(&Environment, &mut Builder) + Send + Sync + 'static,
    {
        Self::with_branch(condition, Arc::new(branch))
    }

    fn with_branch(condition: Builder, branch: BranchFn) -> Self {
        Self {
            condition,
            branch,
            condition_warden: None,
            branch_warden: None,
        }
    }

    pub fn factory<F>(condition: Builder, branch: F) -> Arc<dyn MiddlewareFactory>
    where
        F: Fn(&Environment, &mut Builder) + Send + Sync + 'static,
    {
        let branch: BranchFn = Arc::new(branch);
        factory(Self::NAME, move |_, _| {
            Ok(Box::new(Call::with_branch(condition.clone(), Arc::clone(&branch)))
                as Box<dyn Middleware>)
        })
    }
}

#[async_trait]
impl Middleware for Call {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn call(&mut self, env: &mut Environment, next: Next<'_>) -> Result<()> {
        let registry = env.action_registry().cloned();

        let condition = self.condition.build(env, registry.as_deref())?;
        let warden = self.condition_warden.insert(Warden::new(condition));
        debug!(middleware = warden.len(), "running call condition");
        warden.run(env).await?;

        let mut builder = Builder::new();
        (self.branch)(env, &mut builder);

        let branch = builder.build(env, registry.as_deref())?;
        let warden = self.branch_warden.insert(Warden::new(branch));
        debug!(middleware = warden.len(), remaining = next.remaining(), "running call branch");
        let result = warden.run_then(env, next).await;

        // The branch has unwound itself. A later `recover` skips what is
        // undone here.
        if result.is_err() {
            if let Some(warden) = self.condition_warden.as_mut() {
                warden.recover(env).await;
            }
        }
        result
    }

    async fn recover(&mut self, env: &mut Environment) -> Result<()> {
        if let Some(warden) = self.branch_warden.as_mut() {
            warden.recover(env).await;
        }
        if let Some(warden) = self.condition_warden.as_mut() {
            warden.recover(env).await;
        }
        Ok(())
    }
}
