//! Hooks into existing builder stacks.
//!
//! Plugins rarely own a stack; they patch one. A [`Hook`] records edits and
//! [`Hook::apply`] replays them onto a builder:
//!
//! 1. prepends, each inserted at the front (the last prepend runs first)
//! 2. appends, pushed at the end
//! 3. `before` edits, each inserted before its anchor
//! 4. `after` edits, each inserted after its anchor
//!
//! `before`/`after` edits whose anchor is not in the builder are skipped.

use super::builder::{Builder, MiddlewareSpec};
use crate::error::Result;
use tracing::debug;

/// Recorded edits to a builder.
#[derive(Debug, Clone, Default)]
pub struct Hook {
    prepend: Vec<MiddlewareSpec>,
    append: Vec<MiddlewareSpec>,
    before: Vec<(String, MiddlewareSpec)>,
    after: Vec<(String, MiddlewareSpec)>,
}

impl Hook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `spec` before the middleware named `existing`.
    pub fn before(
        &mut self,
        existing: impl Into<String>,
        spec: impl Into<MiddlewareSpec>,
    ) -> &mut Self {
        self.before.push((existing.into(), spec.into()));
        self
    }

    /// Adds `spec` after the middleware named `existing`.
    pub fn after(&mut self, existing: impl Into<String>, spec: impl Into<MiddlewareSpec>) -> &mut Self {
        self.after.push((existing.into(), spec.into()));
        self
    }

    /// Adds `spec` at the beginning of the stack, ahead of earlier prepends.
    pub fn prepend(&mut self, spec: impl Into<MiddlewareSpec>) -> &mut Self {
        self.prepend.push(spec.into());
        self
    }

    /// Adds `spec` at the end of the stack.
    ///
    /// Middleware appended after a short-circuiting middleware never run.
    pub fn append(&mut self, spec: impl Into<MiddlewareSpec>) -> &mut Self {
        self.append.push(spec.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.prepend.is_empty()
            && self.append.is_empty()
            && self.before.is_empty()
            && self.after.is_empty()
    }

    /// Replays the recorded edits onto `builder`.
    pub fn apply(&self, builder: &mut Builder) -> Result<()> {
        for spec in &self.prepend {
            builder.insert(0usize, spec.clone())?;
        }

        for spec in &self.append {
            builder.push(spec.clone());
        }

        for (existing, spec) in &self.before {
            if builder.index(existing).is_none() {
                debug!(anchor = %existing, middleware = spec.name(), "before hook anchor missing, skipping");
                continue;
            }
            builder.insert_before(existing.as_str(), spec.clone())?;
        }

        for (existing, spec) in &self.after {
            if builder.index(existing).is_none() {
                debug!(anchor = %existing, middleware = spec.name(), "after hook anchor missing, skipping");
                continue;
            }
            builder.insert_after(existing.as_str(), spec.clone())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> MiddlewareSpec {
        MiddlewareSpec::inline(name, |_| Ok(()))
    }

    #[test]
    fn test_apply_order() {
        let mut builder = Builder::new();
        builder.push(noop("a")).push(noop("b"));

        let mut hook = Hook::new();
        hook.prepend(noop("p1"))
            .prepend(noop("p2"))
            .append(noop("z"))
            .before("b", noop("before_b"))
            .after("a", noop("after_a"))
            .after("missing", noop("never"));
        hook.apply(&mut builder).unwrap();

        assert_eq!(
            builder.flatten(None).unwrap(),
            vec!["p2", "p1", "a", "after_a", "before_b", "b", "z"]
        );
    }

    #[test]
    fn test_empty_hook() {
        let mut hook = Hook::new();
        assert!(hook.is_empty());
        hook.append(noop("x"));
        assert!(!hook.is_empty());
    }
}
