//! # Action Builder
//!
//! An ordered, editable list of middleware specifications that is turned
//! into a fresh chain for every run.
//!
//! ## Specifications
//!
//! | Variant | Resolved by |
//! |---------|-------------|
//! | [`MiddlewareSpec::Factory`] | `factory.construct(env, args)` |
//! | [`MiddlewareSpec::Inline`] | wrapped so the function runs, then the chain continues |
//! | [`MiddlewareSpec::Named`] | the registered builder with that name, spliced in place |
//! | [`MiddlewareSpec::Builder`] | the nested builder, spliced in place |
//!
//! Nested builders and named references are flattened into the parent stack,
//! so their middleware wrap the remainder of the parent chain exactly as if
//! they had been listed inline.
//!
//! ## Editing
//!
//! ```text
//! [a, b, c]  insert_before("b", x)  →  [a, x, b, c]
//! [a, b, c]  insert_after("b", x)   →  [a, b, x, c]
//! [a, b, c]  replace("b", x)        →  [a, x, c]
//! [a, b, c]  delete(0)              →  [b, c]
//! ```
//!
//! Positions are indices or names; a name matches the first specification
//! whose [`MiddlewareSpec::name`] is equal.

use super::middleware::{InlineFn, InlineMiddleware, Middleware, MiddlewareFactory};
use crate::constants::MAX_BUILDER_DEPTH;
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::registry::Registry;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Middleware Specification
// =============================================================================

/// One entry of a builder.
#[derive(Clone)]
pub enum MiddlewareSpec {
    /// A middleware built by a factory with per-entry arguments.
    Factory {
        factory: Arc<dyn MiddlewareFactory>,
        args: Vec<Value>,
    },
    /// A plain function step.
    Inline { name: String, func: InlineFn },
    /// A reference to a builder registered under this name.
    Named(String),
    /// A nested builder.
    Builder(Builder),
}

impl MiddlewareSpec {
    pub fn factory(factory: Arc<dyn MiddlewareFactory>, args: Vec<Value>) -> Self {
        Self::Factory { factory, args }
    }

    pub fn inline<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Environment) -> Result<()> + Send + Sync + 'static,
    {
        Self::Inline {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Name used for positional lookups and error messages.
    pub fn name(&self) -> &str {
        match self {
            Self::Factory { factory, .. } => factory.name(),
            Self::Inline { name, .. } => name.as_str(),
            Self::Named(name) => name.as_str(),
            Self::Builder(builder) => builder.name().unwrap_or("<builder>"),
        }
    }
}

impl std::fmt::Debug for MiddlewareSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factory { factory, args } => f
                .debug_struct("Factory")
                .field("name", &factory.name())
                .field("args", args)
                .finish(),
            Self::Inline { name, .. } => f.debug_struct("Inline").field("name", name).finish(),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Builder(builder) => f.debug_tuple("Builder").field(builder).finish(),
        }
    }
}

impl From<Arc<dyn MiddlewareFactory>> for MiddlewareSpec {
    fn from(factory: Arc<dyn MiddlewareFactory>) -> Self {
        Self::factory(factory, Vec::new())
    }
}

impl From<Builder> for MiddlewareSpec {
    fn from(builder: Builder) -> Self {
        Self::Builder(builder)
    }
}

/// A location in a builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    Index(usize),
    Name(String),
}

impl From<usize> for Position {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Position {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Position {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "index {i}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// A flattened entry ready to be constructed.
enum Resolved {
    Factory(Arc<dyn MiddlewareFactory>, Vec<Value>),
    Inline(String, InlineFn),
}

// =============================================================================
// Builder
// =============================================================================

/// Editable list of middleware specifications.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    name: Option<String>,
    stack: Vec<MiddlewareSpec>,
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty builder with a name used in logs and lookups.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            stack: Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn specs(&self) -> &[MiddlewareSpec] {
        &self.stack
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    // =========================================================================
    // Appending
    // =========================================================================

    /// Appends a specification.
    pub fn push(&mut self, spec: impl Into<MiddlewareSpec>) -> &mut Self {
        self.stack.push(spec.into());
        self
    }

    /// Appends a factory-built middleware with arguments.
    pub fn use_middleware(
        &mut self,
        factory: Arc<dyn MiddlewareFactory>,
        args: Vec<Value>,
    ) -> &mut Self {
        self.push(MiddlewareSpec::factory(factory, args))
    }

    /// Appends a function that runs before the rest of the chain.
    pub fn use_fn<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&mut Environment) -> Result<()> + Send + Sync + 'static,
    {
        self.push(MiddlewareSpec::inline(name, func))
    }

    /// Appends a reference to a registered builder.
    pub fn use_named(&mut self, name: impl Into<String>) -> &mut Self {
        self.push(MiddlewareSpec::named(name))
    }

    /// Appends a nested builder.
    pub fn use_builder(&mut self, builder: Builder) -> &mut Self {
        self.push(MiddlewareSpec::Builder(builder))
    }

    // =========================================================================
    // Editing
    // =========================================================================

    /// Index of the first specification named `name`.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.stack.iter().position(|spec| spec.name() == name)
    }

    fn resolve(&self, position: &Position, allow_end: bool) -> Result<usize> {
        let index = match position {
            Position::Index(i) => Some(*i),
            Position::Name(name) => self.index(name),
        };
        let len = self.stack.len();
        match index {
            Some(i) if i < len || (allow_end && i == len) => Ok(i),
            _ => Err(Error::InvalidMiddleware {
                spec: position.to_string(),
                reason: format!(
                    "no such position in {} (length {len})",
                    self.name().unwrap_or("builder")
                ),
            }),
        }
    }

    /// Inserts `spec` at `position`. An index equal to the length appends.
    pub fn insert(
        &mut self,
        position: impl Into<Position>,
        spec: impl Into<MiddlewareSpec>,
    ) -> Result<&mut Self> {
        let index = self.resolve(&position.into(), true)?;
        self.stack.insert(index, spec.into());
        Ok(self)
    }

    /// Inserts `spec` immediately before `existing`.
    pub fn insert_before(
        &mut self,
        existing: impl Into<Position>,
        spec: impl Into<MiddlewareSpec>,
    ) -> Result<&mut Self> {
        self.insert(existing, spec)
    }

    /// Inserts `spec` immediately after `existing`.
    pub fn insert_after(
        &mut self,
        existing: impl Into<Position>,
        spec: impl Into<MiddlewareSpec>,
    ) -> Result<&mut Self> {
        let index = self.resolve(&existing.into(), false)?;
        self.stack.insert(index + 1, spec.into());
        Ok(self)
    }

    /// Replaces the specification at `position`.
    pub fn replace(
        &mut self,
        position: impl Into<Position>,
        spec: impl Into<MiddlewareSpec>,
    ) -> Result<&mut Self> {
        let index = self.resolve(&position.into(), false)?;
        self.stack[index] = spec.into();
        Ok(self)
    }

    /// Removes the specification at `position`.
    pub fn delete(&mut self, position: impl Into<Position>) -> Result<MiddlewareSpec> {
        let index = self.resolve(&position.into(), false)?;
        Ok(self.stack.remove(index))
    }

    // =========================================================================
    // Building
    // =========================================================================

    /// Names of the flattened stack, in execution order.
    pub fn flatten(&self, registry: Option<&Registry<Builder>>) -> Result<Vec<String>> {
        let mut resolved = Vec::new();
        self.flatten_into(registry, 0, &mut resolved)?;
        Ok(resolved
            .into_iter()
            .map(|entry| match entry {
                Resolved::Factory(factory, _) => factory.name().to_string(),
                Resolved::Inline(name, _) => name,
            })
            .collect())
    }

    fn flatten_into(
        &self,
        registry: Option<&Registry<Builder>>,
        depth: usize,
        out: &mut Vec<Resolved>,
    ) -> Result<()> {
        if depth > MAX_BUILDER_DEPTH {
            return Err(Error::InvalidMiddleware {
                spec: self.name().unwrap_or("<builder>").to_string(),
                reason: format!(
                    "builders nest deeper than {MAX_BUILDER_DEPTH} levels (recursive reference?)"
                ),
            });
        }

        for spec in &self.stack {
            match spec {
                MiddlewareSpec::Factory { factory, args } => {
                    out.push(Resolved::Factory(Arc::clone(factory), args.clone()));
                }
                MiddlewareSpec::Inline { name, func } => {
                    out.push(Resolved::Inline(name.clone(), Arc::clone(func)));
                }
                MiddlewareSpec::Builder(nested) => {
                    nested.flatten_into(registry, depth + 1, out)?;
                }
                MiddlewareSpec::Named(name) => {
                    let Some(registry) = registry else {
                        return Err(Error::InvalidMiddleware {
                            spec: name.clone(),
                            reason: "no action registry to resolve the name".to_string(),
                        });
                    };
                    let Some(nested) = registry.get(name) else {
                        return Err(Error::InvalidMiddleware {
                            spec: name.clone(),
                            reason: "not a registered action".to_string(),
                        });
                    };
                    nested.flatten_into(Some(registry), depth + 1, out)?;
                }
            }
        }
        Ok(())
    }

    /// Constructs a fresh middleware instance for every entry.
    pub fn build(
        &self,
        env: &Environment,
        registry: Option<&Registry<Builder>>,
    ) -> Result<Vec<Box<dyn Middleware>>> {
        let mut resolved = Vec::new();
        self.flatten_into(registry, 0, &mut resolved)?;

        let stack = resolved
            .into_iter()
            .map(|entry| match entry {
                Resolved::Factory(factory, args) => factory.construct(env, &args),
                Resolved::Inline(name, func) => {
                    Ok(Box::new(InlineMiddleware::new(name, func)) as Box<dyn Middleware>)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            builder = self.name().unwrap_or("<builder>"),
            middleware = stack.len(),
            "built middleware stack"
        );
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> MiddlewareSpec {
        MiddlewareSpec::inline(name, |_| Ok(()))
    }

    fn names(builder: &Builder) -> Vec<String> {
        builder.flatten(None).unwrap()
    }

    #[test]
    fn test_insert_and_replace_by_name() {
        let mut builder = Builder::new();
        builder.push(noop("a")).push(noop("b")).push(noop("c"));

        builder.insert_before("b", noop("x")).unwrap();
        builder.insert_after("b", noop("y")).unwrap();
        builder.replace("c", noop("z")).unwrap();
        assert_eq!(names(&builder), vec!["a", "x", "b", "y", "z"]);

        builder.delete(0usize).unwrap();
        assert_eq!(builder.index("b"), Some(1));
    }

    #[test]
    fn test_insert_at_len_appends() {
        let mut builder = Builder::new();
        builder.insert(0usize, noop("a")).unwrap();
        builder.insert(1usize, noop("b")).unwrap();
        assert_eq!(names(&builder), vec!["a", "b"]);
        assert!(builder.insert(5usize, noop("c")).is_err());
    }

    #[test]
    fn test_unknown_position_names_it() {
        let mut builder = Builder::new();
        builder.push(noop("a"));
        let err = builder.insert_after("missing", noop("x")).unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(builder.delete(1usize).is_err());
    }

    #[test]
    fn test_nested_builders_flatten_in_place() {
        let mut inner = Builder::named("inner");
        inner.push(noop("b")).push(noop("c"));

        let mut outer = Builder::new();
        outer.push(noop("a")).use_builder(inner).push(noop("d"));
        assert_eq!(names(&outer), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_named_without_registry_is_invalid() {
        let mut builder = Builder::new();
        builder.use_named("up");
        assert!(matches!(
            builder.flatten(None),
            Err(Error::InvalidMiddleware { .. })
        ));
    }
}
