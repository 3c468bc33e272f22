//! # Lazy Registry
//!
//! A name → factory store whose values are evaluated on first access and
//! memoized for the lifetime of the registry.
//!
//! ## Evaluation Model
//!
//! ```text
//! register("up", || build_up_stack())     (nothing evaluated)
//!        │
//!        ▼
//! get("up")  ──▶ factory runs once ──▶ cached value
//! get("up")  ──────────────────────────▶ cached value
//! ```
//!
//! Factories may have arbitrary side effects (building a middleware stack,
//! probing the host). The cache guarantees each factory runs at most once
//! per registered key, even when `get` races across threads.
//!
//! Registering an existing key replaces both the factory and any cached
//! value (last write wins). Iteration follows registration order.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vmrig::Registry;
//!
//! let mut registry = Registry::new();
//! registry.register("answer", || 42);
//! assert_eq!(registry.get("answer"), Some(&42));
//! assert_eq!(registry.get("missing"), None);
//! ```

use std::collections::HashMap;
use std::sync::OnceLock;

type Factory<V> = Box<dyn Fn() -> V + Send + Sync>;

struct Entry<V> {
    factory: Factory<V>,
    value: OnceLock<V>,
}

impl<V> Entry<V> {
    fn force(&self) -> &V {
        self.value.get_or_init(|| (self.factory)())
    }
}

/// Registry of lazily evaluated, memoized values keyed by name.
pub struct Registry<V> {
    keys: Vec<String>,
    entries: HashMap<String, Entry<V>>,
}

impl<V> Registry<V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Registers a factory under `key`, replacing any previous registration.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> V + Send + Sync + 'static,
    {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.entries.insert(
            key,
            Entry {
                factory: Box::new(factory),
                value: OnceLock::new(),
            },
        );
    }

    /// Returns the memoized value for `key`, evaluating it on first access.
    ///
    /// Unknown keys return `None`.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key).map(Entry::force)
    }

    /// Returns true if `key` is registered (without evaluating it).
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Iterates all entries in registration order, forcing each value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.keys
            .iter()
            .filter_map(|k| self.entries.get(k).map(|e| (k.as_str(), e.force())))
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<V: Clone> Registry<V> {
    /// Forces every value and returns an owned map.
    pub fn to_map(&self) -> HashMap<String, V> {
        self.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("keys", &self.keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_keeps_registration_order() {
        let mut registry = Registry::new();
        registry.register("a", || 1);
        registry.register("b", || 2);
        registry.register("a", || 3);

        let keys: Vec<_> = registry.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(registry.get("a"), Some(&3));
    }

    #[test]
    fn test_contains_key_does_not_force() {
        let mut registry: Registry<u32> = Registry::new();
        registry.register("boom", || panic!("must not be evaluated"));
        assert!(registry.contains_key("boom"));
        assert_eq!(registry.len(), 1);
    }
}
