//! Synced folder implementations and their capabilities.
//!
//! Each synced folder implementation (`nfs`, `rsync`, `virtualbox`, ...) is
//! registered with a priority and a usability predicate. When a folder does
//! not name its implementation, [`SyncedFolderRegistry::default_type`] picks
//! the highest-priority implementation usable for the machine.
//!
//! A [`SyncedFolder`] is a capability host forced to a single implementation,
//! so capability lookup never falls back to another folder type.

use super::{CapabilityHost, CapabilityRegistry, HostCandidates};
use crate::error::{Error, Result};
use crate::machine::Machine;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::debug;

const KIND: &str = "synced folder";

type UsableFn = dyn Fn(&Machine) -> bool + Send + Sync;

struct Registered {
    name: String,
    priority: i32,
    usable: Arc<UsableFn>,
}

/// Registry of synced folder implementations.
pub struct SyncedFolderRegistry {
    implementations: Vec<Registered>,
    capabilities: Arc<CapabilityRegistry<Machine>>,
}

impl SyncedFolderRegistry {
    /// Creates a registry dispatching capabilities through `capabilities`.
    pub fn new(capabilities: Arc<CapabilityRegistry<Machine>>) -> Self {
        Self {
            implementations: Vec::new(),
            capabilities,
        }
    }

    /// Registers an implementation. Re-registering a name replaces it.
    pub fn register<F>(&mut self, name: impl Into<String>, priority: i32, usable: F)
    where
        F: Fn(&Machine) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        self.implementations.retain(|r| r.name != name);
        self.implementations.push(Registered {
            name,
            priority,
            usable: Arc::new(usable),
        });
    }

    /// Highest-priority implementation usable for `machine`.
    ///
    /// Ties keep registration order.
    pub fn default_type(&self, machine: &Machine) -> Option<&str> {
        let mut ordered: Vec<&Registered> = self.implementations.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        ordered.into_iter().find_map(|r| {
            let usable = (r.usable)(machine);
            debug!(implementation = %r.name, priority = r.priority, usable, "synced folder candidate");
            usable.then_some(r.name.as_str())
        })
    }

    /// Returns the capability host for implementation `name`.
    pub fn folder(&self, name: &str, machine: &Arc<Machine>) -> Result<SyncedFolder> {
        let Some(registered) = self.implementations.iter().find(|r| r.name == name) else {
            return Err(Error::CapabilityHostExplicitNotDetected {
                value: name.to_string(),
            });
        };

        let mut candidates = HostCandidates::new();
        let usable = Arc::clone(&registered.usable);
        candidates.register(name, None, move |m: &Machine| usable(m));

        let host = CapabilityHost::detect(
            KIND,
            &candidates,
            Arc::clone(&self.capabilities),
            Some(name),
            machine.as_ref(),
        )?;

        Ok(SyncedFolder {
            machine: Arc::downgrade(machine),
            host,
        })
    }
}

/// Capability host bound to one synced folder implementation.
pub struct SyncedFolder {
    machine: Weak<Machine>,
    host: CapabilityHost<Machine>,
}

impl SyncedFolder {
    /// Implementation name.
    pub fn name(&self) -> &str {
        self.host.name()
    }

    /// Returns true if the implementation provides `cap`.
    pub fn has_capability(&self, cap: &str) -> bool {
        self.host.has_capability(cap)
    }

    /// Executes `cap` with the machine as the first argument.
    pub fn capability(&self, cap: &str, args: &[Value]) -> Result<Value> {
        let machine = self
            .machine
            .upgrade()
            .ok_or_else(|| Error::Internal("synced folder outlived its machine".to_string()))?;
        self.host.capability(cap, &machine, args)
    }
}
