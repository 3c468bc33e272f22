//! Machine handle threaded through the action environment.
//!
//! A [`Machine`] bundles what the pipeline needs to act on one VM: its name,
//! the provider descriptor, the driver-level identifier read from the machine
//! index before the run, the [`Driver`] handle and the guest capability host.
//!
//! The driver-level id is opaque to the pipeline. Middleware that create or
//! destroy the VM update it through [`Machine::set_id`].

use crate::capability::{CapabilityRegistry, Guest, HostCandidates};
use crate::constants::MACHINE_LOCK_PREFIX;
use crate::driver::{Driver, MachineState};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, RwLock};

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Provider name (e.g., "virtualbox").
    pub name: String,
    /// Whether actions for several machines of this provider may run concurrently.
    #[serde(default)]
    pub parallel: bool,
}

impl Provider {
    pub fn new(name: impl Into<String>, parallel: bool) -> Self {
        Self {
            name: name.into(),
            parallel,
        }
    }
}

/// A VM acted on by the pipeline.
pub struct Machine {
    name: String,
    provider: Provider,
    id: RwLock<Option<String>>,
    index_uuid: Option<String>,
    guest_override: Option<String>,
    driver: Arc<dyn Driver>,
    guest: OnceLock<Arc<Guest>>,
}

impl Machine {
    /// Creates a machine with no driver-level id.
    pub fn new(name: impl Into<String>, provider: Provider, driver: Arc<dyn Driver>) -> Self {
        Self {
            name: name.into(),
            provider,
            id: RwLock::new(None),
            index_uuid: None,
            guest_override: None,
            driver,
            guest: OnceLock::new(),
        }
    }

    /// Sets the driver-level id read from the machine's dotfile.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = RwLock::new(Some(id.into()));
        self
    }

    /// Sets the machine index entry id.
    #[must_use]
    pub fn with_index_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.index_uuid = Some(uuid.into());
        self
    }

    /// Forces the guest OS instead of autodetecting it.
    #[must_use]
    pub fn with_guest_override(mut self, guest: impl Into<String>) -> Self {
        self.guest_override = Some(guest.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub fn index_uuid(&self) -> Option<&str> {
        self.index_uuid.as_deref()
    }

    /// Explicit guest OS name, if configured.
    pub fn guest_override(&self) -> Option<&str> {
        self.guest_override.as_deref()
    }

    /// Current driver-level id.
    pub fn id(&self) -> Result<Option<String>> {
        let guard = self
            .id
            .read()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        Ok(guard.clone())
    }

    /// Replaces the driver-level id (`None` once the VM is destroyed).
    pub fn set_id(&self, id: Option<String>) -> Result<()> {
        let mut guard = self
            .id
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        *guard = id;
        Ok(())
    }

    /// Name of the lock guarding actions on this machine.
    pub fn lock_name(&self) -> String {
        let key = self.index_uuid.as_deref().unwrap_or(&self.name);
        format!("{MACHINE_LOCK_PREFIX}{key}")
    }

    /// Reads the VM state through the driver.
    pub async fn state(&self) -> Result<MachineState> {
        let id = self.id()?;
        self.driver.read_state(id.as_deref()).await
    }

    /// Attaches the guest capability host. Later calls return the first one.
    pub fn attach_guest(
        self: &Arc<Self>,
        candidates: Arc<HostCandidates<Machine>>,
        capabilities: Arc<CapabilityRegistry<Machine>>,
    ) -> Arc<Guest> {
        let guest = self
            .guest
            .get_or_init(|| Arc::new(Guest::new(Arc::downgrade(self), candidates, capabilities)));
        Arc::clone(guest)
    }

    /// The guest capability host.
    pub fn guest(&self) -> Result<Arc<Guest>> {
        self.guest
            .get()
            .cloned()
            .ok_or(Error::CapabilityHostNotInitialized)
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("provider", &self.provider.name)
            .field("driver", &self.driver.name())
            .field("index_uuid", &self.index_uuid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticDriver;

    #[async_trait]
    impl Driver for StaticDriver {
        fn name(&self) -> &str {
            "static"
        }

        async fn read_state(&self, id: Option<&str>) -> Result<MachineState> {
            Ok(match id {
                Some(_) => MachineState::Running,
                None => MachineState::NotCreated,
            })
        }
    }

    fn machine() -> Machine {
        Machine::new("default", Provider::new("static", false), Arc::new(StaticDriver))
    }

    #[test]
    fn test_lock_name_prefers_index_uuid() {
        assert_eq!(machine().lock_name(), "machine-action-default");
        assert_eq!(
            machine().with_index_uuid("abc123").lock_name(),
            "machine-action-abc123"
        );
    }

    #[tokio::test]
    async fn test_state_follows_id() {
        let m = machine();
        assert_eq!(m.state().await.unwrap(), MachineState::NotCreated);
        m.set_id(Some("vm-1".to_string())).unwrap();
        assert_eq!(m.state().await.unwrap(), MachineState::Running);
    }

    #[test]
    fn test_guest_requires_attach() {
        let m = Arc::new(machine());
        assert!(matches!(m.guest(), Err(Error::CapabilityHostNotInitialized)));

        let first = m.attach_guest(
            Arc::new(HostCandidates::new()),
            Arc::new(CapabilityRegistry::new()),
        );
        let second = m.attach_guest(
            Arc::new(HostCandidates::new()),
            Arc::new(CapabilityRegistry::new()),
        );
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &m.guest().unwrap()));
    }
}
