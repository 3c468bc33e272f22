//! Guest OS capability host.
//!
//! A [`Guest`] belongs to one [`Machine`] and dispatches guest capabilities
//! (`change_host_name`, `configure_networks`, `mount_nfs_folder`, ...). The
//! owning machine is passed as the implicit first argument of every
//! detector and capability call.
//!
//! Detection happens lazily on first dispatch, honouring the machine's
//! explicit guest override if it has one.

use super::{CapabilityHost, CapabilityRegistry, DetectionSlot, HostCandidates};
use crate::error::{Error, Result};
use crate::machine::Machine;
use serde_json::Value;
use std::sync::{Arc, Weak};

const KIND: &str = "guest";

/// Capability host for a machine's guest OS.
pub struct Guest {
    machine: Weak<Machine>,
    candidates: Arc<HostCandidates<Machine>>,
    capabilities: Arc<CapabilityRegistry<Machine>>,
    slot: DetectionSlot<Machine>,
}

impl Guest {
    pub(crate) fn new(
        machine: Weak<Machine>,
        candidates: Arc<HostCandidates<Machine>>,
        capabilities: Arc<CapabilityRegistry<Machine>>,
    ) -> Self {
        Self {
            machine,
            candidates,
            capabilities,
            slot: DetectionSlot::new(),
        }
    }

    fn machine(&self) -> Result<Arc<Machine>> {
        self.machine
            .upgrade()
            .ok_or_else(|| Error::Internal("guest outlived its machine".to_string()))
    }

    fn ready(&self, machine: &Machine) -> Result<Arc<CapabilityHost<Machine>>> {
        self.slot.get_or_detect(|| {
            CapabilityHost::detect(
                KIND,
                &self.candidates,
                Arc::clone(&self.capabilities),
                machine.guest_override(),
                machine,
            )
        })
    }

    /// Detects the guest OS (no-op once detected) and returns its name.
    pub fn detect(&self) -> Result<String> {
        let machine = self.machine()?;
        Ok(self.ready(&machine)?.name().to_string())
    }

    /// Returns true once detection has completed.
    pub fn is_detected(&self) -> bool {
        matches!(self.slot.get(), Ok(Some(_)))
    }

    /// Forgets the detected chain so the next access detects again.
    pub fn reset(&self) -> Result<()> {
        self.slot.reset()
    }

    /// Detected chain, most specific first. Empty before detection.
    pub fn chain_names(&self) -> Result<Vec<String>> {
        Ok(self
            .slot
            .get()?
            .map(|host| host.chain_names().into_iter().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Returns true if the guest chain provides `cap`.
    pub fn has_capability(&self, cap: &str) -> Result<bool> {
        let machine = self.machine()?;
        Ok(self.ready(&machine)?.has_capability(cap))
    }

    /// Executes `cap` with the machine as the first argument.
    pub fn capability(&self, cap: &str, args: &[Value]) -> Result<Value> {
        let machine = self.machine()?;
        self.ready(&machine)?.capability(cap, &machine, args)
    }
}
