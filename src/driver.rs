//! VM driver interface.
//!
//! The driver is the opaque handle through which middleware talk to the
//! hypervisor. The pipeline never inspects how a driver is implemented; it
//! only relies on the operation set and data shapes defined here.
//!
//! # Lifecycle
//!
//! ```text
//! import(ovf) → enable_adapters(..) → forward_ports(..) → start(mode)
//!      → read_state() ... → halt(force) → export(path)
//! ```
//!
//! Every operation except [`Driver::name`] and [`Driver::read_state`] has a
//! default body returning [`Error::NotSupported`], so partial drivers (and
//! test doubles) only implement what they need.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Machine State
// =============================================================================

/// Driver-level machine state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// No VM exists for this machine yet.
    NotCreated,
    /// VM is powered off.
    PowerOff,
    /// VM is running.
    Running,
    /// VM state is saved to disk.
    Saved,
    /// VM is paused.
    Paused,
    /// VM aborted unexpectedly.
    Aborted,
    /// Any state the driver reports that is not modelled above.
    Other(String),
}

impl MachineState {
    /// Parses the state names reported by the hypervisor CLI.
    pub fn from_driver_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "not_created" | "inaccessible" => Self::NotCreated,
            "poweroff" | "poweredoff" | "power_off" => Self::PowerOff,
            "running" => Self::Running,
            "saved" => Self::Saved,
            "paused" => Self::Paused,
            "aborted" => Self::Aborted,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotCreated => write!(f, "not_created"),
            Self::PowerOff => write!(f, "poweroff"),
            Self::Running => write!(f, "running"),
            Self::Saved => write!(f, "saved"),
            Self::Paused => write!(f, "paused"),
            Self::Aborted => write!(f, "aborted"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

// =============================================================================
// Networking Shapes
// =============================================================================

/// Network adapter attachment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Nat,
    Bridged,
    Hostonly,
    Intnet,
    None,
}

/// Network adapter configuration passed to [`Driver::enable_adapters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAdapter {
    /// Adapter slot (1-based).
    pub adapter: u32,
    /// Attachment type.
    #[serde(rename = "type")]
    pub kind: AdapterKind,
    /// Host interface for bridged adapters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    /// Host-only network name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostonly: Option<String>,
}

impl NetworkAdapter {
    /// A NAT adapter in the given slot.
    pub fn nat(adapter: u32) -> Self {
        Self {
            adapter,
            kind: AdapterKind::Nat,
            bridge: None,
            hostonly: None,
        }
    }
}

/// A forwarded port: `[adapter, name, host_port, guest_port]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForwardedPort {
    pub adapter: u32,
    pub name: String,
    pub host_port: u16,
    pub guest_port: u16,
}

/// Boot mode for [`Driver::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartMode {
    #[default]
    Headless,
    Gui,
}

// =============================================================================
// Driver Trait
// =============================================================================

/// Hypervisor driver consumed by middleware.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Returns the driver name (e.g., "virtualbox").
    fn name(&self) -> &str;

    /// Reads the current state of the VM identified by `id`.
    async fn read_state(&self, id: Option<&str>) -> Result<MachineState>;

    /// Boots the VM.
    async fn start(&self, id: &str, mode: StartMode) -> Result<()> {
        let _ = (id, mode);
        Err(self.unsupported("start"))
    }

    /// Powers the VM off.
    async fn halt(&self, id: &str, force: bool) -> Result<()> {
        let _ = (id, force);
        Err(self.unsupported("halt"))
    }

    /// Imports an appliance and returns the new VM identifier.
    async fn import(&self, ovf: &Path) -> Result<String> {
        let _ = ovf;
        Err(self.unsupported("import"))
    }

    /// Exports the VM to `path`.
    async fn export(&self, id: &str, path: &Path) -> Result<()> {
        let _ = (id, path);
        Err(self.unsupported("export"))
    }

    /// Configures network adapters.
    async fn enable_adapters(&self, id: &str, adapters: &[NetworkAdapter]) -> Result<()> {
        let _ = (id, adapters);
        Err(self.unsupported("enable_adapters"))
    }

    /// Lists forwarded ports.
    async fn read_forwarded_ports(&self, id: &str) -> Result<Vec<ForwardedPort>> {
        let _ = id;
        Err(self.unsupported("read_forwarded_ports"))
    }

    /// Adds forwarded ports.
    async fn forward_ports(&self, id: &str, ports: &[ForwardedPort]) -> Result<()> {
        let _ = (id, ports);
        Err(self.unsupported("forward_ports"))
    }

    #[doc(hidden)]
    fn unsupported(&self, operation: &str) -> Error {
        Error::NotSupported(format!("{} driver does not support {}", self.name(), operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!(MachineState::from_driver_str("running"), MachineState::Running);
        assert_eq!(MachineState::from_driver_str("PowerOff"), MachineState::PowerOff);
        assert_eq!(
            MachineState::from_driver_str("gurumeditation"),
            MachineState::Other("gurumeditation".to_string())
        );
    }

    #[test]
    fn test_adapter_serializes_type_key() {
        let json = serde_json::to_value(NetworkAdapter::nat(1)).unwrap();
        assert_eq!(json["adapter"], 1);
        assert_eq!(json["type"], "nat");
        assert!(json.get("bridge").is_none());
    }
}
