//! Host OS capability host.
//!
//! Host capabilities run on the machine driving the VMs (NFS exports,
//! `/etc/hosts` edits, opening the GUI). Detection runs against the
//! [`Platform`] the host was created with.
//!
//! [`builtin_candidates`] registers the host families this crate knows how to
//! recognise:
//!
//! | Name | Parent | Detected when |
//! |------|--------|---------------|
//! | `darwin` | `bsd` | OS is macOS |
//! | `bsd` | - | OS is a BSD or macOS |
//! | `linux` | - | OS is Linux |
//! | `windows` | - | OS is Windows |

use super::{CapabilityHost, CapabilityRegistry, DetectionSlot, HostCandidates};
use crate::error::Result;
use crate::platform::{Os, Platform};
use serde_json::Value;
use std::sync::Arc;

const KIND: &str = "host";

/// Returns the builtin host candidate table.
pub fn builtin_candidates() -> HostCandidates<Platform> {
    let mut candidates = HostCandidates::new();
    candidates.register("bsd", None, |p: &Platform| p.is_bsd_like());
    candidates.register("darwin", Some("bsd"), |p: &Platform| p.os == Os::Darwin);
    candidates.register("linux", None, |p: &Platform| p.os == Os::Linux);
    candidates.register("windows", None, |p: &Platform| p.os == Os::Windows);
    candidates
}

/// Capability host for the host OS.
pub struct Host {
    platform: Platform,
    forced: Option<String>,
    candidates: Arc<HostCandidates<Platform>>,
    capabilities: Arc<CapabilityRegistry<Platform>>,
    slot: DetectionSlot<Platform>,
}

impl Host {
    /// Creates an undetected host for `platform`.
    pub fn new(
        platform: Platform,
        candidates: Arc<HostCandidates<Platform>>,
        capabilities: Arc<CapabilityRegistry<Platform>>,
    ) -> Self {
        Self {
            platform,
            forced: None,
            candidates,
            capabilities,
            slot: DetectionSlot::new(),
        }
    }

    /// Skips autodetection and uses the named candidate.
    #[must_use]
    pub fn with_forced(mut self, name: impl Into<String>) -> Self {
        self.forced = Some(name.into());
        self
    }

    /// The platform detection runs against.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    fn ready(&self) -> Result<Arc<CapabilityHost<Platform>>> {
        self.slot.get_or_detect(|| {
            CapabilityHost::detect(
                KIND,
                &self.candidates,
                Arc::clone(&self.capabilities),
                self.forced.as_deref(),
                &self.platform,
            )
        })
    }

    /// Detects the host OS (no-op once detected) and returns its name.
    pub fn detect(&self) -> Result<String> {
        Ok(self.ready()?.name().to_string())
    }

    /// Detected chain, most specific first.
    pub fn chain_names(&self) -> Result<Vec<String>> {
        Ok(self
            .ready()?
            .chain_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Forgets the detected chain.
    pub fn reset(&self) -> Result<()> {
        self.slot.reset()
    }

    /// Returns true if the host chain provides `cap`.
    pub fn has_capability(&self, cap: &str) -> Result<bool> {
        Ok(self.ready()?.has_capability(cap))
    }

    /// Executes `cap` with the platform as the first argument.
    pub fn capability(&self, cap: &str, args: &[Value]) -> Result<Value> {
        self.ready()?.capability(cap, &self.platform, args)
    }
}
