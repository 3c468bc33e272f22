//! # Capability Dispatch
//!
//! Capabilities are small, named units of OS-specific behavior
//! (`mount_nfs_folder`, `change_host_name`, `configure_networks`, ...). A
//! capability host detects which OS implementation applies and resolves a
//! capability by searching an ordered chain of implementations, most
//! specific first.
//!
//! ## Tables
//!
//! ```text
//! HostCandidates          (search path: name → detector, parent)
//! ┌──────────┬──────────┬─────────┐
//! │ ubuntu   │ detect() │ debian  │
//! │ debian   │ detect() │ linux   │
//! │ linux    │ detect() │ -       │
//! └──────────┴──────────┴─────────┘
//!
//! CapabilityRegistry      (lookup table: os → capability → impl)
//! ┌──────────┬──────────────────────────────────┐
//! │ debian   │ change_host_name → DebianHostname │
//! │ linux    │ mount_nfs_folder → LinuxNfs       │
//! └──────────┴──────────────────────────────────┘
//! ```
//!
//! ## Detection
//!
//! Candidates with the most ancestor levels are tried first (most
//! specialized detection hierarchies before shallow ones); ties keep
//! registration order. The first candidate whose detector returns true is
//! selected. A forced name bypasses detection entirely.
//!
//! Once selected, the chain is `[selected, parent, grandparent, ...]`.
//! Parent links are walked iteratively; a repeated name fails with
//! [`Error::CapabilityHostCycle`] instead of looping forever. A parent name
//! that is not a registered candidate terminates the chain.
//!
//! ## Dispatch
//!
//! `capability(cap)` walks the chain and invokes the first registered
//! implementation. The detection argument (the machine for guests, the
//! platform for hosts) is always passed first.
//!
//! ## Hosts
//!
//! | Wrapper | Detection argument | Module |
//! |---------|--------------------|--------|
//! | [`Guest`] | [`Machine`](crate::Machine) | [`guest`] |
//! | [`Host`] | [`Platform`](crate::Platform) | [`host`] |
//! | [`SyncedFolder`] | [`Machine`](crate::Machine) | [`synced_folder`] |

pub mod guest;
pub mod host;
pub mod synced_folder;

pub use guest::Guest;
pub use host::Host;
pub use synced_folder::{SyncedFolder, SyncedFolderRegistry};

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::ThreadId;
use tracing::{debug, info};

// =============================================================================
// Implementation Traits
// =============================================================================

/// Decides whether an OS implementation applies to the detection argument.
pub trait OsDetector<A: ?Sized>: Send + Sync {
    fn detect(&self, ctx: &A) -> bool;
}

impl<A: ?Sized, F> OsDetector<A> for F
where
    F: Fn(&A) -> bool + Send + Sync,
{
    fn detect(&self, ctx: &A) -> bool {
        self(ctx)
    }
}

/// A registered capability implementation.
///
/// One implementation may serve several capability names. Registering a
/// name the implementation does not respond to is a registration bug,
/// surfaced as [`Error::CapabilityInvalid`] at dispatch time.
pub trait CapabilityImpl<A: ?Sized>: Send + Sync {
    /// Returns true if this implementation provides `cap`.
    fn responds_to(&self, cap: &str) -> bool;

    /// Executes `cap` with the detection argument and caller arguments.
    fn invoke(&self, cap: &str, ctx: &A, args: &[Value]) -> Result<Value>;
}

type CapabilityFn<A> = dyn Fn(&A, &[Value]) -> Result<Value> + Send + Sync;

/// Capability implemented by a single closure.
pub struct FnCapability<A: ?Sized> {
    name: String,
    func: Box<CapabilityFn<A>>,
}

impl<A: ?Sized> FnCapability<A> {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&A, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl<A: ?Sized> CapabilityImpl<A> for FnCapability<A> {
    fn responds_to(&self, cap: &str) -> bool {
        self.name == cap
    }

    fn invoke(&self, _cap: &str, ctx: &A, args: &[Value]) -> Result<Value> {
        (self.func)(ctx, args)
    }
}

// =============================================================================
// Candidate Table
// =============================================================================

struct Candidate<A: ?Sized> {
    name: String,
    detector: Arc<dyn OsDetector<A>>,
    parent: Option<String>,
}

/// Ordered table of capability host candidates.
pub struct HostCandidates<A: ?Sized> {
    entries: Vec<Candidate<A>>,
    index: HashMap<String, usize>,
}

impl<A: ?Sized> HostCandidates<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registers a candidate. Re-registering a name replaces it in place.
    pub fn register<D>(&mut self, name: impl Into<String>, parent: Option<&str>, detector: D)
    where
        D: OsDetector<A> + 'static,
    {
        let candidate = Candidate {
            name: name.into(),
            detector: Arc::new(detector),
            parent: parent.map(str::to_string),
        };
        match self.index.get(&candidate.name) {
            Some(&idx) => self.entries[idx] = candidate,
            None => {
                self.index.insert(candidate.name.clone(), self.entries.len());
                self.entries.push(candidate);
            }
        }
    }

    /// Returns true if `name` is a registered candidate.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Parent of `name`, if any.
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.index
            .get(name)
            .and_then(|&idx| self.entries[idx].parent.as_deref())
    }

    /// Candidate names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices of `idx` and its registered ancestors, most specific first.
    fn ancestry(&self, idx: usize) -> Result<Vec<usize>> {
        let mut chain = vec![idx];
        let mut seen = HashSet::from([idx]);
        let mut current = idx;

        while let Some(parent) = self.entries[current].parent.as_deref() {
            let Some(&parent_idx) = self.index.get(parent) else {
                break;
            };
            if !seen.insert(parent_idx) {
                return Err(Error::CapabilityHostCycle {
                    name: self.entries[idx].name.clone(),
                });
            }
            chain.push(parent_idx);
            current = parent_idx;
        }

        Ok(chain)
    }

    /// Number of parent links above `idx`, counting a final parent name
    /// that is not registered.
    fn parent_links(&self, idx: usize) -> Result<usize> {
        let chain = self.ancestry(idx)?;
        let dangling = chain
            .last()
            .is_some_and(|&root| self.entries[root].parent.is_some());
        Ok(chain.len() - 1 + usize::from(dangling))
    }

    /// Candidate indices ordered by descending parent link count.
    fn search_order(&self) -> Result<Vec<usize>> {
        let mut depths = Vec::with_capacity(self.entries.len());
        for idx in 0..self.entries.len() {
            depths.push((idx, self.parent_links(idx)?));
        }
        // Stable: ties keep registration order.
        depths.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(depths.into_iter().map(|(idx, _)| idx).collect())
    }
}

impl<A: ?Sized> Default for HostCandidates<A> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Capability Table
// =============================================================================

/// Two-level `os → capability → implementation` table.
pub struct CapabilityRegistry<A: ?Sized> {
    table: HashMap<String, HashMap<String, Arc<dyn CapabilityImpl<A>>>>,
}

impl<A: ?Sized> CapabilityRegistry<A> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Registers `implementation` as `cap` for `os`.
    pub fn register(
        &mut self,
        os: impl Into<String>,
        cap: impl Into<String>,
        implementation: Arc<dyn CapabilityImpl<A>>,
    ) {
        self.table
            .entry(os.into())
            .or_default()
            .insert(cap.into(), implementation);
    }

    /// Registers a closure as `cap` for `os`.
    pub fn register_fn<F>(&mut self, os: impl Into<String>, cap: impl Into<String>, func: F)
    where
        A: 'static,
        F: Fn(&A, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let cap = cap.into();
        let implementation = Arc::new(FnCapability::new(cap.clone(), func));
        self.register(os, cap, implementation);
    }

    /// Looks up `cap` registered directly on `os` (no inheritance).
    pub fn lookup(&self, os: &str, cap: &str) -> Option<&Arc<dyn CapabilityImpl<A>>> {
        self.table.get(os).and_then(|caps| caps.get(cap))
    }
}

impl<A: ?Sized> Default for CapabilityRegistry<A> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Capability Host
// =============================================================================

/// One level of a detected host chain.
pub struct ChainLink<A: ?Sized> {
    pub name: String,
    pub detector: Arc<dyn OsDetector<A>>,
}

/// A detected capability host: an immutable chain plus the capability table.
///
/// Values of this type only exist in the `detected` state; the wrappers
/// ([`Guest`], [`Host`], [`SyncedFolder`]) hold an `Option` of it to model
/// `undetected → detected` and explicit resets.
pub struct CapabilityHost<A: ?Sized> {
    kind: &'static str,
    chain: Vec<ChainLink<A>>,
    capabilities: Arc<CapabilityRegistry<A>>,
}

impl<A: ?Sized + std::fmt::Debug> CapabilityHost<A> {
    /// Selects a candidate (forced or autodetected) and builds its chain.
    pub fn detect(
        kind: &'static str,
        candidates: &HostCandidates<A>,
        capabilities: Arc<CapabilityRegistry<A>>,
        forced: Option<&str>,
        ctx: &A,
    ) -> Result<Self> {
        let selected = match forced {
            Some(name) => match candidates.index.get(name) {
                Some(&idx) => {
                    info!(kind, name, "using explicitly requested capability host");
                    idx
                }
                None => {
                    return Err(Error::CapabilityHostExplicitNotDetected {
                        value: name.to_string(),
                    });
                }
            },
            None => Self::autodetect(kind, candidates, ctx)?,
        };

        let chain: Vec<ChainLink<A>> = candidates
            .ancestry(selected)?
            .into_iter()
            .map(|idx| {
                let entry = &candidates.entries[idx];
                ChainLink {
                    name: entry.name.clone(),
                    detector: Arc::clone(&entry.detector),
                }
            })
            .collect();

        let names: Vec<&str> = chain.iter().map(|l| l.name.as_str()).collect();
        info!(kind, chain = ?names, "capability host chain built");

        Ok(Self {
            kind,
            chain,
            capabilities,
        })
    }

    fn autodetect(kind: &'static str, candidates: &HostCandidates<A>, ctx: &A) -> Result<usize> {
        info!(kind, "autodetecting capability host for {:?}", ctx);

        for idx in candidates.search_order()? {
            let entry = &candidates.entries[idx];
            debug!(kind, "trying: {}", entry.name);
            if entry.detector.detect(ctx) {
                info!(kind, "detected: {}", entry.name);
                return Ok(idx);
            }
        }

        Err(Error::CapabilityHostNotDetected {
            kind: kind.to_string(),
        })
    }
}

impl<A: ?Sized> CapabilityHost<A> {
    /// Name of the most specific (selected) implementation.
    pub fn name(&self) -> &str {
        &self.chain[0].name
    }

    /// The search chain, most specific first.
    pub fn chain(&self) -> &[ChainLink<A>] {
        &self.chain
    }

    /// Names in the search chain, most specific first.
    pub fn chain_names(&self) -> Vec<&str> {
        self.chain.iter().map(|l| l.name.as_str()).collect()
    }

    fn capability_module(&self, cap: &str) -> Option<(&str, &Arc<dyn CapabilityImpl<A>>)> {
        debug!(kind = self.kind, "searching for cap: {cap}");
        for link in &self.chain {
            debug!(kind = self.kind, "checking in: {}", link.name);
            if let Some(module) = self.capabilities.lookup(&link.name, cap) {
                debug!(kind = self.kind, "found cap: {cap} in {}", link.name);
                return Some((link.name.as_str(), module));
            }
        }
        None
    }

    /// Returns true if any level of the chain registers `cap`.
    pub fn has_capability(&self, cap: &str) -> bool {
        self.capability_module(cap).is_some()
    }

    /// Resolves and executes `cap`.
    pub fn capability(&self, cap: &str, ctx: &A, args: &[Value]) -> Result<Value> {
        let Some((level, module)) = self.capability_module(cap) else {
            return Err(Error::CapabilityNotFound {
                cap: cap.to_string(),
                host: self.name().to_string(),
            });
        };

        if !module.responds_to(cap) {
            return Err(Error::CapabilityInvalid {
                cap: cap.to_string(),
                host: self.name().to_string(),
            });
        }

        info!(
            kind = self.kind,
            "execute capability: {cap} {:?} ({}, via {level})",
            args,
            self.name()
        );
        module.invoke(cap, ctx, args)
    }
}

// =============================================================================
// Detection State
// =============================================================================

/// `undetected → detecting → detected(chain)` state shared by the wrappers.
///
/// Detectors run outside the lock and the first finished chain is published.
/// While a thread is detecting, queries it makes against the same host fail
/// with [`Error::CapabilityHostNotInitialized`] instead of detecting again.
/// Dispatch clones the detected host out of the lock before invoking
/// capabilities, so a capability may re-enter its own host.
pub(crate) struct DetectionSlot<A: ?Sized> {
    host: RwLock<Option<Arc<CapabilityHost<A>>>>,
    detecting: Mutex<Vec<ThreadId>>,
}

impl<A: ?Sized> DetectionSlot<A> {
    pub(crate) fn new() -> Self {
        Self {
            host: RwLock::new(None),
            detecting: Mutex::new(Vec::new()),
        }
    }

    /// The detected host, if any.
    pub(crate) fn get(&self) -> Result<Option<Arc<CapabilityHost<A>>>> {
        let guard = self
            .host
            .read()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        Ok(guard.as_ref().map(Arc::clone))
    }

    /// Returns the detected host, running `detect` if still undetected.
    pub(crate) fn get_or_detect<F>(&self, detect: F) -> Result<Arc<CapabilityHost<A>>>
    where
        F: FnOnce() -> Result<CapabilityHost<A>>,
    {
        if let Some(host) = self.get()? {
            return Ok(host);
        }

        let thread = std::thread::current().id();
        {
            let mut detecting = self
                .detecting
                .lock()
                .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
            if detecting.contains(&thread) {
                debug!("capability host queried by its own detector");
                return Err(Error::CapabilityHostNotInitialized);
            }
            detecting.push(thread);
        }
        let _detecting = DetectingGuard {
            detecting: &self.detecting,
            thread,
        };

        let detected = Arc::new(detect()?);

        let mut guard = self
            .host
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        // Another thread may have published first; its chain wins.
        Ok(Arc::clone(guard.get_or_insert(detected)))
    }

    /// Returns to `undetected`; the next access detects again.
    pub(crate) fn reset(&self) -> Result<()> {
        let mut guard = self
            .host
            .write()
            .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
        *guard = None;
        Ok(())
    }
}

/// Clears the calling thread's `detecting` mark, including on error.
struct DetectingGuard<'a> {
    detecting: &'a Mutex<Vec<ThreadId>>,
    thread: ThreadId,
}

impl Drop for DetectingGuard<'_> {
    fn drop(&mut self) {
        let mut detecting = self
            .detecting
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        detecting.retain(|t| *t != self.thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never(_: &str) -> bool {
        false
    }

    #[test]
    fn test_search_order_prefers_deeper_hierarchies() {
        let mut candidates: HostCandidates<str> = HostCandidates::new();
        candidates.register("linux", None, never);
        candidates.register("ubuntu", Some("debian"), never);
        candidates.register("debian", Some("linux"), never);
        candidates.register("windows", None, never);

        let order: Vec<_> = candidates
            .search_order()
            .unwrap()
            .into_iter()
            .map(|i| candidates.entries[i].name.as_str())
            .collect();
        assert_eq!(order, vec!["ubuntu", "debian", "linux", "windows"]);
    }

    #[test]
    fn test_unknown_parent_ends_chain() {
        let mut candidates: HostCandidates<str> = HostCandidates::new();
        candidates.register("alpine", Some("missing"), never);
        assert_eq!(candidates.ancestry(0).unwrap(), vec![0]);
    }

    #[test]
    fn test_unknown_parent_counts_as_link() {
        let mut candidates: HostCandidates<str> = HostCandidates::new();
        candidates.register("linux", None, never);
        candidates.register("alpine", Some("missing"), never);
        candidates.register("debian", Some("linux"), never);
        candidates.register("ubuntu", Some("debian"), never);

        assert_eq!(candidates.parent_links(0).unwrap(), 0);
        assert_eq!(candidates.parent_links(1).unwrap(), 1);
        assert_eq!(candidates.parent_links(3).unwrap(), 2);

        let order: Vec<_> = candidates
            .search_order()
            .unwrap()
            .into_iter()
            .map(|i| candidates.entries[i].name.as_str())
            .collect();
        assert_eq!(order, vec!["ubuntu", "alpine", "debian", "linux"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut candidates: HostCandidates<str> = HostCandidates::new();
        candidates.register("a", Some("b"), never);
        candidates.register("b", Some("a"), never);
        assert!(matches!(
            candidates.ancestry(0),
            Err(Error::CapabilityHostCycle { .. })
        ));
    }
}
