//! Named registry of live external resources (browser sessions, app handles).
//!
//! Entries live in one of two tiers:
//!
//! * [`Tier::RunScoped`] entries belong to a single engine run and are handed
//!   back by [`InstanceRegistry::teardown_run`] when that run ends.
//! * [`Tier::ProcessScoped`] entries live in [`ProcessInstances`], shared by
//!   every engine in the process, and stay registered until a command
//!   releases them or the process drains the store on exit.
//!
//! The registry never opens, inspects or closes a handle. Replacing an entry
//! hands the superseded handle back to the caller; dropping it on the floor
//! leaks the underlying resource.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use uuid::Uuid;

use crate::error::RegistryError;

/// Option label that keeps an instance for later runs.
pub const KEEP_INSTANCE_ALIVE: &str = "Keep Instance Alive";
/// Option label that ties an instance to the run that created it.
pub const FORGET_INSTANCE: &str = "Forget Instance";

/// Lifetime tier of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    RunScoped,
    ProcessScoped,
}

impl Tier {
    /// Map an "Instance Tracking" option to its tier.
    pub fn from_tracking_option(option: &str) -> Option<Tier> {
        match option {
            FORGET_INSTANCE => Some(Tier::RunScoped),
            KEEP_INSTANCE_ALIVE => Some(Tier::ProcessScoped),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::RunScoped => f.write_str("run-scoped"),
            Tier::ProcessScoped => f.write_str("process-scoped"),
        }
    }
}

/// Identifier of one engine run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An externally owned resource kept in the registry.
///
/// Only the command family that created a handle knows its concrete type;
/// it gets it back through [`ResourceHandle::as_any`].
#[async_trait]
pub trait ResourceHandle: Send + Sync {
    /// Short resource kind for logs and listings (e.g. "browser")
    fn kind(&self) -> &str;

    /// Release the underlying resource. Must tolerate being called twice.
    async fn close(&self) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle").field("kind", &self.kind()).finish()
    }
}

pub type InstanceHandle = Arc<dyn ResourceHandle>;

/// A registry entry handed back by teardown or drain.
#[derive(Clone)]
pub struct InstanceEntry {
    pub name: String,
    pub tier: Tier,
    pub handle: InstanceHandle,
}

impl fmt::Debug for InstanceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceEntry")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .field("kind", &self.handle.kind())
            .finish()
    }
}

/// A handle whose `close` failed during teardown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloseFailure {
    pub name: String,
    pub tier: Tier,
    pub error: String,
}

fn normalize(name: &str) -> Result<String, RegistryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::InvalidName);
    }
    Ok(trimmed.to_lowercase())
}

struct StoredEntry {
    name: String,
    handle: InstanceHandle,
}

struct RunEntry {
    name: String,
    run: RunId,
    handle: InstanceHandle,
}

/// Process-wide instance store shared by every engine.
///
/// All operations take the same lock, so `put`, `get`, `remove` and `drain`
/// are atomic relative to each other. Two runs racing to `put` the same name
/// are not ordered: whichever takes the lock last wins, and the other handle
/// comes back to its caller as superseded.
#[derive(Clone, Default)]
pub struct ProcessInstances {
    inner: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

impl ProcessInstances {
    /// Private store, for tests and embedded hosts
    pub fn new() -> Self {
        Self::default()
    }

    /// The store shared by the whole process, created on first use
    pub fn global() -> Self {
        static GLOBAL: OnceLock<ProcessInstances> = OnceLock::new();
        GLOBAL.get_or_init(ProcessInstances::new).clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, name: &str, handle: InstanceHandle) -> Result<Option<InstanceHandle>, RegistryError> {
        let key = normalize(name)?;
        let previous = self.lock().insert(
            key,
            StoredEntry {
                name: name.trim().to_string(),
                handle,
            },
        );
        Ok(previous.map(|entry| entry.handle))
    }

    pub fn put_new(&self, name: &str, handle: InstanceHandle) -> Result<(), RegistryError> {
        let key = normalize(name)?;
        let mut map = self.lock();
        if map.contains_key(&key) {
            return Err(RegistryError::DuplicateReplace {
                tier: Tier::ProcessScoped,
                name: name.trim().to_string(),
            });
        }
        map.insert(
            key,
            StoredEntry {
                name: name.trim().to_string(),
                handle,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<InstanceHandle, RegistryError> {
        let key = normalize(name)?;
        self.lock()
            .get(&key)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| not_found(Some(Tier::ProcessScoped), name))
    }

    pub fn remove(&self, name: &str) -> Result<InstanceHandle, RegistryError> {
        let key = normalize(name)?;
        self.lock()
            .remove(&key)
            .map(|entry| entry.handle)
            .ok_or_else(|| not_found(Some(Tier::ProcessScoped), name))
    }

    pub fn contains(&self, name: &str) -> bool {
        normalize(name)
            .map(|key| self.lock().contains_key(&key))
            .unwrap_or(false)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().values().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove every entry, for closing at process exit.
    pub fn drain(&self) -> Vec<InstanceEntry> {
        self.lock()
            .drain()
            .map(|(_, entry)| InstanceEntry {
                name: entry.name,
                tier: Tier::ProcessScoped,
                handle: entry.handle,
            })
            .collect()
    }
}

fn not_found(tier: Option<Tier>, name: &str) -> RegistryError {
    RegistryError::NotFound {
        tier,
        name: name.to_string(),
    }
}

/// Instance registry seen by one engine: its own run-scoped entries plus the
/// shared process tier.
pub struct InstanceRegistry {
    run: RunId,
    run_scoped: HashMap<String, RunEntry>,
    process: ProcessInstances,
}

impl InstanceRegistry {
    pub fn new(run: RunId, process: ProcessInstances) -> Self {
        Self {
            run,
            run_scoped: HashMap::new(),
            process,
        }
    }

    /// Run that new run-scoped entries are attributed to
    pub fn current_run(&self) -> RunId {
        self.run
    }

    pub fn begin_run(&mut self, run: RunId) {
        self.run = run;
    }

    pub fn process(&self) -> &ProcessInstances {
        &self.process
    }

    /// Insert or replace `name` in `tier`.
    ///
    /// Returns the superseded handle, if any. It is NOT closed: the caller
    /// owns it and leaks the resource if it simply drops it.
    pub fn put(
        &mut self,
        tier: Tier,
        name: &str,
        handle: InstanceHandle,
    ) -> Result<Option<InstanceHandle>, RegistryError> {
        let previous = match tier {
            Tier::RunScoped => {
                let key = normalize(name)?;
                self.run_scoped
                    .insert(
                        key,
                        RunEntry {
                            name: name.trim().to_string(),
                            run: self.run,
                            handle,
                        },
                    )
                    .map(|entry| entry.handle)
            }
            Tier::ProcessScoped => self.process.put(name, handle)?,
        };

        if previous.is_some() {
            log::warn!(
                "instance '{}' ({}) replaced; the previous handle was not closed",
                name,
                tier
            );
        } else {
            log::debug!("registered instance '{}' ({})", name, tier);
        }
        Ok(previous)
    }

    /// Insert `name` only if the tier does not hold it yet.
    pub fn put_new(&mut self, tier: Tier, name: &str, handle: InstanceHandle) -> Result<(), RegistryError> {
        match tier {
            Tier::RunScoped => {
                let key = normalize(name)?;
                if self.run_scoped.contains_key(&key) {
                    return Err(RegistryError::DuplicateReplace {
                        tier,
                        name: name.trim().to_string(),
                    });
                }
                self.run_scoped.insert(
                    key,
                    RunEntry {
                        name: name.trim().to_string(),
                        run: self.run,
                        handle,
                    },
                );
            }
            Tier::ProcessScoped => self.process.put_new(name, handle)?,
        }
        log::debug!("registered instance '{}' ({})", name, tier);
        Ok(())
    }

    pub fn get(&self, tier: Tier, name: &str) -> Result<InstanceHandle, RegistryError> {
        match tier {
            Tier::RunScoped => {
                let key = normalize(name)?;
                self.run_scoped
                    .get(&key)
                    .map(|entry| entry.handle.clone())
                    .ok_or_else(|| not_found(Some(tier), name))
            }
            Tier::ProcessScoped => self.process.get(name),
        }
    }

    /// Remove `name` from `tier` and hand its handle to the caller to close.
    pub fn remove(&mut self, tier: Tier, name: &str) -> Result<InstanceHandle, RegistryError> {
        let handle = match tier {
            Tier::RunScoped => {
                let key = normalize(name)?;
                self.run_scoped
                    .remove(&key)
                    .map(|entry| entry.handle)
                    .ok_or_else(|| not_found(Some(tier), name))?
            }
            Tier::ProcessScoped => self.process.remove(name)?,
        };
        log::debug!("removed instance '{}' ({})", name, tier);
        Ok(handle)
    }

    /// Find `name` in the run tier first, then the process tier.
    pub fn lookup(&self, name: &str) -> Result<(Tier, InstanceHandle), RegistryError> {
        for tier in [Tier::RunScoped, Tier::ProcessScoped] {
            match self.get(tier, name) {
                Ok(handle) => return Ok((tier, handle)),
                Err(RegistryError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(not_found(None, name))
    }

    /// Remove `name` from whichever tier holds it, run tier first.
    pub fn release(&mut self, name: &str) -> Result<(Tier, InstanceHandle), RegistryError> {
        for tier in [Tier::RunScoped, Tier::ProcessScoped] {
            match self.remove(tier, name) {
                Ok(handle) => return Ok((tier, handle)),
                Err(RegistryError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(not_found(None, name))
    }

    /// Remove and return every run-scoped entry created during `run`.
    /// Process-scoped entries are left alone.
    pub fn teardown_run(&mut self, run: RunId) -> Vec<InstanceEntry> {
        let keys: Vec<String> = self
            .run_scoped
            .iter()
            .filter(|(_, entry)| entry.run == run)
            .map(|(key, _)| key.clone())
            .collect();

        let mut entries: Vec<InstanceEntry> = keys
            .into_iter()
            .filter_map(|key| self.run_scoped.remove(&key))
            .map(|entry| InstanceEntry {
                name: entry.name,
                tier: Tier::RunScoped,
                handle: entry.handle,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Run-scoped names currently registered, sorted
    pub fn run_scoped_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.run_scoped.values().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }
}

/// Close every handle, best effort. A failing close is logged and reported
/// but never stops the remaining handles from being closed.
pub async fn close_handles(entries: Vec<InstanceEntry>) -> Vec<CloseFailure> {
    let mut failures = Vec::new();
    for entry in entries {
        if let Err(e) = entry.handle.close().await {
            log::warn!(
                "failed to close {} instance '{}' ({}): {:#}",
                entry.handle.kind(),
                entry.name,
                entry.tier,
                e
            );
            failures.push(CloseFailure {
                name: entry.name,
                tier: entry.tier,
                error: format!("{:#}", e),
            });
        } else {
            log::debug!("closed instance '{}' ({})", entry.name, entry.tier);
        }
    }
    failures
}
