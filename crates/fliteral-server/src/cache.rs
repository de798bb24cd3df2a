//! Module Cache
//!
//! Process-wide registry from canonical function directory to its loaded
//! module. Every lookup carries the descriptor modification time observed by
//! the resolver for the current request:
//!
//! - equal to the cached time: the cached module is reused
//! - different: the entry is evicted and the module reloaded
//!
//! Loads run outside the lock. Installing a freshly loaded module is a
//! compare-and-swap under a short write lock: if another request already
//! installed a module for the same modification time, that module wins and the
//! duplicate load is dropped. Failed loads are never cached, so a fixed module
//! is picked up by the next request without a restart.

use chrono::{DateTime, Utc};
use fliteral_common::Failure;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::resolver::ResolvedFunction;
use crate::runtime::FunctionContext;

pub(crate) const DEFAULT_ENTRY: &str = "index.js";

/// The parsed package descriptor of a function directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDescriptor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Entry file relative to the function directory
    #[serde(default)]
    pub main: Option<String>,
}

impl FunctionDescriptor {
    pub fn parse(source: &str) -> Result<Self, Failure> {
        serde_json::from_str(source)
            .map_err(|e| Failure::module_load(format!("invalid package descriptor: {}", e)))
    }

    pub fn entry(&self) -> &str {
        self.main.as_deref().unwrap_or(DEFAULT_ENTRY)
    }
}

/// A function module whose source has been read and verified to export a
/// callable handler.
///
/// Boa contexts cannot cross threads, so the module keeps its source and every
/// invocation evaluates it in a fresh [`FunctionContext`]. Top-level code
/// therefore runs once per request: module-level state (counters, memoised
/// connections) starts over each time and load-time side effects repeat.
#[derive(Debug)]
pub struct LoadedModule {
    pub key: PathBuf,
    pub entry_path: PathBuf,
    pub source: Arc<str>,
    /// Descriptor modification time this module was loaded for
    pub modified: SystemTime,
    /// Monotonic load counter value; changes on every reload
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl LoadedModule {
    /// Builds a fresh context for one invocation.
    pub fn instantiate(&self) -> Result<FunctionContext, Failure> {
        FunctionContext::load(&self.source, &self.entry_path, &self.key)
    }
}

#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: RwLock<HashMap<PathBuf, Arc<LoadedModule>>>,
    loads: AtomicU64,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the module for `function`, loading it when absent or stale.
    ///
    /// # Errors
    ///
    /// - `ModuleLoad` if the descriptor or entry file cannot be read, the
    ///   descriptor is not valid JSON, or the module throws while evaluating
    /// - `ModuleInvalid` if the module exports no callable handler, or the
    ///   entry file lies outside the function directory
    pub async fn get_or_load(&self, function: &ResolvedFunction) -> Result<Arc<LoadedModule>, Failure> {
        if let Some(cached) = self.get(&function.key) {
            if cached.modified == function.modified {
                debug!(key = %function.key.display(), generation = cached.generation, "module cache hit");
                return Ok(cached);
            }

            info!(key = %function.key.display(), "descriptor changed, invalidating cache");
            self.evict_stale(&function.key, function.modified);
        }

        let loaded = Arc::new(self.load(function).await?);
        Ok(self.install(loaded))
    }

    pub fn get(&self, key: &Path) -> Option<Arc<LoadedModule>> {
        self.read().get(key).cloned()
    }

    pub fn evict(&self, key: &Path) -> Option<Arc<LoadedModule>> {
        self.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of successful loads since creation, including duplicates that
    /// lost the install race.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    fn evict_stale(&self, key: &Path, modified: SystemTime) {
        let mut entries = self.write();
        if entries.get(key).is_some_and(|m| m.modified != modified) {
            entries.remove(key);
        }
    }

    fn install(&self, loaded: Arc<LoadedModule>) -> Arc<LoadedModule> {
        let mut entries = self.write();
        if let Some(existing) = entries.get(&loaded.key) {
            if existing.modified == loaded.modified {
                debug!(
                    key = %loaded.key.display(),
                    generation = existing.generation,
                    "module already installed by a concurrent load"
                );
                return Arc::clone(existing);
            }
        }
        entries.insert(loaded.key.clone(), Arc::clone(&loaded));
        loaded
    }

    async fn load(&self, function: &ResolvedFunction) -> Result<LoadedModule, Failure> {
        let descriptor_source = tokio::fs::read_to_string(&function.descriptor_path)
            .await
            .map_err(|e| {
                Failure::module_load(format!("read {} failed: {}", function.descriptor_path.display(), e))
            })?;
        let descriptor = FunctionDescriptor::parse(&descriptor_source)?;

        let entry_path = find_entry(&function.key, descriptor.entry()).await?;
        debug!(entry = %entry_path.display(), "loading module");
        let source: Arc<str> = tokio::fs::read_to_string(&entry_path)
            .await
            .map_err(|e| Failure::module_load(format!("read {} failed: {}", entry_path.display(), e)))?
            .into();

        // Evaluate once up front so broken modules fail here rather than per
        // invocation; the scratch context is dropped on the blocking thread.
        let scratch_source = Arc::clone(&source);
        let scratch_entry = entry_path.clone();
        let scratch_key = function.key.clone();
        tokio::task::spawn_blocking(move || {
            FunctionContext::load(&scratch_source, &scratch_entry, &scratch_key).map(|_| ())
        })
        .await
        .map_err(|e| Failure::module_load(format!("module evaluation panicked: {}", e)))??;

        let generation = self.loads.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            key = %function.key.display(),
            name = descriptor.name.as_deref().unwrap_or(""),
            generation,
            "module loaded"
        );

        Ok(LoadedModule {
            key: function.key.clone(),
            entry_path,
            source,
            modified: function.modified,
            generation,
            loaded_at: Utc::now(),
            name: descriptor.name,
            version: descriptor.version,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PathBuf, Arc<LoadedModule>>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PathBuf, Arc<LoadedModule>>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Finds the entry file: `main`, then `main.js`, then `main/index.js`.
async fn find_entry(directory: &Path, main: &str) -> Result<PathBuf, Failure> {
    let base = directory.join(main);
    let candidates = [
        base.clone(),
        directory.join(format!("{}.js", main)),
        base.join(DEFAULT_ENTRY),
    ];

    for candidate in candidates {
        let is_file = tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }

        let canonical = tokio::fs::canonicalize(&candidate).await.map_err(|e| {
            Failure::module_load(format!("canonicalize {} failed: {}", candidate.display(), e))
        })?;
        if !canonical.starts_with(directory) {
            return Err(Failure::module_invalid(format!(
                "entry {} lies outside {}",
                canonical.display(),
                directory.display()
            )));
        }
        return Ok(canonical);
    }

    Err(Failure::module_load(format!(
        "no entry file for main {:?} in {}",
        main,
        directory.display()
    )))
}
