//! Two-tier result cache.
//!
//! Entries live in a bounded in-memory map and, when a cache directory is
//! configured, in one file per key (`<key>.cache`) holding the CBOR encoded
//! `(value, created)` pair. Lookups go memory, then disk (promoting hits
//! into memory), then miss. Expired entries are dropped lazily when they are
//! looked up. Disk failures are logged and swallowed.

use mystic_core::time::{now, DurationSpec, DEFAULT_TTL};
use mystic_core::{CallArgs, Digest, FunctionId, MysticConfig, Timestamp, Value};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File extension of disk entries
const ENTRY_EXTENSION: &str = "cache";

/// Derive the cache key for a call: SHA-256 over
/// `qualname:positional_args:sorted_kwargs`, hex encoded
#[must_use]
pub fn cache_key(function: &FunctionId, args: &CallArgs) -> String {
    let qualname = function.qualname();
    let args_repr = args.args_repr();
    let kwargs_repr = args.kwargs_repr();
    Digest::compute_parts(&[qualname.as_str(), args_repr.as_str(), kwargs_repr.as_str()]).to_hex()
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of an entry
    pub ttl: Duration,
    /// Capacity of the memory tier
    pub max_size: usize,
    /// Directory of the disk tier (memory only when `None`)
    pub cache_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_size: 1000,
            cache_dir: None,
        }
    }
}

impl CacheConfig {
    /// Memory-only configuration with the given lifetime
    #[must_use]
    pub fn new(duration: impl Into<DurationSpec>) -> Self {
        Self {
            ttl: duration.into().resolve(),
            ..Self::default()
        }
    }

    /// Derive from process configuration (disk tier enabled)
    #[must_use]
    pub fn from_config(config: &MysticConfig) -> Self {
        Self {
            ttl: config.cache_ttl(),
            max_size: config.max_cache_size,
            cache_dir: Some(config.cache_dir()),
        }
    }

    /// Set the entry lifetime
    #[must_use]
    pub fn with_ttl(mut self, duration: impl Into<DurationSpec>) -> Self {
        self.ttl = duration.into().resolve();
        self
    }

    /// Set memory tier capacity
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Enable the disk tier
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// Disk tier failure
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem error
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    /// Entry could not be encoded or decoded
    #[error("cache entry encoding error: {0}")]
    Encoding(#[from] serde_cbor::Error),
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from either tier
    pub hits: u64,
    /// Lookups that found nothing valid
    pub misses: u64,
    /// Hits answered from disk
    pub disk_hits: u64,
    /// Entries dropped by capacity eviction
    pub evictions: u64,
    /// Swallowed disk failures
    pub disk_errors: u64,
}

/// A cached value and when it was produced
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Cached result
    pub value: Value,
    /// Creation time
    pub created: Timestamp,
}

#[derive(Default)]
struct MemoryTier {
    entries: HashMap<String, CacheEntry>,
    /// Access sequence per key, larger is more recent
    access: HashMap<String, u64>,
    tick: u64,
}

impl MemoryTier {
    fn touch(&mut self, key: &str) {
        self.tick += 1;
        self.access.insert(key.to_string(), self.tick);
    }

    fn insert(&mut self, key: &str, entry: CacheEntry) {
        self.entries.insert(key.to_string(), entry);
        self.touch(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        self.access.remove(key);
        self.entries.remove(key).is_some()
    }

    /// Drop the least recently accessed half once at capacity
    fn evict_if_full(&mut self, max_size: usize) -> usize {
        if self.entries.len() < max_size || self.entries.is_empty() {
            return 0;
        }
        let mut by_access: Vec<(String, u64)> =
            self.access.iter().map(|(k, t)| (k.clone(), *t)).collect();
        by_access.sort_by_key(|(_, t)| *t);

        let count = (by_access.len() / 2).max(1);
        for (key, _) in by_access.into_iter().take(count) {
            self.remove(&key);
        }
        count
    }
}

/// Two-tier TTL cache
pub struct CacheStore {
    config: CacheConfig,
    memory: Mutex<MemoryTier>,
    stats: Mutex<CacheStats>,
}

impl CacheStore {
    /// Create a store. A cache directory that cannot be created only
    /// disables disk persistence in practice.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        if let Some(dir) = &config.cache_dir {
            if let Err(err) = std::fs::create_dir_all(dir) {
                tracing::warn!(dir = %dir.display(), %err, "cannot create cache directory");
            }
        }
        Self {
            config,
            memory: Mutex::new(MemoryTier::default()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Memory-only store with the given lifetime
    #[must_use]
    pub fn in_memory(duration: impl Into<DurationSpec>) -> Self {
        Self::new(CacheConfig::new(duration))
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Look up a valid value, promoting disk hits into memory
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let found = self.lookup(key, true);
        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
            tracing::trace!(key, "cache hit");
        } else {
            stats.misses += 1;
            tracing::trace!(key, "cache miss");
        }
        found
    }

    /// Whether a valid value exists. Expired entries found on the way are
    /// dropped; nothing is promoted and counters are untouched.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lookup(key, false).is_some()
    }

    /// Store a value in both tiers
    pub fn insert(&self, key: &str, value: Value) {
        let created = now();
        {
            let mut memory = self.memory.lock();
            let evicted = memory.evict_if_full(self.config.max_size);
            if evicted > 0 {
                self.stats.lock().evictions += evicted as u64;
                tracing::debug!(evicted, "evicted cache entries");
            }
            memory.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    created,
                },
            );
        }

        if let Some(path) = self.entry_path(key) {
            if let Err(err) = write_entry(&path, &value, created) {
                tracing::warn!(key, %err, "cache disk write failed");
                self.stats.lock().disk_errors += 1;
            }
        }
    }

    /// Remove a key from both tiers, returning whether anything was removed
    pub fn invalidate(&self, key: &str) -> bool {
        let in_memory = self.memory.lock().remove(key);
        let on_disk = self
            .entry_path(key)
            .is_some_and(|path| std::fs::remove_file(path).is_ok());
        in_memory || on_disk
    }

    /// Remove every entry from both tiers
    pub fn clear(&self) {
        *self.memory.lock() = MemoryTier::default();

        let Some(dir) = &self.config.cache_dir else {
            return;
        };
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), %err, "cannot list cache directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                if let Err(err) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), %err, "cannot remove cache entry");
                }
            }
        }
    }

    /// Entries in the memory tier
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.lock().entries.len()
    }

    /// True when the memory tier is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock()
    }

    fn is_fresh(&self, created: Timestamp) -> bool {
        match (now() - created).to_std() {
            Ok(age) => age < self.config.ttl,
            // created in the future (clock moved backwards)
            Err(_) => !self.config.ttl.is_zero(),
        }
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.config
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", key, ENTRY_EXTENSION)))
    }

    fn lookup(&self, key: &str, promote: bool) -> Option<Value> {
        {
            let mut memory = self.memory.lock();
            let fresh = memory
                .entries
                .get(key)
                .map(|entry| (self.is_fresh(entry.created), entry.value.clone()));
            match fresh {
                Some((true, value)) => {
                    if promote {
                        memory.touch(key);
                    }
                    return Some(value);
                }
                Some((false, _)) => {
                    memory.remove(key);
                }
                None => {}
            }
        }

        let path = self.entry_path(key)?;
        match read_entry(&path) {
            Ok(Some(entry)) if self.is_fresh(entry.created) => {
                if promote {
                    let mut memory = self.memory.lock();
                    let evicted = memory.evict_if_full(self.config.max_size);
                    memory.insert(key, entry.clone());
                    drop(memory);
                    let mut stats = self.stats.lock();
                    stats.evictions += evicted as u64;
                    stats.disk_hits += 1;
                }
                Some(entry.value)
            }
            Ok(Some(_)) => {
                remove_quietly(&path);
                None
            }
            Ok(None) => None,
            Err(CacheError::Encoding(err)) => {
                tracing::warn!(key, %err, "dropping corrupted cache entry");
                remove_quietly(&path);
                None
            }
            Err(err) => {
                tracing::warn!(key, %err, "cache disk read failed");
                self.stats.lock().disk_errors += 1;
                None
            }
        }
    }
}

fn read_entry(path: &Path) -> Result<Option<CacheEntry>, CacheError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let (value, created): (Value, Timestamp) = serde_cbor::from_slice(&bytes)?;
    Ok(Some(CacheEntry { value, created }))
}

fn write_entry(path: &Path, value: &Value, created: Timestamp) -> Result<(), CacheError> {
    let bytes = serde_cbor::to_vec(&(value, created))?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn remove_quietly(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), %err, "cannot remove cache entry");
        }
    }
}
