//! Field-map pool
//!
//! Every record node owns one field map for its lifetime. Maps are checked
//! out when a node is created and handed back (cleared) when the node is
//! finished, so steady-state request handling reuses storage instead of
//! allocating a fresh map per node.
//!
//! The pool is the only state shared between unrelated units of work; it is
//! reached through [`Record`](crate::Record) creation and `finish`, never
//! directly by producers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Storage behind one record node.
pub(crate) type FieldMap = FxHashMap<String, Value>;

/// Default initial capacity of a freshly allocated field map
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Default number of idle maps retained by a pool
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Pool sizing.
///
/// ```rust
/// use wide_event::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(r#"{"max_idle": 64}"#).unwrap();
/// assert_eq!(config.max_idle, 64);
/// assert_eq!(config.initial_capacity, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Capacity of maps allocated when the pool is empty.
    pub initial_capacity: usize,
    /// Idle maps kept for reuse; extra returned maps are dropped.
    pub max_idle: usize,
}

impl PoolConfig {
    /// Set the initial capacity of newly allocated maps.
    #[must_use]
    pub const fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Set the number of idle maps retained.
    #[must_use]
    pub const fn max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_idle: DEFAULT_MAX_IDLE,
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Maps currently waiting for reuse.
    pub idle: usize,
    /// Maps handed out to new nodes.
    pub checkouts: u64,
    /// Maps given back by finished nodes.
    pub returns: u64,
    /// Checkouts that had to allocate because the pool was empty.
    pub allocations: u64,
}

/// Reusable field-map storage.
#[derive(Debug)]
pub struct MapPool {
    config: PoolConfig,
    idle: Mutex<Vec<FieldMap>>,
    checkouts: AtomicU64,
    returns: AtomicU64,
    allocations: AtomicU64,
}

impl MapPool {
    /// Create a pool with default sizing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create a pool with explicit sizing.
    #[must_use]
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(Vec::new()),
            checkouts: AtomicU64::new(0),
            returns: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
        }
    }

    /// Process-wide pool used by [`Record::new`](crate::Record::new).
    #[must_use]
    pub fn global() -> &'static Arc<Self> {
        static GLOBAL: OnceLock<Arc<MapPool>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Self::new()))
    }

    /// Sizing this pool was created with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().unwrap_or_else(PoisonError::into_inner).len(),
            checkouts: self.checkouts.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn checkout(&self) -> FieldMap {
        self.checkouts.fetch_add(1, Ordering::Relaxed);
        let reused = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        reused.unwrap_or_else(|| {
            self.allocations.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(capacity = self.config.initial_capacity, "allocating field map");
            FxHashMap::with_capacity_and_hasher(self.config.initial_capacity, Default::default())
        })
    }

    pub(crate) fn give_back(&self, mut map: FieldMap) {
        map.clear();
        self.returns.fetch_add(1, Ordering::Relaxed);
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.config.max_idle {
            idle.push(map);
        }
    }
}

impl Default for MapPool {
    fn default() -> Self {
        Self::new()
    }
}
