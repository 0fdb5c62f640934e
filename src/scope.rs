//! Scope propagation
//!
//! A [`Scope`] carries two record handles down a call chain:
//!
//! - **current**: where this stage should write its fields
//! - **root**: the record for the whole unit of work
//!
//! Scopes are plain values. Pass them explicitly, or install one in the
//! thread-ambient slot with [`Scope::enter`] for code that cannot take an
//! extra parameter.
//!
//! ```rust
//! use wide_event::Scope;
//!
//! let (scope, root) = Scope::background().new_record("http_request");
//! scope.get().set("method", "GET");
//!
//! let db = scope.wrap(&scope.get().sub("db"));
//! db.get().set("rows", 3);
//! assert!(db.root().ptr_eq(&root));
//!
//! assert_eq!(root.value("db.rows"), Some(3.into()));
//! root.finish();
//! ```

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{fatal, UsageError};
use crate::pool::MapPool;
use crate::record::Record;

/// Current/root record pair for one call chain.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    current: Option<Record>,
    root: Option<Record>,
}

impl Scope {
    /// Scope with no records. [`get`](Self::get) and [`root`](Self::root)
    /// are fatal until a root is established with
    /// [`new_record`](Self::new_record).
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Create a root record tagged `event` and a derived scope where both
    /// current and root point at it.
    #[must_use]
    pub fn new_record(&self, event: impl Into<String>) -> (Self, Record) {
        self.new_record_in(MapPool::global(), event)
    }

    /// [`new_record`](Self::new_record) drawing storage from `pool`.
    #[must_use]
    pub fn new_record_in(&self, pool: &Arc<MapPool>, event: impl Into<String>) -> (Self, Record) {
        let record = Record::new_in(pool, event);
        let scope = Self {
            current: Some(record.clone()),
            root: Some(record.clone()),
        };
        (scope, record)
    }

    /// Derive a scope whose current record is `record`; the root is kept.
    #[must_use]
    pub fn wrap(&self, record: &Record) -> Self {
        Self {
            current: Some(record.clone()),
            root: self.root.clone(),
        }
    }

    /// Record the current stage writes into.
    ///
    /// # Panics
    ///
    /// Panics if the scope was never initialized with a root.
    #[track_caller]
    #[must_use]
    pub fn get(&self) -> &Record {
        match &self.current {
            Some(record) => record,
            None => fatal(UsageError::UninitializedScope("current")),
        }
    }

    /// Record for the whole unit of work.
    ///
    /// # Panics
    ///
    /// Panics if the scope was never initialized with a root.
    #[track_caller]
    #[must_use]
    pub fn root(&self) -> &Record {
        match &self.root {
            Some(record) => record,
            None => fatal(UsageError::UninitializedScope("root")),
        }
    }

    /// Returns `true` once a root has been established.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.root.is_some()
    }

    /// Install this scope as the thread's ambient scope until the guard is
    /// dropped; the previous ambient scope is then restored.
    #[must_use = "the scope is uninstalled when the guard is dropped"]
    pub fn enter(&self) -> ScopeGuard {
        let prev = AMBIENT.with(|slot| slot.replace(Some(self.clone())));
        ScopeGuard {
            prev,
            _not_send: PhantomData,
        }
    }

    /// The thread's ambient scope, if one is installed.
    #[must_use]
    pub fn ambient() -> Option<Self> {
        AMBIENT.with(|slot| slot.borrow().clone())
    }
}

thread_local! {
    static AMBIENT: RefCell<Option<Scope>> = const { RefCell::new(None) };
}

/// Restores the previous ambient scope on drop.
#[derive(Debug)]
pub struct ScopeGuard {
    prev: Option<Scope>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        AMBIENT.with(|slot| {
            *slot.borrow_mut() = prev;
        });
    }
}

/// Current record of the thread's ambient scope.
///
/// # Panics
///
/// Panics if no initialized scope is installed.
#[track_caller]
#[must_use]
pub fn current() -> Record {
    match Scope::ambient() {
        Some(scope) if scope.current.is_some() => scope.get().clone(),
        _ => fatal(UsageError::UninitializedScope("current")),
    }
}

/// Root record of the thread's ambient scope.
///
/// # Panics
///
/// Panics if no initialized scope is installed.
#[track_caller]
#[must_use]
pub fn root() -> Record {
    match Scope::ambient() {
        Some(scope) if scope.is_initialized() => scope.root().clone(),
        _ => fatal(UsageError::UninitializedScope("root")),
    }
}
