//! Record nodes
//!
//! A [`Record`] is a cheap, cloneable handle to one node of a wide-event
//! tree. Each node guards its own field map with its own lock, so writers
//! working on different groups never contend.
//!
//! ## Lifecycle
//!
//! ```text
//! created ──set/add/sub──▶ active ──finish──▶ finished
//! ```
//!
//! `finish` is terminal and recursive: every nested group is finished and
//! every field map goes back to its pool. Reads on a finished node see no
//! values; writes are fatal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{
    Arc, Mutex, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use serde::{Serialize, Serializer};

use crate::error::{fatal, UsageError};
use crate::key;
use crate::merge::merge_into;
use crate::pool::{FieldMap, MapPool};
use crate::value::Value;

/// Key under which the event name appears in flattened and rendered output.
pub const EVENT_KEY: &str = "$event";

/// Flattened view of a record tree, as handed to a sink.
pub type FlatValues = BTreeMap<String, Value>;

#[derive(Clone, Copy)]
enum Mode {
    Set,
    Add,
}

/// Serializes group attachment so two concurrent `set`s cannot close a
/// cycle between them.
static ATTACH: Mutex<()> = Mutex::new(());

struct Node {
    event: Option<String>,
    pool: Arc<MapPool>,
    /// Set once, when the node is placed under a parent.
    parent: OnceLock<Weak<Node>>,
    /// Created by `sub`; its slot in the parent is never replaced.
    pinned: bool,
    values: RwLock<Option<FieldMap>>,
}

/// Handle to a node in a wide-event tree.
///
/// Clones share the node. Equality of handles is node identity; see
/// [`Record::ptr_eq`].
///
/// ```rust
/// use wide_event::{Record, Value};
///
/// let root = Record::new("http_request");
/// root.set("method", "GET");
/// root.sub("response").set("code", 200);
/// root.add("retries", 1).add("retries", 1);
///
/// let flat = root.all_values();
/// assert_eq!(flat["$event"], Value::from("http_request"));
/// assert_eq!(flat["response.code"], Value::Int(200));
/// assert_eq!(flat["retries"], Value::Int(2));
/// root.finish();
/// ```
#[derive(Clone)]
pub struct Record {
    node: Arc<Node>,
}

impl Record {
    /// Create a root record for one unit of work, drawing storage from the
    /// global pool.
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self::new_in(MapPool::global(), event)
    }

    /// Create a root record drawing storage from `pool`. Groups created
    /// beneath it use the same pool.
    #[must_use]
    pub fn new_in(pool: &Arc<MapPool>, event: impl Into<String>) -> Self {
        let event = event.into();
        tracing::debug!(event = %event, "wide event started");
        Self::alloc(pool, Some(event), None)
    }

    /// Build a free-standing group to store as a value under some key.
    ///
    /// Unlike [`sub`](Self::sub), the group has no identity under a parent:
    /// setting a new group under the same key replaces (and finishes) the
    /// old one. A group can be stored in one place only.
    #[track_caller]
    pub fn group<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let group = Self::alloc(MapPool::global(), None, None);
        group.set_all(pairs);
        group
    }

    fn alloc(pool: &Arc<MapPool>, event: Option<String>, parent: Option<&Self>) -> Self {
        Self {
            node: Arc::new(Node {
                event,
                pool: Arc::clone(pool),
                pinned: parent.is_some(),
                parent: parent
                    .map_or_else(OnceLock::new, |p| OnceLock::from(Arc::downgrade(&p.node))),
                values: RwLock::new(Some(pool.checkout())),
            }),
        }
    }

    /// This node followed by each live ancestor up to the root.
    fn lineage(&self) -> impl Iterator<Item = Arc<Node>> {
        std::iter::successors(Some(Arc::clone(&self.node)), |node| {
            node.parent.get().and_then(Weak::upgrade)
        })
    }

    /// Record `self` as the parent of `group` stored under `key`.
    fn attach(&self, key: &str, group: &Self) -> Result<(), UsageError> {
        if group.event_name().is_some() {
            return Err(UsageError::RootAsGroup(key.to_string()));
        }
        let _serial = ATTACH.lock().unwrap_or_else(PoisonError::into_inner);
        if group.node.parent.get().is_some() {
            return Err(UsageError::AlreadyAttached(key.to_string()));
        }
        if self.lineage().any(|node| Arc::ptr_eq(&node, &group.node)) {
            return Err(UsageError::Cycle(key.to_string()));
        }
        group
            .node
            .parent
            .set(Arc::downgrade(&self.node))
            .map_err(|_| UsageError::AlreadyAttached(key.to_string()))
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<FieldMap>> {
        self.node.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<FieldMap>> {
        self.node.values.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Event name, present on roots only.
    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.node.event.as_deref()
    }

    /// Returns `true` if both handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Number of fields stored directly on this node.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().as_ref().map_or(0, FieldMap::len)
    }

    /// Returns `true` if this node stores no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`finish`](Self::finish) has run on this node.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.read().is_none()
    }

    /// Store `value` under `key`, overwriting any scalar already there.
    ///
    /// # Panics
    ///
    /// Panics on an invalid key, when `key` is bound to a group made by
    /// [`sub`](Self::sub) (or `value` is a group and `key` is bound to a
    /// scalar), when `value` is a root or a group already stored elsewhere,
    /// or after `finish`.
    #[track_caller]
    pub fn set(&self, key: &str, value: impl Into<Value>) -> &Self {
        self.set_all([(key, value)])
    }

    /// Combine `value` into the field under `key` using the merge rules in
    /// [`merge`](crate::merge); behaves like [`set`](Self::set) when the
    /// key is absent.
    ///
    /// # Panics
    ///
    /// Panics when the stored and incoming values have no merge rule, plus
    /// every case [`set`](Self::set) panics on.
    #[track_caller]
    pub fn add(&self, key: &str, value: impl Into<Value>) -> &Self {
        self.add_all([(key, value)])
    }

    /// [`set`](Self::set) several fields under one lock acquisition.
    #[track_caller]
    pub fn set_all<I, K, V>(&self, pairs: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.apply(Mode::Set, pairs)
    }

    /// [`add`](Self::add) several fields under one lock acquisition.
    #[track_caller]
    pub fn add_all<I, K, V>(&self, pairs: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.apply(Mode::Add, pairs)
    }

    /// [`set`](Self::set) from a flat, alternating key/value argument list.
    ///
    /// # Panics
    ///
    /// Panics on an odd-length list or a non-string key, plus every case
    /// [`set`](Self::set) panics on.
    #[track_caller]
    pub fn set_args(&self, args: Vec<Value>) -> &Self {
        self.apply(Mode::Set, pair_up(args))
    }

    /// [`add`](Self::add) from a flat, alternating key/value argument list.
    #[track_caller]
    pub fn add_args(&self, args: Vec<Value>) -> &Self {
        self.apply(Mode::Add, pair_up(args))
    }

    #[track_caller]
    fn apply<I, K, V>(&self, mode: Mode, pairs: I) -> &Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let pairs: Vec<(K, Value)> = pairs.into_iter().map(|(k, v)| (k, v.into())).collect();
        for (k, _) in &pairs {
            key::check(k.as_ref());
        }

        let outcome = {
            let mut guard = self.write();
            match guard.as_mut() {
                Some(map) => pairs
                    .into_iter()
                    .try_for_each(|(k, v)| self.store(map, mode, k.as_ref(), v)),
                None => Err(UsageError::Finished),
            }
        };
        if let Err(err) = outcome {
            fatal(err);
        }
        self
    }

    /// Get or create the nested group `name`.
    ///
    /// Every caller asking for the same name on the same parent, including
    /// concurrent ones, receives the same node.
    ///
    /// # Panics
    ///
    /// Panics on an invalid name, when `name` is bound to a non-group value,
    /// or after `finish`.
    #[track_caller]
    #[must_use]
    pub fn sub(&self, name: &str) -> Self {
        key::check(name);

        if let Some(map) = self.read().as_ref() {
            if let Some(Value::Group(child)) = map.get(name) {
                return child.clone();
            }
        }

        let outcome = {
            let mut guard = self.write();
            match guard.as_mut() {
                None => Err(UsageError::Finished),
                Some(map) => match map.get(name) {
                    Some(Value::Group(child)) => Ok(child.clone()),
                    Some(_) => Err(UsageError::ScalarRebind(name.to_string())),
                    None => {
                        let child = Self::alloc(&self.node.pool, None, Some(self));
                        map.insert(name.to_string(), Value::Group(child.clone()));
                        Ok(child)
                    }
                },
            }
        };
        match outcome {
            Ok(child) => child,
            Err(err) => fatal(err),
        }
    }

    /// Look up a `.`-separated path through nested groups.
    ///
    /// Never creates nodes. Returns `None` if any segment is missing or if an
    /// intermediate segment is not a group.
    #[must_use]
    pub fn value(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let last = segments.next_back()?;
        let mut node = self.clone();
        for segment in segments {
            let next = node.read().as_ref()?.get(segment)?.as_group()?.clone();
            node = next;
        }
        let found = node.read().as_ref()?.get(last).cloned();
        found
    }

    /// Flatten the whole subtree into one map with `.`-joined keys.
    ///
    /// Nested groups and describable values are inlined; the event name, if
    /// any, appears under [`EVENT_KEY`]. This is the payload a sink ships.
    #[must_use]
    pub fn all_values(&self) -> FlatValues {
        let mut out = FlatValues::new();
        if let Some(event) = self.event_name() {
            out.insert(EVENT_KEY.to_string(), Value::from(event));
        }
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut FlatValues) {
        for (k, v) in self.snapshot() {
            flatten_entry(join(prefix, &k), v, out);
        }
    }

    fn snapshot(&self) -> Vec<(String, Value)> {
        self.read().as_ref().map_or_else(Vec::new, |map| {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        })
    }

    /// Render the subtree as a nested JSON object for a structured logging
    /// backend. Describable values render through their own fields.
    #[must_use]
    pub fn render(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        if let Some(event) = self.event_name() {
            object.insert(EVENT_KEY.to_string(), serde_json::Value::from(event));
        }
        let mut fields = self.snapshot();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in fields {
            object.insert(k, v.to_json());
        }
        serde_json::Value::Object(object)
    }

    /// Finish this node and every group beneath it, returning their storage
    /// to the pool.
    ///
    /// Call exactly once per root, after the sink has read the record and
    /// all writers are done. Finishing an already finished node does
    /// nothing.
    pub fn finish(&self) {
        let Some(map) = self.write().take() else {
            return;
        };
        for value in map.values() {
            if let Value::Group(child) = value {
                child.finish();
            }
        }
        if let Some(event) = self.event_name() {
            tracing::debug!(event = %event, fields = map.len(), "wide event finished");
        }
        self.node.pool.give_back(map);
    }

    fn store(
        &self,
        map: &mut FieldMap,
        mode: Mode,
        key: &str,
        value: Value,
    ) -> Result<(), UsageError> {
        match (map.get_mut(key), mode, value) {
            (Some(Value::Group(old)), Mode::Set, Value::Group(new)) if !old.node.pinned => {
                if old.ptr_eq(&new) {
                    return Ok(());
                }
                self.attach(key, &new)?;
                std::mem::replace(old, new).finish();
                Ok(())
            }
            (Some(Value::Group(_)), _, _) => Err(UsageError::GroupRebind(key.to_string())),
            (Some(_), _, Value::Group(_)) => Err(UsageError::ScalarRebind(key.to_string())),
            (Some(existing), Mode::Add, value) => {
                merge_into(key, existing, value);
                Ok(())
            }
            (Some(existing), Mode::Set, value) => {
                *existing = value;
                Ok(())
            }
            (None, _, value) => {
                if let Value::Group(group) = &value {
                    self.attach(key, group)?;
                }
                map.insert(key.to_string(), value);
                Ok(())
            }
        }
    }
}

#[track_caller]
fn pair_up(args: Vec<Value>) -> Vec<(String, Value)> {
    if args.len() % 2 != 0 {
        fatal(UsageError::OddArguments(args.len()));
    }
    let mut pairs = Vec::with_capacity(args.len() / 2);
    let mut iter = args.into_iter().enumerate();
    while let (Some((i, k)), Some((_, v))) = (iter.next(), iter.next()) {
        match k {
            Value::Str(k) => pairs.push((k, v)),
            other => fatal(UsageError::NonStringKey(i, other.kind())),
        }
    }
    pairs
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn flatten_entry(key: String, value: Value, out: &mut FlatValues) {
    match value {
        Value::Group(child) => child.flatten_into(&key, out),
        Value::Describe(d) => {
            for (k, v) in d.describe() {
                flatten_entry(join(&key, &k), v, out);
            }
        }
        scalar => {
            out.insert(key, scalar);
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("event", &self.node.event)
            .field("fields", &self.len())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.render().serialize(serializer)
    }
}
