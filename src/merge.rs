//! Merge engine for repeated `add` calls on one field.
//!
//! Dispatch is on the variant pair, in this order:
//!
//! | stored  | incoming | result                                   |
//! |---------|----------|------------------------------------------|
//! | `Int`   | `Int`    | wrapping sum                             |
//! | `Uint`  | `Uint`   | wrapping sum                             |
//! | `Float` | `Float`  | sum                                      |
//! | `Error` | `Error`  | containment collapse, else [`ErrorList`] |
//! | other   | other    | fatal [`UsageError::Unmergeable`]        |

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::error::{fatal, UsageError};
use crate::value::Value;

type DynError = dyn StdError + Send + Sync + 'static;
type DynLink = dyn StdError + 'static;

/// Shared handle to an error chain stored in a record.
#[derive(Clone)]
pub struct ErrorValue(Arc<DynError>);

impl ErrorValue {
    /// Wrap an error.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Borrow the underlying error.
    #[must_use]
    pub fn get(&self) -> &DynLink {
        &*self.0
    }

    /// Downcast the head of the chain.
    #[must_use]
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.get().downcast_ref::<T>()
    }

    /// Aggregate this value holds, if it is one.
    #[must_use]
    pub fn as_list(&self) -> Option<&ErrorList> {
        self.downcast_ref::<ErrorList>()
    }

    /// Iterate the `source()` chain, starting with this error.
    pub fn chain(&self) -> impl Iterator<Item = &DynLink> {
        std::iter::successors(Some(self.get()), |&e| e.source())
    }

    /// Returns `true` if this error's chain already represents `other`.
    ///
    /// A link represents `other` when it is the same object, or when it
    /// renders identically (both `Display` and `Debug`, so differently typed
    /// errors with the same message stay distinct) and has an identical
    /// source chain. Aggregates are searched member by member.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        represents(self.get(), other.get())
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self.as_list() {
            Some(list) => serde_json::Value::Array(list.0.iter().map(Self::to_json).collect()),
            None => serde_json::Value::String(self.to_string()),
        }
    }
}

impl From<anyhow::Error> for ErrorValue {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::from(Box::<DynError>::from(err)))
    }
}

impl From<Box<DynError>> for ErrorValue {
    fn from(err: Box<DynError>) -> Self {
        Self(Arc::from(err))
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl PartialEq for ErrorValue {
    fn eq(&self, other: &Self) -> bool {
        same_error(self.get(), other.get())
    }
}

/// Several unrelated errors recorded under one key.
#[derive(Debug, Clone)]
pub struct ErrorList(Vec<ErrorValue>);

impl ErrorList {
    /// Member errors, oldest first.
    #[must_use]
    pub fn errors(&self) -> &[ErrorValue] {
        &self.0
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl StdError for ErrorList {}

fn same_error(a: &DynLink, b: &DynLink) -> bool {
    let (mut a, mut b) = (a, b);
    loop {
        let (pa, pb): (*const DynLink, *const DynLink) = (a, b);
        if std::ptr::eq(pa.cast::<()>(), pb.cast::<()>()) {
            return true;
        }
        if a.to_string() != b.to_string() || format!("{a:?}") != format!("{b:?}") {
            return false;
        }
        match (a.source(), b.source()) {
            (Some(x), Some(y)) => (a, b) = (x, y),
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn represents(holder: &DynLink, target: &DynLink) -> bool {
    std::iter::successors(Some(holder), |&e| e.source()).any(|link| {
        same_error(link, target)
            || link
                .downcast_ref::<ErrorList>()
                .is_some_and(|list| list.0.iter().any(|member| represents(member.get(), target)))
    })
}

fn merge_errors(existing: &ErrorValue, incoming: ErrorValue) -> ErrorValue {
    if existing.contains(&incoming) {
        return existing.clone();
    }
    if incoming.contains(existing) {
        return incoming;
    }
    let mut members = match existing.as_list() {
        Some(list) => list.0.clone(),
        None => vec![existing.clone()],
    };
    members.push(incoming);
    ErrorValue::new(ErrorList(members))
}

/// Combine `incoming` into the value already stored under `key`.
#[track_caller]
pub(crate) fn merge_into(key: &str, slot: &mut Value, incoming: Value) {
    let merged = match (&*slot, incoming) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(b)),
        (Value::Uint(a), Value::Uint(b)) => Value::Uint(a.wrapping_add(b)),
        (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
        (Value::Error(a), Value::Error(b)) => Value::Error(merge_errors(a, b)),
        (existing, incoming) => fatal(UsageError::Unmergeable {
            key: key.to_string(),
            existing: existing.kind(),
            new: incoming.kind(),
        }),
    };
    *slot = merged;
}
