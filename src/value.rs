//! Record values
//!
//! A record field holds exactly one [`Value`]. The variant set is closed so
//! the merge, flatten and render paths stay exhaustive:
//!
//! ```text
//! Value ─┬─ Int / Uint / Float     (mergeable: arithmetic sum)
//!        ├─ Error                  (mergeable: chain containment)
//!        ├─ Bool / Str / Time / Duration / Json   (opaque scalars)
//!        ├─ Group                  (nested record)
//!        └─ Describe               (self-describing domain value)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::merge::ErrorValue;
use crate::record::Record;

/// Structured fields contributed by a [`Describe`] implementation.
pub type Fields = Vec<(String, Value)>;

/// Capability for arbitrary domain types to contribute their own fields.
///
/// Wherever a describable value is stored, flattening and rendering inline
/// the returned fields under the value's key.
///
/// ```rust
/// use wide_event::{Describe, Fields, Record, Value};
///
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// impl Describe for User {
///     fn describe(&self) -> Fields {
///         vec![
///             ("id".to_string(), self.id.into()),
///             ("name".to_string(), self.name.as_str().into()),
///         ]
///     }
/// }
///
/// let record = Record::new("login");
/// record.set("user", Value::describe(User { id: 7, name: "ada".into() }));
/// assert_eq!(record.all_values()["user.id"], Value::Uint(7));
/// # record.finish();
/// ```
pub trait Describe: Send + Sync {
    /// Fields describing this value.
    fn describe(&self) -> Fields;
}

/// A single field value.
#[derive(Clone)]
pub enum Value {
    /// Signed integer of any width
    Int(i64),
    /// Unsigned integer of any width
    Uint(u64),
    /// Floating point number
    Float(f64),
    /// Boolean flag
    Bool(bool),
    /// Text
    Str(String),
    /// Wall-clock timestamp
    Time(DateTime<Utc>),
    /// Elapsed time
    Duration(Duration),
    /// Pre-structured JSON
    Json(serde_json::Value),
    /// Error chain (or an aggregate of several)
    Error(ErrorValue),
    /// Nested record
    Group(Record),
    /// Self-describing domain value
    Describe(Arc<dyn Describe>),
}

impl Value {
    /// Wrap any error as a value.
    pub fn error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Error(ErrorValue::new(err))
    }

    /// Wrap a describable value.
    pub fn describe<D: Describe + 'static>(value: D) -> Self {
        Self::Describe(Arc::new(value))
    }

    /// Short name of the variant, used in usage-error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::Time(_) => "time",
            Self::Duration(_) => "duration",
            Self::Json(_) => "json",
            Self::Error(_) => "error",
            Self::Group(_) => "group",
            Self::Describe(_) => "describe",
        }
    }

    /// Returns `true` for nested records.
    #[must_use]
    pub const fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Nested record, if this is a group.
    #[must_use]
    pub const fn as_group(&self) -> Option<&Record> {
        match self {
            Self::Group(record) => Some(record),
            _ => None,
        }
    }

    /// Error chain, if this is an error.
    #[must_use]
    pub const fn as_error(&self) -> Option<&ErrorValue> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Text, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Structured JSON rendering. Groups and describable values become
    /// nested objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Self::Int(n) => Json::from(*n),
            Self::Uint(n) => Json::from(*n),
            Self::Float(f) => Json::from(*f),
            Self::Bool(b) => Json::Bool(*b),
            Self::Str(s) => Json::String(s.clone()),
            Self::Time(t) => Json::String(rfc3339(t)),
            Self::Duration(d) => Json::String(format!("{d:?}")),
            Self::Json(j) => j.clone(),
            Self::Error(err) => err.to_json(),
            Self::Group(record) => record.render(),
            Self::Describe(d) => Json::Object(
                d.describe()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Duration(a), Self::Duration(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Group(a), Self::Group(b)) => a.ptr_eq(b),
            (Self::Describe(a), Self::Describe(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Uint(n) => write!(f, "Uint({n})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Time(t) => write!(f, "Time({t})"),
            Self::Duration(d) => write!(f, "Duration({d:?})"),
            Self::Json(j) => write!(f, "Json({j})"),
            Self::Error(err) => write!(f, "Error({err})"),
            Self::Group(record) => write!(f, "Group({record:?})"),
            Self::Describe(_) => write!(f, "Describe({})", self.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Uint(n) => serializer.serialize_u64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Time(t) => serializer.serialize_str(&rfc3339(t)),
            Self::Json(j) => j.serialize(serializer),
            _ => self.to_json().serialize(serializer),
        }
    }
}

fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

macro_rules! from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Self::Int(i64::from(n))
            }
        }
    )*};
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Self::Uint(u64::from(n))
            }
        }
    )*};
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64);

impl From<isize> for Value {
    #[allow(clippy::cast_possible_truncation)]
    fn from(n: isize) -> Self {
        Self::Int(n as i64)
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_possible_truncation)]
    fn from(n: usize) -> Self {
        Self::Uint(n as u64)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Self::Float(f64::from(x))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Time(t)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Self::Json(j)
    }
}

impl From<ErrorValue> for Value {
    fn from(err: ErrorValue) -> Self {
        Self::Error(err)
    }
}

impl From<std::io::Error> for Value {
    fn from(err: std::io::Error) -> Self {
        Self::error(err)
    }
}

impl From<anyhow::Error> for Value {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(ErrorValue::from(err))
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Group(record)
    }
}

impl From<&Record> for Value {
    fn from(record: &Record) -> Self {
        Self::Group(record.clone())
    }
}

impl From<Arc<dyn Describe>> for Value {
    fn from(d: Arc<dyn Describe>) -> Self {
        Self::Describe(d)
    }
}
