//! # wide-event: one rich record per unit of work
//!
//! A wide event is a single structured record capturing everything relevant
//! to one unit of work (typically one HTTP request). Every layer the request
//! passes through adds fields to it; it is emitted exactly once at the end.
//!
//! ## Flow
//!
//! ```text
//! boundary ──Scope::new_record──▶ root Record ──▶ Scope
//!                                                   │
//! producers ──scope.get().set/add/sub───────────────┘
//!                                                   │
//! boundary ──Sink::emit(all_values)──▶ Record::finish (storage back to pool)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use wide_event::{Scope, Value};
//!
//! let (scope, root) = Scope::background().new_record("http_request");
//! scope.get().set("method", "GET");
//! scope.get().sub("response").set("code", 200);
//!
//! let flat = root.all_values();
//! assert_eq!(flat["$event"], Value::from("http_request"));
//! assert_eq!(flat["method"], Value::from("GET"));
//! assert_eq!(flat["response.code"], Value::Int(200));
//! root.finish();
//! ```
//!
//! ## Usage errors
//!
//! Malformed keys, role rebinding between groups and values, unmergeable
//! `add` calls, uninitialized scopes and writes after `finish` are bugs in
//! the instrumentation, not runtime conditions. They panic (see
//! [`UsageError`]).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod key;
pub mod merge;
pub mod pool;
pub mod record;
pub mod scope;
pub mod sink;
pub mod unit;
pub mod value;

pub use error::{Error, Result, UsageError};
pub use key::valid;
pub use merge::{ErrorList, ErrorValue};
pub use pool::{MapPool, PoolConfig, PoolStats};
pub use record::{FlatValues, Record, EVENT_KEY};
pub use scope::{Scope, ScopeGuard};
pub use sink::{JsonSink, MemorySink, Sink, TracingSink};
pub use unit::UnitOfWork;
pub use value::{Describe, Fields, Value};
