//! Unit-of-work boundary
//!
//! [`UnitOfWork`] owns one root record from creation to `finish`. It
//! guarantees the emit-then-finish order on every exit path: explicit
//! [`complete`](UnitOfWork::complete), early return, or panic.
//!
//! ```rust
//! use std::sync::Arc;
//! use wide_event::{MemorySink, Scope, UnitOfWork, Value};
//!
//! let sink = Arc::new(MemorySink::new());
//! let unit = UnitOfWork::start(&Scope::background(), "http_request", Arc::clone(&sink));
//! unit.scope().get().set("method", "GET");
//! unit.complete()?;
//!
//! assert_eq!(sink.events()[0]["method"], Value::from("GET"));
//! # Ok::<(), wide_event::Error>(())
//! ```

use crate::record::Record;
use crate::scope::Scope;
use crate::sink::Sink;
use crate::Result;

/// Exclusive owner of one root record and its subtree.
pub struct UnitOfWork<S: Sink> {
    scope: Scope,
    record: Record,
    sink: S,
    done: bool,
}

impl<S: Sink> UnitOfWork<S> {
    /// Create the root record for `event` and the scope pointing at it.
    #[must_use]
    pub fn start(parent: &Scope, event: impl Into<String>, sink: S) -> Self {
        let (scope, record) = parent.new_record(event);
        Self {
            scope,
            record,
            sink,
            done: false,
        }
    }

    /// Scope to hand to producers.
    #[must_use]
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The root record.
    #[must_use]
    pub const fn record(&self) -> &Record {
        &self.record
    }

    /// Emit the record to the sink, then finish it.
    ///
    /// # Errors
    ///
    /// Returns the sink's error. The record is finished either way.
    pub fn complete(mut self) -> Result<()> {
        self.done = true;
        let emitted = self.sink.emit(&self.record);
        self.record.finish();
        emitted
    }
}

impl<S: Sink> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let event = self.record.event_name().unwrap_or_default();
        tracing::warn!(
            event = %event,
            panicking = std::thread::panicking(),
            "unit of work dropped without complete()"
        );
        if let Err(err) = self.sink.emit(&self.record) {
            tracing::warn!(event = %event, error = %err, "failed to emit wide event");
        }
        self.record.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::value::Value;
    use std::panic::AssertUnwindSafe;
    use std::sync::Arc;

    #[test]
    fn test_complete_emits_then_finishes() {
        let sink = Arc::new(MemorySink::new());
        let unit = UnitOfWork::start(&Scope::background(), "job", Arc::clone(&sink));
        let record = unit.record().clone();
        unit.scope().get().sub("step").set("ok", true);
        unit.complete().unwrap();

        assert!(record.is_finished());
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["step.ok"], Value::Bool(true));
    }

    #[test]
    fn test_drop_emits_once() {
        let sink = Arc::new(MemorySink::new());
        let record = {
            let unit = UnitOfWork::start(&Scope::background(), "job", Arc::clone(&sink));
            unit.record().set("early", true);
            unit.record().clone()
        };
        assert!(record.is_finished());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_panic_path_still_emits() {
        let sink = Arc::new(MemorySink::new());
        let inner = Arc::clone(&sink);
        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let unit = UnitOfWork::start(&Scope::background(), "job", inner);
            unit.record().set("stage", "parse");
            panic!("handler blew up");
        }));
        assert!(result.is_err());
        assert_eq!(sink.events()[0]["stage"], Value::from("parse"));
    }
}
