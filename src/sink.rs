//! Sinks ship finished records.
//!
//! A sink reads a root record (flattened or rendered) before the owning
//! boundary calls [`Record::finish`]; finishing destroys the data.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use crate::record::{FlatValues, Record};
use crate::{Error, Result};

/// Consumer of finished wide events.
pub trait Sink: Send + Sync {
    /// Ship one record. Must not call `finish`.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be serialized or written.
    fn emit(&self, record: &Record) -> Result<()>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn emit(&self, record: &Record) -> Result<()> {
        (**self).emit(record)
    }
}

impl<S: Sink + ?Sized> Sink for &S {
    fn emit(&self, record: &Record) -> Result<()> {
        (**self).emit(record)
    }
}

/// Writes one flattened JSON object per line.
///
/// ```rust
/// use wide_event::{JsonSink, Record, Sink};
///
/// let sink = JsonSink::new(Vec::new());
/// let record = Record::new("job");
/// record.sub("db").set("rows", 3);
/// sink.emit(&record)?;
/// record.finish();
///
/// let out = String::from_utf8(sink.into_inner()?).unwrap();
/// assert_eq!(out, "{\"$event\":\"job\",\"db.rows\":3}\n");
/// # Ok::<(), wide_event::Error>(())
/// ```
#[derive(Debug)]
pub struct JsonSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonSink<W> {
    /// Wrap a writer.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    ///
    /// # Errors
    ///
    /// Returns error if a writer panicked while holding the lock.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::SinkPoisoned(e.to_string()))
    }
}

impl<W: Write + Send> Sink for JsonSink<W> {
    fn emit(&self, record: &Record) -> Result<()> {
        let payload = record.all_values();
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| Error::SinkPoisoned(e.to_string()))?;
        serde_json::to_writer(&mut *writer, &payload)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Emits each record as one `tracing` event at INFO level, target
/// `wide_event`, with the flattened JSON in the `payload` field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn emit(&self, record: &Record) -> Result<()> {
        let payload = serde_json::to_string(&record.all_values())?;
        tracing::info!(
            target: "wide_event",
            event = record.event_name().unwrap_or_default(),
            payload = %payload,
            "wide event"
        );
        Ok(())
    }
}

/// Collects flattened records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<FlatValues>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of every collected record, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<FlatValues> {
        self.lock().clone()
    }

    /// Remove and return every collected record.
    pub fn take(&self) -> Vec<FlatValues> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<FlatValues>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Sink for MemorySink {
    fn emit(&self, record: &Record) -> Result<()> {
        let flat = record.all_values();
        self.lock().push(flat);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_memory_sink_collects_flat_values() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        let record = Record::new("job");
        record.set("ok", true);
        sink.emit(&record).unwrap();
        record.finish();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["ok"], Value::Bool(true));
        assert_eq!(events[0]["$event"], Value::from("job"));
    }

    #[test]
    fn test_memory_sink_survives_finish() {
        let sink = MemorySink::new();
        let record = Record::new("job");
        record.sub("a").set("b", 1);
        sink.emit(&record).unwrap();
        record.finish();
        assert_eq!(sink.take()[0]["a.b"], Value::Int(1));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_json_sink_one_line_per_event() {
        let sink = JsonSink::new(Vec::new());
        for i in 0..3 {
            let record = Record::new("job");
            record.set("i", i);
            sink.emit(&record).unwrap();
            record.finish();
        }
        let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last, serde_json::json!({"$event": "job", "i": 2}));
    }

    #[test]
    fn test_arc_sink_delegates() {
        let sink = Arc::new(MemorySink::new());
        let shared: Arc<dyn Sink> = sink.clone();
        let record = Record::new("job");
        shared.emit(&record).unwrap();
        record.finish();
        assert_eq!(sink.len(), 1);
    }
}
