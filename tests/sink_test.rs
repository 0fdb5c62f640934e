//! Sink contract tests
//!
//! A sink reads the fully assembled tree before `finish`; what it captured
//! must survive the finish that follows.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use wide_event::{JsonSink, MemorySink, Record, Scope, Sink, TracingSink, UnitOfWork, Value};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn request(scope: &Scope) {
    scope.get().set("method", "POST");
    let db = scope.wrap(&scope.get().sub("db"));
    db.get().add("queries", 1).add("queries", 1);
    db.root().set("status", 201);
}

#[test]
fn test_json_sink_writes_flat_object() {
    let buf = SharedBuf::default();
    let unit = UnitOfWork::start(&Scope::background(), "http_request", JsonSink::new(buf.clone()));
    request(unit.scope());
    unit.complete().unwrap();

    let line = buf.contents();
    assert!(line.ends_with('\n'));
    let parsed: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(
        parsed,
        serde_json::json!({
            "$event": "http_request",
            "method": "POST",
            "db.queries": 2,
            "status": 201
        })
    );
}

#[test]
fn test_tracing_sink_emits_payload() {
    let buf = SharedBuf::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("wide_event=info"))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let record = Record::new("job");
        record.sub("db").set("rows", 3);
        TracingSink.emit(&record).unwrap();
        record.finish();
    });

    let out = buf.contents();
    assert!(out.contains("wide event"), "{out}");
    assert!(out.contains(r#""db.rows":3"#), "{out}");
    assert!(out.contains("event=\"job\"") || out.contains("event=job"), "{out}");
}

#[test]
fn test_memory_sink_many_units() {
    let sink = Arc::new(MemorySink::new());
    for i in 0..5 {
        let unit = UnitOfWork::start(&Scope::background(), "job", Arc::clone(&sink));
        unit.record().set("i", i);
        unit.complete().unwrap();
    }
    let events = sink.take();
    assert_eq!(events.len(), 5);
    assert_eq!(events[4]["i"], Value::Int(4));
}

#[test]
fn test_failing_sink_still_finishes() {
    struct Broken;

    impl Sink for Broken {
        fn emit(&self, _record: &Record) -> wide_event::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into())
        }
    }

    let unit = UnitOfWork::start(&Scope::background(), "job", Broken);
    let record = unit.record().clone();
    let err = unit.complete().unwrap_err();
    assert!(err.to_string().contains("gone"));
    assert!(record.is_finished());
}
