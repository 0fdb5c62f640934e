//! Wide events for a simulated HTTP service
//!
//! Each request gets one root record. Middleware, the handler and the data
//! layer all write into it; the boundary ships it once through a sink.
//!
//! Run with: `RUST_LOG=wide_event=info cargo run --example http_request`

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use wide_event::{Describe, Fields, JsonSink, Scope, Sink, TracingSink, UnitOfWork, Value};

#[derive(Debug, Error)]
#[error("user {0} not found")]
struct UserNotFound(u64);

struct User {
    id: u64,
    role: &'static str,
}

impl Describe for User {
    fn describe(&self) -> Fields {
        vec![
            ("id".to_string(), self.id.into()),
            ("role".to_string(), self.role.into()),
        ]
    }
}

fn load_user(scope: &Scope, id: u64) -> Result<User, UserNotFound> {
    let db = scope.wrap(&scope.get().sub("db"));
    let started = Instant::now();
    db.get().add("queries", 1);
    let found = (id % 3 != 0).then_some(User { id, role: "admin" });
    db.get().set("elapsed", started.elapsed());
    found.ok_or(UserNotFound(id))
}

fn handle(scope: &Scope, id: u64) -> u16 {
    scope.get().set_all([("method", "GET"), ("path", "/users/:id")]);
    match load_user(scope, id) {
        Ok(user) => {
            scope.get().set("user", Value::describe(user));
            200
        }
        Err(err) => {
            scope.root().add("error", Value::error(err));
            404
        }
    }
}

fn serve(sink: &Arc<dyn Sink>, id: u64) -> wide_event::Result<()> {
    let unit = UnitOfWork::start(&Scope::background(), "http_request", Arc::clone(sink));
    let code = handle(unit.scope(), id);
    unit.scope().get().sub("response").set("code", code);
    unit.complete()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wide_event=info")))
        .init();

    println!("=== JSON lines to stdout ===");
    let stdout: Arc<dyn Sink> = Arc::new(JsonSink::new(std::io::stdout()));
    for id in 1..=3 {
        serve(&stdout, id)?;
    }

    println!("\n=== tracing events ===");
    let traced: Arc<dyn Sink> = Arc::new(TracingSink);
    for id in 4..=6 {
        serve(&traced, id)?;
    }

    Ok(())
}
