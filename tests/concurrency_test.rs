//! Concurrent writers on one wide event
//!
//! Several stages of one request write into the same tree at once. These
//! tests hammer shared nodes from many threads and tasks and check that no
//! write is lost and group identity holds.

use std::sync::{Arc, Barrier};
use std::thread;

use wide_event::{Record, Scope, Value};

const WRITERS: usize = 16;
const ROUNDS: usize = 500;

#[test]
fn test_concurrent_sub_returns_one_node() {
    let root = Record::new("race");
    let barrier = Barrier::new(WRITERS);

    let children: Vec<Record> = thread::scope(|s| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    root.sub("x")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for child in &children {
        assert!(child.ptr_eq(&children[0]));
    }
    assert_eq!(root.len(), 1);
    root.finish();
}

#[test]
fn test_concurrent_add_loses_nothing() {
    let root = Record::new("race");

    thread::scope(|s| {
        for _ in 0..WRITERS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    root.add("hits", 1_u64);
                    root.sub("db").add("queries", 1);
                }
            });
        }
    });

    let expected = (WRITERS * ROUNDS) as u64;
    assert_eq!(root.value("hits"), Some(Value::Uint(expected)));
    assert_eq!(root.value("db.queries"), Some(Value::Int(expected as i64)));
    root.finish();
}

#[test]
fn test_sibling_groups_written_in_parallel() {
    let root = Record::new("fanout");

    thread::scope(|s| {
        for i in 0..WRITERS {
            let stage = root.sub(&format!("stage{i}"));
            s.spawn(move || {
                for n in 0..ROUNDS {
                    stage.set("last", n);
                    stage.add("count", 1);
                }
            });
        }
    });

    let flat = root.all_values();
    for i in 0..WRITERS {
        assert_eq!(flat[&format!("stage{i}.count")], Value::Int(ROUNDS as i64));
        assert_eq!(flat[&format!("stage{i}.last")], Value::Uint(ROUNDS as u64 - 1));
    }
    root.finish();
}

#[test]
fn test_readers_alongside_writers() {
    let root = Record::new("mixed");
    root.set("n", 0);

    thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..ROUNDS {
                root.add("n", 1);
            }
        });
        s.spawn(|| {
            for _ in 0..ROUNDS {
                let flat = root.all_values();
                assert!(matches!(flat.get("n"), Some(Value::Int(_))));
                let _ = root.render();
            }
        });
    });

    assert_eq!(root.value("n"), Some(Value::Int(ROUNDS as i64)));
    root.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_tasks_share_scope() {
    let (scope, root) = Scope::background().new_record("http_request");
    let mut handles = vec![];

    for i in 0..100 {
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            let stage = scope.wrap(&scope.get().sub("tasks"));
            stage.get().add("done", 1);
            stage.root().add("total", i);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(root.value("tasks.done"), Some(Value::Int(100)));
    assert_eq!(root.value("total"), Some(Value::Int((0..100).sum())));
    root.finish();
}
