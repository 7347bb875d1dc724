//! Integration tests for Tincan Observe

use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tincan_observe::{
    DependencyPolicy, Key, ObjectRef, Observed, ReactiveError, Runtime, RuntimeConfig, Value,
    WritePolicy,
};

fn counter_state(runtime: &Runtime) -> Observed {
    runtime.observe(&ObjectRef::record_from([("count", 0i64)]))
}

/// Register an effect that appends `count` to a log on every run.
fn log_count(runtime: &Runtime, state: &Observed) -> Arc<Mutex<Vec<i64>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    runtime.register_effect({
        let state = state.clone();
        let log = Arc::clone(&log);
        move || {
            let count = state.get("count").and_then(|v| v.as_int()).unwrap_or(-1);
            log.lock().unwrap().push(count);
        }
    });
    log
}

/// Register an effect that only counts its runs, reading `key`.
fn count_runs(runtime: &Runtime, state: &Observed, key: &str) -> Arc<AtomicUsize> {
    let runs = Arc::new(AtomicUsize::new(0));
    runtime.register_effect({
        let state = state.clone();
        let runs = Arc::clone(&runs);
        let key = key.to_string();
        move || {
            let _ = state.get(key.as_str());
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });
    runs
}

#[test]
fn wrapping_is_identity_stable() {
    let runtime = Runtime::new();
    let raw = ObjectRef::record();

    let first = runtime.wrap(&raw);
    let second = runtime.wrap(&raw);
    assert_eq!(first, second);
    assert_eq!(runtime.wrap(first.clone()), first);
    assert_eq!(runtime.wrapper_count(), 1);
}

#[test]
fn primitives_pass_through() {
    let runtime = Runtime::new();
    assert_eq!(runtime.wrap(5i64), Value::Int(5));
    assert_eq!(runtime.wrap(Value::Null), Value::Null);
    assert_eq!(runtime.wrap("s"), Value::from("s"));
    assert_eq!(runtime.wrap(true), Value::Bool(true));
    assert_eq!(runtime.wrapper_count(), 0);
}

#[test]
fn nested_objects_are_wrapped_on_read() {
    let runtime = Runtime::new();
    let raw = ObjectRef::record_from([("a", ObjectRef::record_from([("b", 1i64)]))]);
    let w = runtime.observe(&raw);

    let a = w.get("a").unwrap();
    assert!(runtime.is_observed(&a));
    assert_eq!(w.get("a").unwrap(), a);
    assert_eq!(
        a.as_observed().unwrap().get("b"),
        Some(Value::Int(1))
    );
}

#[test]
fn dependency_tracking_triggers_rerun() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let log = log_count(&runtime, &w);
    assert_eq!(*log.lock().unwrap(), vec![0]);

    w.set("count", 1i64).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 1]);
}

#[test]
fn unchanged_value_does_not_notify() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let log = log_count(&runtime, &w);

    w.set("count", 1i64).unwrap();
    w.set("count", 1i64).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 1]);
}

#[test]
fn always_policy_notifies_unchanged_writes() {
    // Engines that skip the presence check notify on every write. The
    // `Always` policy keeps that behaviour available.
    let runtime = Runtime::with_config(RuntimeConfig::default().with_write_policy(WritePolicy::Always));
    let w = counter_state(&runtime);
    let log = log_count(&runtime, &w);

    w.set("count", 1i64).unwrap();
    w.set("count", 1i64).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 1]);
}

#[test]
fn reads_outside_computation_do_not_subscribe() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let other = runtime.observe(&ObjectRef::record_from([("unrelated", 0i64)]));
    let runs = count_runs(&runtime, &other, "unrelated");

    assert_eq!(w.get("count"), Some(Value::Int(0)));
    assert_eq!(runtime.subscriber_count(&w, "count"), 0);

    w.set("count", 5i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn every_subscriber_reruns_once_per_change() {
    let runtime = Runtime::new();
    let w = runtime.observe(&ObjectRef::record_from([("count", 0i64), ("name", 0i64)]));
    let first = count_runs(&runtime, &w, "count");
    let second = count_runs(&runtime, &w, "count");
    let unrelated = count_runs(&runtime, &w, "name");
    assert_eq!(runtime.subscriber_count(&w, "count"), 2);

    w.set("count", 1i64).unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 2);
    assert_eq!(second.load(Ordering::SeqCst), 2);
    assert_eq!(unrelated.load(Ordering::SeqCst), 1);

    w.set("count", 2i64).unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 3);
    assert_eq!(second.load(Ordering::SeqCst), 3);
    assert_eq!(unrelated.load(Ordering::SeqCst), 1);
}

#[test]
fn creating_a_key_always_notifies() {
    let runtime = Runtime::new();
    let w = runtime.observe(&ObjectRef::record());
    let runs = count_runs(&runtime, &w, "fresh");
    assert_eq!(runtime.subscriber_count(&w, "fresh"), 1);

    // Null is what an absent key would compare against, yet the write still
    // counts as a creation.
    w.set("fresh", Value::Null).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    w.set("fresh", Value::Null).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn recreating_a_deleted_key_notifies() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let log = log_count(&runtime, &w);

    assert_eq!(w.delete("count"), Some(Value::Int(0)));
    assert_eq!(*log.lock().unwrap(), vec![0]);

    w.set("count", 0i64).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 0]);
}

#[test]
fn recreating_a_deleted_index_notifies() {
    let runtime = Runtime::new();
    let list = runtime.observe(&ObjectRef::sequence_from([1i64]));
    let runs = count_index(&runtime, &list, 0);

    assert_eq!(list.delete(0usize), Some(Value::Int(1)));
    assert!(!list.contains_key(0usize));
    assert_eq!(list.get(0usize), None);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    list.set(0usize, Value::Null).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn integer_and_float_writes_compare_numerically() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let runs = count_runs(&runtime, &w, "count");

    w.set("count", 0.0f64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    w.set("count", 0.5f64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_creation_of_a_key_notifies_once() {
    let runtime = Runtime::new();
    let w = runtime.observe(&ObjectRef::record());
    let runs = count_runs(&runtime, &w, "fresh");
    let start = Arc::new(std::sync::Barrier::new(2));

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let w = w.clone();
            let start = Arc::clone(&start);
            std::thread::spawn(move || {
                start.wait();
                w.set("fresh", 1i64).unwrap();
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(w.get("fresh"), Some(Value::Int(1)));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn self_write_that_stabilises_terminates() {
    let runtime = Runtime::new();
    let w = runtime.observe(&ObjectRef::record_from([("x", 0i64)]));
    let runs = Arc::new(AtomicUsize::new(0));

    runtime.register_effect({
        let w = w.clone();
        let runs = Arc::clone(&runs);
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            let x = w.get("x").and_then(|v| v.as_int()).unwrap_or_default();
            w.set("x", (x + 1).min(3)).unwrap();
        }
    });

    assert_eq!(w.get("x"), Some(Value::Int(3)));
    // Three changing writes, each re-running the effect, plus the first run.
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert_eq!(runtime.stack_depth(), 0);
}

#[test]
fn self_write_that_never_stabilises_is_detectable() {
    const CAP: usize = 25;
    let runtime = Runtime::new();
    let w = runtime.observe(&ObjectRef::record_from([("x", 0i64)]));
    let runs = Arc::new(AtomicUsize::new(0));
    let max_depth = Arc::new(AtomicUsize::new(0));

    runtime.register_effect({
        let w = w.clone();
        let runs = Arc::clone(&runs);
        let max_depth = Arc::clone(&max_depth);
        let runtime = runtime.clone();
        move || {
            let run = runs.fetch_add(1, Ordering::SeqCst);
            max_depth.fetch_max(runtime.stack_depth(), Ordering::SeqCst);
            let x = w.get("x").and_then(|v| v.as_int()).unwrap_or_default();
            if run < CAP {
                w.set("x", x + 1).unwrap();
            }
        }
    });

    // Every run wrote a new value, so only the harness cap stopped it.
    assert_eq!(runs.load(Ordering::SeqCst), CAP + 1);
    assert_eq!(w.get("x"), Some(Value::Int(CAP as i64)));
    assert_eq!(max_depth.load(Ordering::SeqCst), CAP + 1);
    assert_eq!(runtime.stack_depth(), 0);
}

#[test]
fn panic_in_first_run_propagates_and_restores_stack() {
    let runtime = Runtime::new();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.register_effect(|| panic!("first run"));
    }));
    assert!(result.is_err());
    assert_eq!(runtime.stack_depth(), 0);
    assert_eq!(runtime.active_computation(), None);
}

#[test]
fn failing_subscriber_does_not_block_the_others() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let log = log_count(&runtime, &w);

    runtime.register_effect({
        let w = w.clone();
        move || {
            if w.get("count").and_then(|v| v.as_int()) == Some(1) {
                panic!("cannot handle one");
            }
        }
    });
    let log_after = log_count(&runtime, &w);

    let err = w.set("count", 1i64).unwrap_err();
    match err {
        ReactiveError::EffectFailed { key, failures } => {
            assert_eq!(key, Key::from("count"));
            assert_eq!(failures, vec!["cannot handle one".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(w.get("count"), Some(Value::Int(1)));
    assert_eq!(*log.lock().unwrap(), vec![0, 1]);
    assert_eq!(*log_after.lock().unwrap(), vec![0, 1]);
    assert_eq!(runtime.stack_depth(), 0);

    // The failed effect stays subscribed and recovers on the next change.
    w.set("count", 2i64).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn nested_effect_runs_are_attributed_to_the_top_computation() {
    let runtime = Runtime::new();
    let a = runtime.observe(&ObjectRef::record_from([("v", 0i64)]));
    let b = runtime.observe(&ObjectRef::record_from([("v", 0i64)]));

    // Mirrors a into b.
    let mirror_runs = count_runs(&runtime, &a, "v");
    runtime.register_effect({
        let (a, b) = (a.clone(), b.clone());
        move || {
            let v = a.get("v").unwrap_or_default();
            b.set("v", v).unwrap();
        }
    });
    let log = Arc::new(Mutex::new(Vec::new()));
    runtime.register_effect({
        let b = b.clone();
        let log = Arc::clone(&log);
        move || log.lock().unwrap().push(b.get("v").and_then(|v| v.as_int()))
    });

    a.set("v", 7i64).unwrap();
    assert_eq!(*log.lock().unwrap(), vec![Some(0), Some(7)]);
    assert_eq!(mirror_runs.load(Ordering::SeqCst), 2);
    // Only the mirroring effect and the counter read `a`.
    assert_eq!(runtime.subscriber_count(&a, "v"), 2);
    assert_eq!(runtime.subscriber_count(&b, "v"), 1);
}

#[test]
fn untracked_reads_do_not_subscribe() {
    let runtime = Runtime::new();
    let w = runtime.observe(&ObjectRef::record_from([("seen", 0i64), ("ignored", 0i64)]));
    let runs = Arc::new(AtomicUsize::new(0));

    runtime.register_effect({
        let w = w.clone();
        let runs = Arc::clone(&runs);
        let runtime = runtime.clone();
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            let _ = w.get("seen");
            runtime.untracked(|| w.get("ignored"));
        }
    });

    w.set("ignored", 1i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    w.set("seen", 1i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn stale_dependencies_accumulate_by_default() {
    let (runtime, w, runs) = branching_effect(RuntimeConfig::default());

    w.set("flag", false).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // `a` is no longer read, but its subscription survives.
    w.set("a", 1i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(runtime.subscriber_count(&w, "a"), 1);
}

#[test]
fn refresh_policy_drops_stale_dependencies() {
    let config = RuntimeConfig::default().with_dependency_policy(DependencyPolicy::Refresh);
    let (runtime, w, runs) = branching_effect(config);

    w.set("flag", false).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    w.set("a", 1i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.subscriber_count(&w, "a"), 0);

    w.set("b", 1i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// An effect that reads `a` while `flag` is true and `b` otherwise.
fn branching_effect(config: RuntimeConfig) -> (Runtime, Observed, Arc<AtomicUsize>) {
    let runtime = Runtime::with_config(config);
    let w = runtime.observe(&ObjectRef::record_from([
        ("flag", Value::Bool(true)),
        ("a", Value::Int(0)),
        ("b", Value::Int(0)),
    ]));
    let runs = Arc::new(AtomicUsize::new(0));
    runtime.register_effect({
        let w = w.clone();
        let runs = Arc::clone(&runs);
        move || {
            runs.fetch_add(1, Ordering::SeqCst);
            if w.get("flag").and_then(|v| v.as_bool()) == Some(true) {
                let _ = w.get("a");
            } else {
                let _ = w.get("b");
            }
        }
    });
    (runtime, w, runs)
}

#[test]
fn dropping_the_guard_unsubscribes() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let runs = Arc::new(AtomicUsize::new(0));

    let guard = runtime.effect({
        let w = w.clone();
        let runs = Arc::clone(&runs);
        move || {
            let _ = w.get("count");
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });
    w.set("count", 1i64).unwrap();
    assert_eq!(guard.run_count(), 2);

    drop(guard);
    assert_eq!(runtime.subscriber_count(&w, "count"), 0);
    w.set("count", 2i64).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn sequences_notify_per_index() {
    let runtime = Runtime::new();
    let list = runtime.observe(&ObjectRef::sequence_from([10i64, 20]));
    let first = count_index(&runtime, &list, 0);
    let appended = count_index(&runtime, &list, 2);

    list.set(1usize, 21i64).unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 1);

    list.set(2usize, 30i64).unwrap();
    assert_eq!(appended.load(Ordering::SeqCst), 2);
    assert_eq!(list.len(), 3);

    list.set(0usize, 11i64).unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 2);
}

fn count_index(runtime: &Runtime, list: &Observed, index: usize) -> Arc<AtomicUsize> {
    let runs = Arc::new(AtomicUsize::new(0));
    runtime.register_effect({
        let list = list.clone();
        let runs = Arc::clone(&runs);
        move || {
            let _ = list.get(index);
            runs.fetch_add(1, Ordering::SeqCst);
        }
    });
    runs
}

#[test]
fn far_out_of_range_index_is_rejected() {
    let runtime = Runtime::new();
    let list = runtime.observe(&ObjectRef::sequence());
    let runs = count_index(&runtime, &list, 0);

    let err = list.set(usize::MAX, 1i64).unwrap_err();
    assert!(matches!(
        err,
        ReactiveError::IndexOutOfRange {
            len: 0,
            index: usize::MAX
        }
    ));
    assert!(list.is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.stack_depth(), 0);
}

#[test]
fn writes_from_another_thread_run_effects_there() {
    let runtime = Runtime::new();
    let w = counter_state(&runtime);
    let log = log_count(&runtime, &w);

    std::thread::spawn({
        let w = w.clone();
        move || w.set("count", 9i64).unwrap()
    })
    .join()
    .unwrap();

    assert_eq!(*log.lock().unwrap(), vec![0, 9]);
}

#[test]
fn sweep_releases_unreachable_objects() {
    let runtime = Runtime::new();
    let kept = runtime.observe(&ObjectRef::record());
    {
        let temporary = runtime.observe(&ObjectRef::record_from([("n", 0i64)]));
        let runs = count_runs(&runtime, &temporary, "n");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
    assert_eq!(runtime.wrapper_count(), 2);

    // The effect still holds the temporary wrapper, so nothing is swept.
    assert_eq!(runtime.sweep().wrappers, 0);
    assert_eq!(runtime.dependency_count(), 1);

    runtime.clear();
    let _ = runtime.observe(kept.raw());
    assert_eq!(runtime.wrapper_count(), 1);
}

#[test]
fn sweep_drops_entries_for_dropped_objects() {
    let runtime = Runtime::new();
    let raw = ObjectRef::record_from([("n", 0i64)]);
    let observed = runtime.observe(&raw);
    drop(observed);
    drop(raw);

    let report = runtime.sweep();
    assert_eq!(report.wrappers, 1);
    assert_eq!(runtime.wrapper_count(), 0);
}

#[test]
fn json_snapshot_reads_through_wrappers() {
    let runtime = Runtime::new();
    let state = Value::from_json(serde_json::json!({ "todos": [{ "done": false }] }));
    let w = runtime.wrap(state);
    let todo = w
        .as_observed()
        .and_then(|w| w.child("todos"))
        .and_then(|todos| todos.child(0usize))
        .unwrap();
    todo.set("done", true).unwrap();

    assert_eq!(
        w.to_json().unwrap(),
        serde_json::json!({ "todos": [{ "done": true }] })
    );
}
