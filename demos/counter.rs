//! Counter app driven by observed state.
//!
//! Run with `RUST_LOG=tincan_observe=debug cargo run --example counter` to
//! see wrappers being created and subscribers being notified.

use tincan_observe::{ObjectRef, Runtime, Value};
use tracing_subscriber::EnvFilter;

fn main() -> tincan_observe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Observed Counter ===\n");

    let runtime = Runtime::new();
    let state = runtime.wrap(Value::from_json(serde_json::json!({
        "count": 0,
        "history": [],
        "settings": { "step": 1 }
    })));
    let state = state
        .as_observed()
        .cloned()
        .expect("json objects are always observable");

    // Effects run immediately, then again whenever what they read changes
    runtime.register_effect({
        let state = state.clone();
        move || {
            let count = state.get("count").and_then(|v| v.as_int()).unwrap_or_default();
            println!("   [Effect] Count is now: {count}");
        }
    });

    runtime.register_effect({
        let state = state.clone();
        move || {
            let step = state
                .child("settings")
                .and_then(|settings| settings.get("step"))
                .and_then(|v| v.as_int())
                .unwrap_or_default();
            println!("   [Effect] Step is now: {step}");
        }
    });

    println!("\n1. Incrementing");
    for _ in 0..3 {
        let step = state
            .child("settings")
            .and_then(|settings| settings.get("step"))
            .and_then(|v| v.as_int())
            .unwrap_or(1);
        let count = state.get("count").and_then(|v| v.as_int()).unwrap_or_default();
        if let Some(history) = state.child("history") {
            history.set(history.len(), count)?;
        }
        state.set("count", count + step)?;
    }

    println!("\n2. Writing the same value again (no effect runs)");
    let count = state.get("count").unwrap_or_default();
    state.set("count", count)?;

    println!("\n3. Changing a nested setting");
    if let Some(settings) = state.child("settings") {
        settings.set("step", 5i64)?;
    }

    println!("\n4. Snapshot");
    println!("   {}", Value::from(&state).to_json()?);

    Ok(())
}
