//! # Tincan Observe
//!
//! Transparent observation wrappers with automatic dependency tracking.
//!
//! Plain keyed data (records, sequences, mappings) is wrapped by a
//! [`Runtime`]. Effects registered with the same runtime run once right
//! away; every key they read through a wrapper subscribes them, and every
//! later write that changes a subscribed key runs them again, synchronously.
//!
//! ## Building blocks
//!
//! - [`ObjectRef`] - shared raw object backed by a [`Container`]
//! - [`Observed`] - wrapper that tracks reads and notifies on writes
//! - [`Runtime`] - owns wrapper identities and subscriptions
//! - [`Runtime::register_effect`] / [`Runtime::effect`] - re-running computations
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use tincan_observe::{ObjectRef, Runtime};
//!
//! let runtime = Runtime::new();
//! let user = runtime.observe(&ObjectRef::record_from([("name", "ada")]));
//!
//! let greeting = Arc::new(Mutex::new(String::new()));
//! runtime.register_effect({
//!     let user = user.clone();
//!     let greeting = Arc::clone(&greeting);
//!     move || {
//!         let name = user.get("name").and_then(|v| v.as_str().map(str::to_owned));
//!         *greeting.lock().unwrap() = format!("hello {}", name.unwrap_or_default());
//!     }
//! });
//!
//! user.set("name", "grace").unwrap();
//! assert_eq!(*greeting.lock().unwrap(), "hello grace");
//! ```

pub mod config;
pub mod effect;
pub mod error;
pub mod observe;
pub mod runtime;
pub mod value;

// Re-export main types for convenience
pub use config::{DependencyPolicy, RuntimeConfig, WritePolicy};
pub use effect::{ComputationId, EffectGuard};
pub use error::{ReactiveError, Result};
pub use observe::Observed;
pub use runtime::{Runtime, RuntimeId, SweepReport, WrapperId};
pub use value::{Container, ContainerKind, Key, Mapping, ObjectId, ObjectRef, Record, Sequence, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let runtime = Runtime::new();
        let state = runtime.observe(&ObjectRef::record_from([("n", 0i64)]));
        assert_eq!(state.get("n"), Some(Value::Int(0)));
        state.set("n", 42i64).unwrap();
        assert_eq!(state.get("n"), Some(Value::Int(42)));
    }
}
