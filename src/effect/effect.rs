use crate::config::DependencyPolicy;
use crate::runtime::{Runtime, RuntimeId, RuntimeShared, StackGuard};
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

static NEXT_COMPUTATION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(u64);

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

struct ComputationInner {
    id: ComputationId,
    runtime_id: RuntimeId,
    runtime: Weak<RuntimeShared>,
    effect: Box<dyn Fn() + Send + Sync>,
    stopped: AtomicBool,
    runs: AtomicU64,
}

/// A re-runnable effect. Handles are shared; equality and hashing go by id.
#[derive(Clone)]
pub(crate) struct Computation(Arc<ComputationInner>);

impl Computation {
    pub(crate) fn new<F>(runtime: &Runtime, effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(ComputationInner {
            id: ComputationId(NEXT_COMPUTATION_ID.fetch_add(1, Ordering::Relaxed)),
            runtime_id: runtime.id(),
            runtime: runtime.downgrade(),
            effect: Box::new(effect),
            stopped: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        }))
    }

    pub(crate) fn id(&self) -> ComputationId {
        self.0.id
    }

    pub(crate) fn runtime_id(&self) -> RuntimeId {
        self.0.runtime_id
    }

    pub(crate) fn run_count(&self) -> u64 {
        self.0.runs.load(Ordering::Relaxed)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.0.stopped.load(Ordering::Acquire)
    }

    /// Mark stopped. Returns `true` for the call that actually stopped it.
    pub(crate) fn stop(&self) -> bool {
        !self.0.stopped.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn runtime(&self) -> Option<Runtime> {
        Runtime::upgrade(&self.0.runtime)
    }

    /// Run the effect as the active computation. Panics propagate; the
    /// stack frame is popped either way.
    pub(crate) fn run(&self) {
        if self.is_stopped() {
            return;
        }
        if let Some(runtime) = self.runtime() {
            if runtime.config().dependency_policy == DependencyPolicy::Refresh {
                runtime.unsubscribe(self.id());
            }
        }
        let _frame = StackGuard::push(Some(self.clone()));
        self.0.runs.fetch_add(1, Ordering::Relaxed);
        (self.0.effect)();
    }

    /// Run, turning a panic into its message.
    pub(crate) fn run_isolated(&self) -> Result<(), String> {
        panic::catch_unwind(AssertUnwindSafe(|| self.run())).map_err(|payload| {
            let message = panic_message(payload.as_ref());
            error!(computation = %self.id(), error = %message, "effect panicked during notification");
            message
        })
    }
}

impl PartialEq for Computation {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Computation {}

impl Hash for Computation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Borrow<ComputationId> for Computation {
    fn borrow(&self) -> &ComputationId {
        &self.0.id
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.0.id)
            .field("runtime", &self.0.runtime_id)
            .field("runs", &self.run_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "effect panicked".to_string()
    }
}

/// An effect that stays subscribed for as long as the guard lives.
///
/// Dropping the guard (or calling [`stop`](Self::stop)) stops the effect
/// and removes all of its subscriptions.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// use tincan_observe::{ObjectRef, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.observe(&ObjectRef::record_from([("n", 0i64)]));
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let guard = runtime.effect({
///     let state = state.clone();
///     let runs = Arc::clone(&runs);
///     move || {
///         let _ = state.get("n");
///         runs.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// state.set("n", 1i64).unwrap();
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
///
/// drop(guard);
/// state.set("n", 2i64).unwrap();
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// ```
pub struct EffectGuard {
    computation: Computation,
}

impl EffectGuard {
    pub(crate) fn new(computation: Computation) -> Self {
        Self { computation }
    }

    pub fn id(&self) -> ComputationId {
        self.computation.id()
    }

    /// Manually run the effect. Panics propagate to the caller.
    pub fn run(&self) {
        self.computation.run();
    }

    /// How many times the effect has started running.
    pub fn run_count(&self) -> u64 {
        self.computation.run_count()
    }

    pub fn is_stopped(&self) -> bool {
        self.computation.is_stopped()
    }

    /// Stop the effect now.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for EffectGuard {
    fn drop(&mut self) {
        if self.computation.stop() {
            if let Some(runtime) = self.computation.runtime() {
                runtime.unsubscribe(self.computation.id());
            }
        }
    }
}

impl fmt::Debug for EffectGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EffectGuard").field(&self.computation).finish()
    }
}
