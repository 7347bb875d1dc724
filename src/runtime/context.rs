use crate::config::RuntimeConfig;
use crate::effect::{Computation, ComputationId, EffectGuard};
use crate::error::{ReactiveError, Result};
use crate::observe::Observed;
use crate::runtime::deps::DependencyRegistry;
use crate::runtime::identity::IdentityRegistry;
use crate::runtime::{stack, StackGuard};
use crate::value::{Key, ObjectRef, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace};

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuntimeId(u64);

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rt{}", self.0)
    }
}

/// What a [`Runtime::sweep`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Wrapper records whose raw object was gone.
    pub wrappers: usize,
    /// `(object, key)` subscription entries whose object was gone.
    pub dependencies: usize,
}

/// Shared runtime state. Wrappers and computations hold it weakly.
///
/// User code never runs while either lock is held.
pub(crate) struct RuntimeShared {
    id: RuntimeId,
    config: RuntimeConfig,
    identity: Mutex<IdentityRegistry>,
    deps: Mutex<DependencyRegistry>,
}

impl RuntimeShared {
    fn identity(&self) -> MutexGuard<'_, IdentityRegistry> {
        self.identity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deps(&self) -> MutexGuard<'_, DependencyRegistry> {
        self.deps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reactive runtime: the context that owns wrapper identities and
/// subscriptions.
///
/// Runtimes are independent of each other. Everything a runtime tracks is
/// released when its last handle is dropped; wrappers and effects that
/// outlive it fall back to plain, untracked access.
///
/// Handles are cheap to clone and can be shared across threads. The stack
/// of running computations is per thread, so an effect only tracks the
/// reads made on the thread that runs it.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use tincan_observe::{ObjectRef, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.observe(&ObjectRef::record_from([("count", 0i64)]));
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// runtime.register_effect({
///     let state = state.clone();
///     let seen = Arc::clone(&seen);
///     move || {
///         let count = state.get("count").and_then(|v| v.as_int());
///         seen.lock().unwrap().push(count);
///     }
/// });
///
/// state.set("count", 1i64).unwrap();
/// assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(1)]);
/// ```
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<RuntimeShared>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let id = RuntimeId(NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed));
        debug!(runtime = %id, ?config, "created runtime");
        Self {
            shared: Arc::new(RuntimeShared {
                id,
                config,
                identity: Mutex::new(IdentityRegistry::default()),
                deps: Mutex::new(DependencyRegistry::default()),
            }),
        }
    }

    pub(crate) fn upgrade(shared: &Weak<RuntimeShared>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn id(&self) -> RuntimeId {
        self.shared.id
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Wrap a value for observation.
    ///
    /// Primitives come back unchanged. A raw object comes back as its
    /// wrapper, the same one every time. A wrapper registered with this
    /// runtime comes back as itself; any other wrapper is replaced by this
    /// runtime's wrapper over the same raw object.
    pub fn wrap(&self, value: impl Into<Value>) -> Value {
        match value.into() {
            Value::Object(raw) => Value::Observed(self.observe(&raw)),
            Value::Observed(observed) if self.shared.identity().is_wrapper(observed.id()) => {
                trace!(runtime = %self.id(), wrapper = %observed.id(), "value is already observed");
                Value::Observed(observed)
            }
            Value::Observed(foreign) => Value::Observed(self.observe(foreign.raw())),
            primitive => primitive,
        }
    }

    /// Typed form of [`wrap`](Self::wrap) for raw objects.
    pub fn observe(&self, raw: &ObjectRef) -> Observed {
        let (wrapper, created) = self.shared.identity().wrapper_for(raw);
        if created {
            debug!(runtime = %self.id(), object = %raw.id(), %wrapper, "created wrapper");
        } else {
            trace!(runtime = %self.id(), object = %raw.id(), %wrapper, "reusing wrapper");
        }
        Observed::new(wrapper, raw.clone(), self.downgrade())
    }

    /// Strip this runtime's wrapper, returning the raw object. Any other
    /// value comes back unchanged.
    pub fn to_raw(&self, value: &Value) -> Value {
        match value {
            Value::Observed(observed) => self
                .shared
                .identity()
                .raw_of(observed.id())
                .map_or_else(|| value.clone(), Value::Object),
            _ => value.clone(),
        }
    }

    /// Whether `value` is a wrapper registered with this runtime.
    pub fn is_observed(&self, value: &Value) -> bool {
        value
            .as_observed()
            .is_some_and(|observed| self.shared.identity().is_wrapper(observed.id()))
    }

    /// Run `effect` now, and again whenever something it read changes.
    ///
    /// A panic in this first run propagates to the caller. The effect stays
    /// alive for as long as it is subscribed to something.
    pub fn register_effect<F>(&self, effect: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let computation = Computation::new(self, effect);
        debug!(runtime = %self.id(), computation = %computation.id(), "registered effect");
        computation.run();
    }

    /// Like [`register_effect`](Self::register_effect), but the effect is
    /// stopped and unsubscribed when the returned guard is dropped.
    pub fn effect<F>(&self, effect: F) -> EffectGuard
    where
        F: Fn() + Send + Sync + 'static,
    {
        let guard = EffectGuard::new(Computation::new(self, effect));
        debug!(runtime = %self.id(), computation = %guard.id(), "registered guarded effect");
        guard.run();
        guard
    }

    /// Run `f` without tracking any reads it makes, even inside an effect.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = StackGuard::push(None);
        f()
    }

    /// The computation currently tracking reads for this runtime on this
    /// thread.
    pub fn active_computation(&self) -> Option<ComputationId> {
        stack::top()
            .filter(|computation| computation.runtime_id() == self.id())
            .map(|computation| computation.id())
    }

    /// Number of frames on this thread's active stack, across all runtimes.
    pub fn stack_depth(&self) -> usize {
        stack::depth()
    }

    /// Number of registered wrappers, including those whose raw object is
    /// already gone but not yet swept.
    pub fn wrapper_count(&self) -> usize {
        self.shared.identity().len()
    }

    /// Number of computations subscribed to `key` on `observed`.
    pub fn subscriber_count(&self, observed: &Observed, key: impl Into<Key>) -> usize {
        self.shared
            .deps()
            .subscriber_count(observed.raw().id(), &key.into())
    }

    /// Number of `(object, key)` pairs with at least one subscriber.
    pub fn dependency_count(&self) -> usize {
        self.shared.deps().len()
    }

    /// Remove wrapper records and subscriptions for raw objects that are no
    /// longer reachable.
    pub fn sweep(&self) -> SweepReport {
        let wrappers = self.shared.identity().sweep();
        let (dependencies, released) = self.shared.deps().sweep();
        drop(released);
        if wrappers > 0 || dependencies > 0 {
            debug!(runtime = %self.id(), wrappers, dependencies, "swept unreachable objects");
        }
        SweepReport {
            wrappers,
            dependencies,
        }
    }

    /// Forget every wrapper and subscription.
    ///
    /// Wrappers handed out earlier keep working; wrapping their raw object
    /// again yields a new wrapper identity.
    pub fn clear(&self) {
        self.shared.identity().clear();
        let drained = self.shared.deps().take();
        drop(drained);
        debug!(runtime = %self.id(), "cleared runtime");
    }

    /// Subscribe the active computation, if any, to `(object, key)`.
    pub(crate) fn track(&self, object: &ObjectRef, key: &Key) {
        let Some(computation) = stack::top() else {
            return;
        };
        if computation.runtime_id() != self.id() {
            return;
        }
        if self.shared.deps().track(object, key, &computation) {
            trace!(
                runtime = %self.id(),
                object = %object.id(),
                %key,
                computation = %computation.id(),
                "tracked dependency"
            );
        }
    }

    /// Run every computation subscribed to `(object, key)`, one at a time.
    ///
    /// Each run is isolated: a panicking computation is recorded and the
    /// rest still run. The recorded panics come back as
    /// [`ReactiveError::EffectFailed`].
    pub(crate) fn notify(&self, object: &ObjectRef, key: &Key) -> Result<()> {
        let subscribers = self.shared.deps().subscribers(object.id(), key);
        if subscribers.is_empty() {
            return Ok(());
        }
        debug!(
            runtime = %self.id(),
            object = %object.id(),
            %key,
            subscribers = subscribers.len(),
            "notifying subscribers"
        );

        let failures: Vec<String> = subscribers
            .iter()
            .filter_map(|computation| computation.run_isolated().err())
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReactiveError::EffectFailed {
                key: key.clone(),
                failures,
            })
        }
    }

    /// Remove `computation` from every key it is subscribed to.
    pub(crate) fn unsubscribe(&self, computation: ComputationId) {
        let removed = self.shared.deps().unsubscribe(computation);
        if !removed.is_empty() {
            trace!(runtime = %self.id(), %computation, keys = removed.len(), "unsubscribed");
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id())
            .field("config", self.config())
            .finish_non_exhaustive()
    }
}
