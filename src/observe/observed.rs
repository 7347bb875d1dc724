use crate::config::WritePolicy;
use crate::error::Result;
use crate::runtime::{Runtime, RuntimeShared, WrapperId};
use crate::value::{ContainerKind, Key, ObjectRef, Value};
use std::fmt;
use std::sync::Weak;
use tracing::trace;

/// Observation wrapper over one raw object.
///
/// Reads through the wrapper subscribe the running effect to the key that
/// was read, and hand out wrappers for nested objects. Writes notify the
/// effects subscribed to the written key.
///
/// Two wrappers are equal when they are the same wrapper; a runtime hands
/// out exactly one per raw object.
#[derive(Clone)]
pub struct Observed {
    id: WrapperId,
    raw: ObjectRef,
    runtime: Weak<RuntimeShared>,
}

impl Observed {
    pub(crate) fn new(id: WrapperId, raw: ObjectRef, runtime: Weak<RuntimeShared>) -> Self {
        Self { id, raw, runtime }
    }

    pub fn id(&self) -> WrapperId {
        self.id
    }

    /// The raw object under this wrapper. Access through it is untracked.
    pub fn raw(&self) -> &ObjectRef {
        &self.raw
    }

    /// The owning runtime, unless it has been dropped.
    pub fn runtime(&self) -> Option<Runtime> {
        Runtime::upgrade(&self.runtime)
    }

    /// Read `key`, subscribing the active effect to it.
    ///
    /// Structured results are returned wrapped. Absent keys read as `None`.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = key.into();
        let value = self.raw.get(&key);
        let Some(runtime) = self.runtime() else {
            return value;
        };
        runtime.track(&self.raw, &key);
        value.map(|value| runtime.wrap(value))
    }

    /// Read `key` and return it only if it holds a nested object.
    pub fn child(&self, key: impl Into<Key>) -> Option<Observed> {
        match self.get(key)? {
            Value::Observed(observed) => Some(observed),
            _ => None,
        }
    }

    /// Write `key`, then notify its subscribers.
    ///
    /// Under [`WritePolicy::OnChange`] subscribers run when the key is new or
    /// the value differs from the previous one; under
    /// [`WritePolicy::Always`] they run on every write.
    ///
    /// A container error is returned before anything is written or
    /// notified. [`ReactiveError::EffectFailed`](crate::ReactiveError::EffectFailed)
    /// means the write went through but some subscribers panicked.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        // Presence comes from the write itself, under one container lock.
        let old = self.raw.set(key.clone(), value.clone())?;

        let Some(runtime) = self.runtime() else {
            return Ok(());
        };
        let changed = match runtime.config().write_policy {
            WritePolicy::Always => true,
            WritePolicy::OnChange => old.as_ref() != Some(&value),
        };
        if !changed {
            trace!(wrapper = %self.id, %key, "write left value unchanged");
            return Ok(());
        }
        runtime.notify(&self.raw, &key)
    }

    /// Remove `key`. Deletions are not tracked and notify nobody.
    pub fn delete(&self, key: impl Into<Key>) -> Option<Value> {
        self.raw.remove(&key.into())
    }

    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        self.raw.contains_key(&key.into())
    }

    pub fn keys(&self) -> Vec<Key> {
        self.raw.keys()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn kind(&self) -> ContainerKind {
        self.raw.kind()
    }
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Observed {}

impl fmt::Debug for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observed")
            .field("id", &self.id)
            .field("raw", &self.raw)
            .finish()
    }
}
