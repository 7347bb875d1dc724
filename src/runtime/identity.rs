use crate::value::{ObjectId, ObjectRef, WeakObjectRef};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_WRAPPER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an observation wrapper. Unique across runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl fmt::Display for WrapperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// One-to-one correspondence between raw objects and their wrappers.
///
/// Both directions hold the raw object weakly, so a registered object is
/// dropped as soon as the caller lets go of it. Dead entries stay until
/// [`sweep`](Self::sweep) runs; object ids are never reused, so a dead entry
/// can never answer for a new object.
#[derive(Debug, Default)]
pub(crate) struct IdentityRegistry {
    wrapper_of: HashMap<ObjectId, WrapperId>,
    raw_of: HashMap<WrapperId, WeakObjectRef>,
}

impl IdentityRegistry {
    /// The wrapper registered for `raw`, creating one if needed. The flag is
    /// `true` when a new wrapper was created.
    pub(crate) fn wrapper_for(&mut self, raw: &ObjectRef) -> (WrapperId, bool) {
        if let Some(&wrapper) = self.wrapper_of.get(&raw.id()) {
            return (wrapper, false);
        }
        let wrapper = WrapperId(NEXT_WRAPPER_ID.fetch_add(1, Ordering::Relaxed));
        self.wrapper_of.insert(raw.id(), wrapper);
        self.raw_of.insert(wrapper, raw.downgrade());
        (wrapper, true)
    }

    pub(crate) fn is_wrapper(&self, wrapper: WrapperId) -> bool {
        self.raw_of.contains_key(&wrapper)
    }

    pub(crate) fn raw_of(&self, wrapper: WrapperId) -> Option<ObjectRef> {
        self.raw_of.get(&wrapper).and_then(WeakObjectRef::upgrade)
    }

    pub(crate) fn len(&self) -> usize {
        self.raw_of.len()
    }

    /// Drop every entry whose raw object is gone. Returns how many went.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.raw_of.len();
        let wrapper_of = &mut self.wrapper_of;
        self.raw_of.retain(|_, raw| {
            let alive = raw.is_alive();
            if !alive {
                wrapper_of.remove(&raw.id());
            }
            alive
        });
        before - self.raw_of.len()
    }

    pub(crate) fn clear(&mut self) {
        self.wrapper_of.clear();
        self.raw_of.clear();
    }
}
