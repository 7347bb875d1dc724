use crate::effect::{Computation, ComputationId};
use crate::value::{Key, ObjectId, ObjectRef, WeakObjectRef};
use std::collections::{HashMap, HashSet};

struct Target {
    raw: WeakObjectRef,
    keys: HashMap<Key, HashSet<Computation>>,
}

/// Map from `(object, key)` to the computations that read it.
///
/// `sources` is the reverse index (computation to the keys it joined), used
/// to unsubscribe a computation without scanning every target.
///
/// Methods that remove subscriptions hand the removed computations back to
/// the caller instead of dropping them: the last handle to a computation owns
/// its closure, and dropping a closure may re-enter the runtime.
#[derive(Default)]
pub(crate) struct DependencyRegistry {
    targets: HashMap<ObjectId, Target>,
    sources: HashMap<ComputationId, HashSet<(ObjectId, Key)>>,
}

impl DependencyRegistry {
    /// Subscribe `computation` to `(object, key)`. Returns `false` if it was
    /// already subscribed.
    pub(crate) fn track(
        &mut self,
        object: &ObjectRef,
        key: &Key,
        computation: &Computation,
    ) -> bool {
        let target = self.targets.entry(object.id()).or_insert_with(|| Target {
            raw: object.downgrade(),
            keys: HashMap::new(),
        });
        let inserted = target
            .keys
            .entry(key.clone())
            .or_default()
            .insert(computation.clone());
        if inserted {
            self.sources
                .entry(computation.id())
                .or_default()
                .insert((object.id(), key.clone()));
        }
        inserted
    }

    /// Snapshot of the computations subscribed to `(object, key)`.
    pub(crate) fn subscribers(&self, object: ObjectId, key: &Key) -> Vec<Computation> {
        self.targets
            .get(&object)
            .and_then(|target| target.keys.get(key))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn subscriber_count(&self, object: ObjectId, key: &Key) -> usize {
        self.targets
            .get(&object)
            .and_then(|target| target.keys.get(key))
            .map_or(0, HashSet::len)
    }

    /// Remove `computation` from every key it joined.
    pub(crate) fn unsubscribe(&mut self, computation: ComputationId) -> Vec<Computation> {
        let Some(sources) = self.sources.remove(&computation) else {
            return Vec::new();
        };
        let mut removed = Vec::with_capacity(sources.len());
        for (object, key) in sources {
            let Some(target) = self.targets.get_mut(&object) else {
                continue;
            };
            if let Some(set) = target.keys.get_mut(&key) {
                removed.extend(set.take(&computation));
                if set.is_empty() {
                    target.keys.remove(&key);
                }
            }
            if target.keys.is_empty() {
                self.targets.remove(&object);
            }
        }
        removed
    }

    /// Drop the entries of every object that is no longer reachable.
    /// Returns the number of `(object, key)` entries removed along with the
    /// computations they held.
    pub(crate) fn sweep(&mut self) -> (usize, Vec<Computation>) {
        let dead: Vec<ObjectId> = self
            .targets
            .iter()
            .filter(|(_, target)| !target.raw.is_alive())
            .map(|(&id, _)| id)
            .collect();

        let mut entries = 0;
        let mut released = Vec::new();
        for object in dead {
            let Some(target) = self.targets.remove(&object) else {
                continue;
            };
            for (key, set) in target.keys {
                entries += 1;
                for computation in set {
                    if let Some(sources) = self.sources.get_mut(&computation.id()) {
                        sources.remove(&(object, key.clone()));
                        if sources.is_empty() {
                            self.sources.remove(&computation.id());
                        }
                    }
                    released.push(computation);
                }
            }
        }
        (entries, released)
    }

    /// Number of `(object, key)` pairs with at least one subscriber.
    pub(crate) fn len(&self) -> usize {
        self.targets.values().map(|target| target.keys.len()).sum()
    }

    pub(crate) fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}
