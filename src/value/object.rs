use crate::error::Result;
use crate::value::{Container, ContainerKind, Key, Mapping, Record, Sequence, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a raw object. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ObjectCell {
    id: ObjectId,
    body: RwLock<Box<dyn Container>>,
}

/// Shared handle to a raw structured value.
///
/// Cloning the handle shares the object. All access through `ObjectRef` is
/// plain: nothing is tracked and nobody is notified. Wrap the object with a
/// [`Runtime`](crate::Runtime) to observe it.
#[derive(Clone)]
pub struct ObjectRef(Arc<ObjectCell>);

impl ObjectRef {
    pub fn new(container: impl Container + 'static) -> Self {
        Self(Arc::new(ObjectCell {
            id: ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)),
            body: RwLock::new(Box::new(container)),
        }))
    }

    pub fn record() -> Self {
        Self::new(Record::new())
    }

    pub fn sequence() -> Self {
        Self::new(Sequence::new())
    }

    pub fn mapping() -> Self {
        Self::new(Mapping::new())
    }

    /// Build a record from `(field, value)` pairs.
    ///
    /// ```
    /// use tincan_observe::{Key, ObjectRef, Value};
    ///
    /// let user = ObjectRef::record_from([("name", Value::from("ada")), ("age", Value::from(36i64))]);
    /// assert_eq!(user.get(&Key::from("age")), Some(Value::Int(36)));
    /// ```
    pub fn record_from<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(fields.into_iter().collect::<Record>())
    }

    pub fn sequence_from<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::new(items.into_iter().collect::<Sequence>())
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> ContainerKind {
        self.read().kind()
    }

    pub fn get(&self, key: &Key) -> Option<Value> {
        self.read().get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.read().contains_key(key)
    }

    pub fn set(&self, key: Key, value: Value) -> Result<Option<Value>> {
        self.write().set(key, value)
    }

    pub fn remove(&self, key: &Key) -> Option<Value> {
        self.write().remove(key)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.read().keys()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef {
            id: self.0.id,
            cell: Arc::downgrade(&self.0),
        }
    }

    // Container code never calls back into the object, so a poisoned lock
    // only means a panic inside a foreign container; the data is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Box<dyn Container>> {
        self.0.body.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Box<dyn Container>> {
        self.0.body.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ObjectRef {
    // Shallow on purpose: object graphs may contain cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.0.id)
            .field("kind", &self.kind())
            .finish()
    }
}

/// Non-owning handle to a raw object.
#[derive(Clone)]
pub struct WeakObjectRef {
    id: ObjectId,
    cell: Weak<ObjectCell>,
}

impl WeakObjectRef {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.cell.upgrade().map(ObjectRef)
    }

    pub fn is_alive(&self) -> bool {
        self.cell.strong_count() > 0
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObjectRef")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = ObjectRef::record();
        let b = ObjectRef::record();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn clones_share_state() {
        let a = ObjectRef::record();
        let b = a.clone();
        b.set(Key::from("x"), Value::Int(1)).unwrap();
        assert_eq!(a.get(&Key::from("x")), Some(Value::Int(1)));
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn weak_handle_does_not_keep_object_alive() {
        let object = ObjectRef::sequence_from([1i64, 2, 3]);
        let weak = object.downgrade();
        assert!(weak.upgrade().is_some());
        drop(object);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
