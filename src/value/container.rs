use crate::error::{ReactiveError, Result};
use crate::value::{Key, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The shape of a container, used in errors and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Record,
    Sequence,
    Mapping,
    Custom(&'static str),
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Record => f.write_str("record"),
            ContainerKind::Sequence => f.write_str("sequence"),
            ContainerKind::Mapping => f.write_str("mapping"),
            ContainerKind::Custom(name) => f.write_str(name),
        }
    }
}

/// Keyed storage behind a raw object.
///
/// This is the full capability set an observation wrapper relies on. Reads of
/// absent keys return `None`; containers decide for themselves which keys
/// they accept on write.
pub trait Container: Send + Sync + fmt::Debug {
    fn kind(&self) -> ContainerKind;

    fn get(&self, key: &Key) -> Option<Value>;

    fn contains_key(&self, key: &Key) -> bool;

    /// Store `value` under `key`, returning the previous value.
    ///
    /// `None` means the key was absent before this write. Callers rely on
    /// this to detect creation under the same lock as the write.
    fn set(&mut self, key: Key, value: Value) -> Result<Option<Value>>;

    fn remove(&mut self, key: &Key) -> Option<Value>;

    fn keys(&self) -> Vec<Key>;

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named fields, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Container for Record {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Record
    }

    fn get(&self, key: &Key) -> Option<Value> {
        match key {
            Key::Name(name) => self.fields.get(name).cloned(),
            Key::Index(_) => None,
        }
    }

    fn contains_key(&self, key: &Key) -> bool {
        matches!(key, Key::Name(name) if self.fields.contains_key(name))
    }

    fn set(&mut self, key: Key, value: Value) -> Result<Option<Value>> {
        match key {
            Key::Name(name) => Ok(self.fields.insert(name, value)),
            key @ Key::Index(_) => Err(ReactiveError::InvalidKey {
                kind: ContainerKind::Record,
                key,
            }),
        }
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        match key {
            Key::Name(name) => self.fields.remove(name),
            Key::Index(_) => None,
        }
    }

    fn keys(&self) -> Vec<Key> {
        self.fields.keys().cloned().map(Key::Name).collect()
    }

    fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Positional items.
///
/// Writing past the end leaves absent holes before the new item, and
/// removing an item leaves a hole rather than shifting the items after it.
/// Holes read as absent and are skipped by `keys`, but count towards `len`.
/// A single write may extend the sequence by at most
/// [`Sequence::MAX_GROWTH`] slots.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    items: Vec<Option<Value>>,
}

impl Sequence {
    /// Largest number of slots one write may add past the current end.
    pub const MAX_GROWTH: usize = 1 << 16;

    pub fn new() -> Self {
        Self::default()
    }
}

impl<V: Into<Value>> FromIterator<V> for Sequence {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().map(|v| Some(v.into())).collect(),
        }
    }
}

impl Container for Sequence {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Sequence
    }

    fn get(&self, key: &Key) -> Option<Value> {
        match key {
            Key::Index(index) => self.items.get(*index).cloned().flatten(),
            Key::Name(_) => None,
        }
    }

    fn contains_key(&self, key: &Key) -> bool {
        matches!(key, Key::Index(index) if matches!(self.items.get(*index), Some(Some(_))))
    }

    fn set(&mut self, key: Key, value: Value) -> Result<Option<Value>> {
        let index = match key {
            Key::Index(index) => index,
            key @ Key::Name(_) => {
                return Err(ReactiveError::InvalidKey {
                    kind: ContainerKind::Sequence,
                    key,
                })
            }
        };
        if let Some(slot) = self.items.get_mut(index) {
            return Ok(slot.replace(value));
        }
        let len = self.items.len();
        if index - len >= Self::MAX_GROWTH {
            return Err(ReactiveError::IndexOutOfRange { len, index });
        }
        self.items.resize(index, None);
        self.items.push(Some(value));
        Ok(None)
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        match key {
            Key::Index(index) => self.items.get_mut(*index).and_then(Option::take),
            Key::Name(_) => None,
        }
    }

    fn keys(&self) -> Vec<Key> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_some())
            .map(|(index, _)| Key::Index(index))
            .collect()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Arbitrary keys, unordered.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: HashMap<Key, Value>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: Into<Key>, V: Into<Value>> FromIterator<(K, V)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Container for Mapping {
    fn kind(&self) -> ContainerKind {
        ContainerKind::Mapping
    }

    fn get(&self, key: &Key) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    fn set(&mut self, key: Key, value: Value) -> Result<Option<Value>> {
        Ok(self.entries.insert(key, value))
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        self.entries.remove(key)
    }

    fn keys(&self) -> Vec<Key> {
        self.entries.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
