//! Plain data model: keys, values, and the containers behind raw objects.
//!
//! Nothing in this module tracks or notifies. Raw objects are read and
//! written here directly; observation happens in [`crate::observe`].

mod container;
mod json;
mod object;
mod value;

pub use container::{Container, ContainerKind, Mapping, Record, Sequence};
pub use object::{ObjectId, ObjectRef, WeakObjectRef};
pub use value::{Key, Value};
