//! Runtime support for observation wrappers.
//!
//! This module provides the infrastructure for dependency tracking: the
//! identity registry that keeps one wrapper per raw object, the dependency
//! registry that maps `(object, key)` to subscribed computations, and the
//! per-thread stack of active computations.

mod context;
mod deps;
mod identity;
mod stack;

pub use context::{Runtime, RuntimeId, SweepReport};
pub use identity::WrapperId;

pub(crate) use context::RuntimeShared;
pub(crate) use stack::StackGuard;
