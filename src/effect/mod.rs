//! Effects: computations that re-run when what they read changes.

mod effect;

pub(crate) use effect::Computation;
pub use effect::{ComputationId, EffectGuard};
