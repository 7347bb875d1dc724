//! Observation wrappers: transparent facades that track reads and notify
//! on writes.

mod observed;

pub use observed::Observed;
