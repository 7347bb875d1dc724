use crate::value::{ContainerKind, Key, ObjectId};
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Errors surfaced by observed writes, snapshots, and configuration.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// The container does not accept this kind of key.
    #[error("{kind} does not accept key {key}")]
    InvalidKey {
        /// Kind of the container that rejected the key.
        kind: ContainerKind,
        /// The rejected key.
        key: Key,
    },

    /// A sequence write would grow the sequence by too many slots at once.
    #[error("index {index} is too far past the end of a sequence of length {len}")]
    IndexOutOfRange {
        /// Length of the sequence before the write.
        len: usize,
        /// The rejected index.
        index: usize,
    },

    /// One or more subscribers panicked while being notified.
    ///
    /// The write that caused the notification has already been applied, and
    /// every other subscriber of the same key still ran.
    #[error(
        "{} effect(s) failed while notifying key {key}: {}",
        .failures.len(),
        .failures.join("; ")
    )]
    EffectFailed {
        /// The key whose change was being propagated.
        key: Key,
        /// Panic messages, one per failed subscriber.
        failures: Vec<String>,
    },

    /// A JSON snapshot reached an object that is already being serialized.
    #[error("reference cycle through object {0}")]
    Cycle(ObjectId),

    /// Runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}
