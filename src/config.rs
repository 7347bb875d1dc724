//! Runtime configuration.
//!
//! Both knobs default to the behaviour most callers want; the alternatives
//! exist for compatibility with engines that notify on every write, and for
//! long-running runtimes that cannot afford stale subscriptions.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// When a write through an observed wrapper notifies subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Notify when the key is new, or when the old and new values differ.
    #[default]
    OnChange,
    /// Notify on every write, including writes of an unchanged value.
    Always,
}

/// What happens to a computation's subscriptions when it re-runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyPolicy {
    /// Keep every subscription ever made; re-runs only add new ones.
    #[default]
    Accumulate,
    /// Drop all subscriptions before each run so that only the keys read by
    /// the latest run stay subscribed.
    Refresh,
}

/// Configuration for a [`Runtime`](crate::Runtime).
///
/// # Examples
///
/// ```
/// use tincan_observe::{RuntimeConfig, WritePolicy};
///
/// let config = RuntimeConfig::from_json(r#"{ "write_policy": "always" }"#).unwrap();
/// assert_eq!(config.write_policy, WritePolicy::Always);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub write_policy: WritePolicy,
    pub dependency_policy: DependencyPolicy,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn with_dependency_policy(mut self, policy: DependencyPolicy) -> Self {
        self.dependency_policy = policy;
        self
    }
}
