//! Client configuration.
//!
//! Feeds the default retry and backoff parameters used when a `Table` is
//! constructed without explicit policies.

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// How many failed rounds a bulk operation tolerates before giving up.
    /// The first attempt is always allowed, so `max_failures = n` permits
    /// `n + 1` rounds in total.
    pub max_failures: usize,

    /// First backoff delay between rounds; doubles per round.
    pub backoff_base_ms: u64,

    /// Backoff ceiling.
    pub backoff_max_ms: u64,

    /// Worker threads for the task queue driving async bulk operations.
    pub queue_threads: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
            queue_threads: 1,
        }
    }
}

impl ClientConfig {
    /// Parse a config from its JSON representation.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
