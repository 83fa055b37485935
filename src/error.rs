use thiserror::Error;

use crate::core::InvalidId;

/// Whether retrying an operation that returned this outcome may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (transient contention/outage).
    Retryable,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// Crate-level convenience error.
///
/// Per-entry mutation problems are never surfaced here: those are data
/// (`FailedMutation` records) returned by the bulk engine. This covers the
/// few fallible constructors and config loading.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}
