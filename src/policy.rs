//! Retry and idempotency policies.
//!
//! The bulk engine consumes these as contracts:
//! - `IdempotencyPolicy` classifies a mutation as safe to blindly retry.
//!   Consulted once per entry at batch-build time; idempotency is a property
//!   of the mutation's content, not of any attempt.
//! - `RetryPolicy` owns the attempt budget and backoff curve for one bulk
//!   operation. Stateful; cloned per independent operation.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::core::{Mutation, RowMutation, Timestamp};
use crate::status::Status;

/// Classifies a single mutation as safe-to-retry or not.
pub trait IdempotencyPolicy: Send + Sync {
    fn is_idempotent(&self, mutation: &Mutation) -> bool;

    /// An entry is idempotent iff every one of its mutations is.
    fn entry_is_idempotent(&self, entry: &RowMutation) -> bool {
        entry.mutations.iter().all(|m| self.is_idempotent(m))
    }
}

/// Treats any mutation whose effect depends on server state as unsafe.
///
/// `SetCell` with a server-assigned timestamp writes a different cell version
/// each time it is applied, so it is not idempotent. Deletes and writes at an
/// explicit timestamp converge to the same state on re-application.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeIdempotencyPolicy;

impl IdempotencyPolicy for SafeIdempotencyPolicy {
    fn is_idempotent(&self, mutation: &Mutation) -> bool {
        !matches!(
            mutation,
            Mutation::SetCell {
                timestamp: Timestamp::ServerAssigned,
                ..
            }
        )
    }
}

/// Treats every mutation as idempotent.
///
/// Opt-in for callers that accept duplicate cell versions in exchange for
/// retrying everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysIdempotentPolicy;

impl IdempotencyPolicy for AlwaysIdempotentPolicy {
    fn is_idempotent(&self, _mutation: &Mutation) -> bool {
        true
    }
}

/// Attempt budget and backoff for one retry loop.
pub trait RetryPolicy: Send {
    /// Clone this policy for an independent bulk operation.
    fn clone_box(&self) -> Box<dyn RetryPolicy>;

    /// Record a failed round. Returns true if another attempt is allowed;
    /// a permanent status always stops the loop.
    fn on_failure(&mut self, status: &Status) -> bool;

    /// Whether the budget is already spent. Pure query; records nothing.
    fn is_exhausted(&self) -> bool;

    /// Delay to sleep before the next round. Advances the backoff curve.
    fn backoff_delay(&mut self) -> Duration;
}

impl Clone for Box<dyn RetryPolicy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Tolerates a fixed number of failed rounds, with doubling backoff.
#[derive(Debug, Clone)]
pub struct LimitedErrorCountRetryPolicy {
    max_failures: usize,
    failures: usize,
    delay: Duration,
    max_delay: Duration,
}

impl LimitedErrorCountRetryPolicy {
    pub fn new(max_failures: usize) -> Self {
        Self::with_backoff(
            max_failures,
            Duration::from_millis(250),
            Duration::from_millis(5_000),
        )
    }

    pub fn with_backoff(max_failures: usize, base: Duration, max: Duration) -> Self {
        LimitedErrorCountRetryPolicy {
            max_failures,
            failures: 0,
            delay: base,
            max_delay: max,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_backoff(
            config.max_failures,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }
}

impl RetryPolicy for LimitedErrorCountRetryPolicy {
    fn clone_box(&self) -> Box<dyn RetryPolicy> {
        Box::new(self.clone())
    }

    fn on_failure(&mut self, status: &Status) -> bool {
        if !status.is_retryable() {
            return false;
        }
        self.failures += 1;
        !self.is_exhausted()
    }

    fn is_exhausted(&self) -> bool {
        self.failures > self.max_failures
    }

    fn backoff_delay(&mut self) -> Duration {
        let delay = self.delay;
        self.delay = std::cmp::min(self.delay * 2, self.max_delay);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Status, StatusCode};

    fn unavailable() -> Status {
        Status::new(StatusCode::Unavailable, "try again")
    }

    #[test]
    fn safe_policy_rejects_server_assigned_timestamps() {
        let policy = SafeIdempotencyPolicy;
        assert!(!policy.is_idempotent(&Mutation::set_cell("cf", b"c".to_vec(), b"v".to_vec())));
        assert!(policy.is_idempotent(&Mutation::set_cell_at("cf", b"c".to_vec(), 1, b"v".to_vec())));
        assert!(policy.is_idempotent(&Mutation::delete_from_column("cf", b"c".to_vec())));
        assert!(policy.is_idempotent(&Mutation::delete_from_family("cf")));
        assert!(policy.is_idempotent(&Mutation::DeleteRow));
    }

    #[test]
    fn entry_idempotent_iff_all_mutations_are() {
        let policy = SafeIdempotencyPolicy;
        let safe = RowMutation::new("r").with(Mutation::delete_from_family("cf"));
        let mixed = RowMutation::new("r")
            .with(Mutation::delete_from_family("cf"))
            .with(Mutation::set_cell("cf", b"c".to_vec(), b"v".to_vec()));
        assert!(policy.entry_is_idempotent(&safe));
        assert!(!policy.entry_is_idempotent(&mixed));
    }

    #[test]
    fn error_count_budget() {
        let mut policy = LimitedErrorCountRetryPolicy::new(2);
        assert!(!policy.is_exhausted());
        assert!(policy.on_failure(&unavailable()));
        assert!(policy.on_failure(&unavailable()));
        assert!(!policy.on_failure(&unavailable()));
        assert!(policy.is_exhausted());
    }

    #[test]
    fn permanent_status_stops_without_spending_budget() {
        let mut policy = LimitedErrorCountRetryPolicy::new(2);
        assert!(!policy.on_failure(&Status::new(StatusCode::PermissionDenied, "denied")));
        assert!(!policy.is_exhausted());
        assert!(policy.on_failure(&unavailable()));
    }

    #[test]
    fn backoff_doubles_to_ceiling() {
        let mut policy = LimitedErrorCountRetryPolicy::with_backoff(
            5,
            Duration::from_millis(100),
            Duration::from_millis(350),
        );
        assert_eq!(policy.backoff_delay(), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(), Duration::from_millis(350));
        assert_eq!(policy.backoff_delay(), Duration::from_millis(350));
    }
}
