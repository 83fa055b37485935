//! Bulk-mutation engine: the retry state machine and its drivers.

mod async_apply;
mod mutator;

pub use async_apply::{AsyncBulkMutator, AsyncRetryBulkApply};
pub use mutator::{BulkMutator, FailedMutation, FailureKind};
