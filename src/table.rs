//! Table handle: the entry point for applying mutations.

use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::bulk::{AsyncRetryBulkApply, BulkMutator, FailedMutation};
use crate::config::ClientConfig;
use crate::core::{BulkMutation, NamespaceId, TableId};
use crate::policy::{
    IdempotencyPolicy, LimitedErrorCountRetryPolicy, RetryPolicy, SafeIdempotencyPolicy,
};
use crate::queue::TaskQueue;
use crate::status::{Status, StatusCode};
use crate::transport::{CallContext, Connection};

/// Client handle for one table.
///
/// Cheap to clone conceptually but deliberately not `Clone`: each handle
/// carries its own policy prototypes, and every bulk operation gets a fresh
/// clone of the retry policy so operations never share a budget.
pub struct Table {
    conn: Arc<dyn Connection>,
    namespace: NamespaceId,
    table: TableId,
    queue: TaskQueue,
    retry_prototype: Box<dyn RetryPolicy>,
    idempotency: Box<dyn IdempotencyPolicy>,
}

impl Table {
    pub fn new(
        conn: Arc<dyn Connection>,
        namespace: NamespaceId,
        table: TableId,
        config: &ClientConfig,
    ) -> Self {
        Table {
            conn,
            namespace,
            table,
            queue: TaskQueue::new(config.queue_threads),
            retry_prototype: Box::new(LimitedErrorCountRetryPolicy::from_config(config)),
            idempotency: Box::new(SafeIdempotencyPolicy),
        }
    }

    /// Replace the retry policy prototype for subsequent operations.
    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_prototype = Box::new(policy);
        self
    }

    /// Replace the idempotency policy for subsequent operations.
    pub fn with_idempotency_policy(
        mut self,
        policy: impl IdempotencyPolicy + 'static,
    ) -> Self {
        self.idempotency = Box::new(policy);
        self
    }

    /// Fully qualified table name, `namespaces/<ns>/tables/<table>`.
    pub fn table_name(&self) -> String {
        format!(
            "namespaces/{}/tables/{}",
            self.namespace.as_str(),
            self.table.as_str()
        )
    }

    fn mutator_for(&self, batch: BulkMutation) -> BulkMutator {
        BulkMutator::new(
            self.namespace.clone(),
            self.table.clone(),
            self.idempotency.as_ref(),
            self.retry_prototype.clone(),
            batch,
        )
    }

    /// Apply a batch, blocking until every entry is resolved or given up on.
    /// Returns the entries that were not applied, ordered by their position
    /// in `batch`, plus the final round's call status. An empty list means
    /// full success.
    pub fn bulk_apply(&self, batch: BulkMutation) -> (Vec<FailedMutation>, Status) {
        self.bulk_apply_with_context(&CallContext::new(), batch)
    }

    /// Like `bulk_apply`, with caller-supplied cancellation.
    pub fn bulk_apply_with_context(
        &self,
        ctx: &CallContext,
        batch: BulkMutation,
    ) -> (Vec<FailedMutation>, Status) {
        let mut mutator = self.mutator_for(batch);
        let mut status = Status::ok();

        while mutator.has_pending_mutations() {
            if ctx.is_cancelled() {
                status = Status::new(StatusCode::Cancelled, "call cancelled");
                break;
            }
            status = mutator.make_one_request(self.conn.as_ref(), ctx);
            if !mutator.has_pending_mutations() {
                break;
            }
            if !status.is_ok() && !mutator.on_round_complete(&status) {
                break;
            }
            let delay = mutator.backoff_delay();
            debug!(table = %self.table_name(), delay_ms = delay.as_millis() as u64,
                round_status = %status, "retrying bulk apply");
            thread::sleep(delay);
        }

        (mutator.extract_final_failures(), status)
    }

    /// Apply a batch on the table's worker queue. `on_done` fires exactly
    /// once with the unapplied entries and the final call status.
    pub fn async_bulk_apply(
        &self,
        ctx: Arc<CallContext>,
        batch: BulkMutation,
        on_done: impl FnOnce(Vec<FailedMutation>, Status) + Send + 'static,
    ) {
        AsyncRetryBulkApply::start(
            Arc::clone(&self.conn),
            self.queue.clone(),
            ctx,
            self.mutator_for(batch),
            Box::new(on_done),
        );
    }

    /// Stop the worker queue, draining tasks already submitted. Operations
    /// started afterwards complete immediately with an internal status.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.queue.shutdown();
    }
}
