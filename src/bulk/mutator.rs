//! Bulk-mutation retry state machine.
//!
//! Keeps the state of one in-progress bulk apply: the entries of the request
//! currently in flight, the entries queued for the next round, and the
//! failures accumulated so far. Round-oriented operations
//! (`prepare_for_request` / `process_response` / `finish_request`) are driven
//! two ways: the blocking loop in `Table::bulk_apply` and the worker-thread
//! callback chain in `AsyncBulkMutator`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{BulkMutation, NamespaceId, RowMutation, TableId};
use crate::policy::{IdempotencyPolicy, RetryPolicy};
use crate::status::{Status, StatusCode};
use crate::transport::{CallContext, Connection, MutateRowsRequest, MutateRowsResponse};

/// Why an entry ended up in the failure list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The service reported a terminal failure for this entry.
    RejectedByService,
    /// The entry was still eligible when the retry budget ran out.
    RetriesExhausted,
    /// The round ended before this entry's result was observed, and the
    /// entry is not idempotent, so it was not resubmitted.
    UnknownOutcome,
}

/// Terminal record for one entry that was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedMutation {
    original_index: usize,
    status: Status,
    kind: FailureKind,
}

impl FailedMutation {
    /// The entry's position in the caller's original batch, stable across
    /// every retry round.
    pub fn original_index(&self) -> usize {
        self.original_index
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }
}

/// Per-entry bookkeeping for the round in flight.
///
/// `original_index` reports failures in the caller's order no matter how
/// retries reorder the request. `is_idempotent` is fixed at batch build.
/// `has_result` is reset each round and set when the service reports this
/// entry's outcome.
#[derive(Debug, Clone, Copy)]
struct Annotation {
    original_index: usize,
    is_idempotent: bool,
    has_result: bool,
}

/// State machine for one bulk apply.
///
/// Single logical owner: not internally synchronized, and not valid for
/// concurrent rounds. Constructed once per batch, consumed once nothing is
/// pending and the failures have been extracted.
pub struct BulkMutator {
    namespace: NamespaceId,
    table: TableId,
    retry: Box<dyn RetryPolicy>,

    /// Entries of the request just sent, in request order.
    current: Vec<RowMutation>,
    /// Annotation for each `current` entry, same order.
    annotations: Vec<Annotation>,

    /// Entries queued for the next round.
    pending: Vec<RowMutation>,
    pending_annotations: Vec<Annotation>,

    /// Permanent failures plus entries given up on. Append-only until
    /// drained.
    failures: Vec<FailedMutation>,
}

impl BulkMutator {
    /// Build the initial pending set: every batch entry in order, annotated
    /// with its original index and its idempotency classification.
    pub fn new(
        namespace: NamespaceId,
        table: TableId,
        idempotency: &dyn IdempotencyPolicy,
        retry: Box<dyn RetryPolicy>,
        batch: BulkMutation,
    ) -> Self {
        let entries = batch.into_entries();
        let mut pending_annotations = Vec::with_capacity(entries.len());
        for (original_index, entry) in entries.iter().enumerate() {
            pending_annotations.push(Annotation {
                original_index,
                is_idempotent: idempotency.entry_is_idempotent(entry),
                has_result: false,
            });
        }

        BulkMutator {
            namespace,
            table,
            retry,
            current: Vec::new(),
            annotations: Vec::new(),
            pending: entries,
            pending_annotations,
            failures: Vec::new(),
        }
    }

    /// True iff the next round has entries to send.
    pub fn has_pending_mutations(&self) -> bool {
        !self.pending_annotations.is_empty()
    }

    /// Promote the pending set to the current set and build the round's
    /// request. Must be called exactly once before each round.
    pub(crate) fn prepare_for_request(&mut self) -> MutateRowsRequest {
        self.current = std::mem::take(&mut self.pending);
        self.annotations = std::mem::take(&mut self.pending_annotations);
        for annotation in &mut self.annotations {
            annotation.has_result = false;
        }

        MutateRowsRequest {
            namespace: self.namespace.clone(),
            table: self.table.clone(),
            entries: self.current.clone(),
        }
    }

    /// Reconcile one response chunk against the current set.
    ///
    /// Indices address positions in the current request. Duplicate or
    /// out-of-range indices are a protocol violation; they are ignored since
    /// an unmatched annotation simply keeps "no result yet".
    pub(crate) fn process_response(&mut self, response: MutateRowsResponse) {
        for outcome in response.entries {
            let Some(annotation) = self.annotations.get_mut(outcome.index) else {
                continue;
            };
            if annotation.has_result {
                continue;
            }
            annotation.has_result = true;

            if outcome.status.is_ok() {
                // Fully resolved; the entry is dropped when the current set
                // is cleared.
                continue;
            }

            let annotation = *annotation;
            if outcome.status.is_retryable() && annotation.is_idempotent {
                self.requeue(outcome.index, annotation);
            } else {
                // Permanent failure, or a transient one on an entry that
                // must not be resubmitted blind.
                self.failures.push(FailedMutation {
                    original_index: annotation.original_index,
                    status: outcome.status,
                    kind: FailureKind::RejectedByService,
                });
            }
        }
    }

    /// Close out the round once the stream has ended and the call status is
    /// known. Entries with no observed result have an unknown outcome:
    /// idempotent ones are re-queued while the retry budget lasts,
    /// non-idempotent ones fail with a distinguished status.
    pub(crate) fn finish_request(&mut self, status: Status) {
        let budget_exhausted = self.retry.is_exhausted();
        let annotations = std::mem::take(&mut self.annotations);

        for (position, annotation) in annotations.into_iter().enumerate() {
            if annotation.has_result {
                continue;
            }
            if annotation.is_idempotent && !budget_exhausted {
                self.requeue(position, annotation);
            } else if annotation.is_idempotent {
                self.failures.push(FailedMutation {
                    original_index: annotation.original_index,
                    status: Status::new(StatusCode::Aborted, "retry budget exhausted"),
                    kind: FailureKind::RetriesExhausted,
                });
            } else {
                let message = if status.is_ok() {
                    "mutation outcome unknown; not retried because it is not idempotent"
                        .to_string()
                } else {
                    format!(
                        "mutation outcome unknown; not retried because it is not idempotent \
                         (call failed: {status})"
                    )
                };
                self.failures.push(FailedMutation {
                    original_index: annotation.original_index,
                    status: Status::new(StatusCode::Unknown, message),
                    kind: FailureKind::UnknownOutcome,
                });
            }
        }

        self.current.clear();
    }

    fn requeue(&mut self, position: usize, annotation: Annotation) {
        self.pending.push(self.current[position].clone());
        self.pending_annotations.push(Annotation {
            has_result: false,
            ..annotation
        });
    }

    /// One synchronous round: build the request, feed every streamed chunk
    /// back into reconciliation, close out with the call status.
    pub fn make_one_request(&mut self, conn: &dyn Connection, ctx: &CallContext) -> Status {
        let request = self.prepare_for_request();
        let status = conn.mutate_rows(ctx, &request, &mut |chunk| self.process_response(chunk));
        self.finish_request(status.clone());
        status
    }

    /// Record the round's outcome with the retry policy. Returns true if the
    /// budget allows another round.
    pub fn on_round_complete(&mut self, status: &Status) -> bool {
        self.retry.on_failure(status)
    }

    /// Delay before the next round, from the retry policy's backoff curve.
    pub fn backoff_delay(&mut self) -> Duration {
        self.retry.backoff_delay()
    }

    /// Give up on everything still pending and drain the failure list,
    /// ordered by original index. A second call returns empty.
    pub fn extract_final_failures(&mut self) -> Vec<FailedMutation> {
        self.pending.clear();
        for annotation in std::mem::take(&mut self.pending_annotations) {
            self.failures.push(FailedMutation {
                original_index: annotation.original_index,
                status: Status::new(StatusCode::Aborted, "retry budget exhausted"),
                kind: FailureKind::RetriesExhausted,
            });
        }

        let mut failures = std::mem::take(&mut self.failures);
        failures.sort_by_key(FailedMutation::original_index);
        failures
    }
}
