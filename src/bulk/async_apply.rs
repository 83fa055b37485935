//! Asynchronous drivers for the bulk-mutation state machine.
//!
//! `AsyncBulkMutator` runs a single round on a `TaskQueue` worker and
//! reports its status through an exactly-once callback. `AsyncRetryBulkApply`
//! chains rounds with backoff until nothing is pending, the retry budget is
//! spent, or the call context is cancelled, then delivers the final failures
//! in one shot.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::bulk::mutator::{BulkMutator, FailedMutation};
use crate::queue::TaskQueue;
use crate::status::{Status, StatusCode};
use crate::transport::{CallContext, Connection};

type RoundCallback = Box<dyn FnOnce(Status) + Send>;

/// Holder guaranteeing the round callback fires exactly once, whether the
/// round ran on a worker or was rejected by a shut-down queue.
struct RoundState {
    callback: Mutex<Option<RoundCallback>>,
}

impl RoundState {
    fn new(callback: RoundCallback) -> Arc<Self> {
        Arc::new(RoundState {
            callback: Mutex::new(Some(callback)),
        })
    }

    fn fire(&self, status: Status) {
        let callback = self
            .callback
            .lock()
            .expect("round callback lock poisoned")
            .take();
        if let Some(callback) = callback {
            callback(status);
        }
    }
}

/// Shares one `BulkMutator` between queue workers and the submitting thread.
pub struct AsyncBulkMutator {
    state: Mutex<BulkMutator>,
}

impl AsyncBulkMutator {
    pub fn new(mutator: BulkMutator) -> Arc<Self> {
        Arc::new(AsyncBulkMutator {
            state: Mutex::new(mutator),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BulkMutator> {
        self.state.lock().expect("bulk mutator lock poisoned")
    }

    /// Run one round on a queue worker and invoke `on_done` with the round
    /// status. If the queue rejects the task the round is closed out inline
    /// and `on_done` still fires, once, with an internal status.
    pub fn perform_round(
        self: Arc<Self>,
        conn: Arc<dyn Connection>,
        queue: &TaskQueue,
        ctx: Arc<CallContext>,
        on_done: RoundCallback,
    ) {
        let round = RoundState::new(on_done);

        let this = Arc::clone(&self);
        let task_round = Arc::clone(&round);
        let spawned = queue.spawn(move || {
            let status = this.lock().make_one_request(conn.as_ref(), &ctx);
            task_round.fire(status);
        });

        if !spawned {
            let status = Status::new(StatusCode::Internal, "task queue shut down");
            {
                let mut state = self.lock();
                state.prepare_for_request();
                state.finish_request(status.clone());
            }
            // Guard released: the continuation re-locks the mutator.
            round.fire(status);
        }
    }
}

type BulkApplyCallback = Box<dyn FnOnce(Vec<FailedMutation>, Status) + Send>;

/// Retry loop for one asynchronous bulk apply.
///
/// Owns the operation's mutator and schedules round after round on the
/// queue, sleeping the backoff delay on a timer rather than a worker. The
/// completion callback fires exactly once.
pub struct AsyncRetryBulkApply {
    mutator: Arc<AsyncBulkMutator>,
    conn: Arc<dyn Connection>,
    queue: TaskQueue,
    ctx: Arc<CallContext>,
    callback: Mutex<Option<BulkApplyCallback>>,
}

impl AsyncRetryBulkApply {
    /// Start the loop. The first round is submitted immediately; the
    /// callback is invoked from a queue worker, or inline if the queue has
    /// already shut down.
    pub fn start(
        conn: Arc<dyn Connection>,
        queue: TaskQueue,
        ctx: Arc<CallContext>,
        mutator: BulkMutator,
        callback: BulkApplyCallback,
    ) {
        let apply = Arc::new(AsyncRetryBulkApply {
            mutator: AsyncBulkMutator::new(mutator),
            conn,
            queue,
            ctx,
            callback: Mutex::new(Some(callback)),
        });
        apply.submit_round();
    }

    fn submit_round(self: Arc<Self>) {
        if self.ctx.is_cancelled() {
            self.finish(Status::new(StatusCode::Cancelled, "call cancelled"));
            return;
        }

        let this = Arc::clone(&self);
        Arc::clone(&self.mutator).perform_round(
            Arc::clone(&self.conn),
            &self.queue,
            Arc::clone(&self.ctx),
            Box::new(move |status| this.on_round_done(status)),
        );
    }

    fn on_round_done(self: Arc<Self>, status: Status) {
        let (pending, delay) = {
            let mut state = self.mutator.lock();
            if !state.has_pending_mutations() {
                (false, None)
            } else if status.is_ok() || state.on_round_complete(&status) {
                (true, Some(state.backoff_delay()))
            } else {
                (true, None)
            }
        };

        match (pending, delay) {
            (false, _) => self.finish(status),
            (true, None) => self.finish(status),
            (true, Some(delay)) => {
                debug!(delay_ms = delay.as_millis() as u64, round_status = %status,
                    "rescheduling bulk apply round");
                let this = Arc::clone(&self);
                let scheduled = self
                    .queue
                    .spawn_after(delay, move || this.submit_round());
                if !scheduled {
                    self.finish(Status::new(StatusCode::Internal, "task queue shut down"));
                }
            }
        }
    }

    fn finish(&self, status: Status) {
        let failures = self.mutator.lock().extract_final_failures();
        let callback = self
            .callback
            .lock()
            .expect("bulk apply callback lock poisoned")
            .take();
        if let Some(callback) = callback {
            callback(failures, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    use crate::core::{BulkMutation, Mutation, NamespaceId, RowMutation, TableId};
    use crate::policy::{LimitedErrorCountRetryPolicy, SafeIdempotencyPolicy};
    use crate::testing::{ScriptedConnection, ScriptedRound};
    use crate::transport::EntryOutcome;

    fn mutator(batch: BulkMutation) -> BulkMutator {
        BulkMutator::new(
            NamespaceId::default(),
            TableId::parse("t").unwrap(),
            &SafeIdempotencyPolicy,
            Box::new(LimitedErrorCountRetryPolicy::with_backoff(
                3,
                Duration::from_millis(1),
                Duration::from_millis(1),
            )),
            batch,
        )
    }

    fn batch_of(keys: &[&str]) -> BulkMutation {
        keys.iter()
            .map(|k| {
                RowMutation::new(*k).with(Mutation::set_cell_at(
                    "cf",
                    b"c".to_vec(),
                    1,
                    b"v".to_vec(),
                ))
            })
            .collect()
    }

    fn run(
        conn: ScriptedConnection,
        batch: BulkMutation,
    ) -> (Vec<FailedMutation>, Status) {
        let queue = TaskQueue::new(1);
        let (tx, rx) = mpsc::channel();
        AsyncRetryBulkApply::start(
            Arc::new(conn),
            queue.clone(),
            Arc::new(CallContext::new()),
            mutator(batch),
            Box::new(move |failures, status| {
                let _ = tx.send((failures, status));
            }),
        );
        let result = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("bulk apply never completed");
        queue.shutdown();
        result
    }

    #[test]
    fn completes_in_one_round() {
        let conn = ScriptedConnection::new(vec![ScriptedRound::ok(vec![
            EntryOutcome::ok(0),
            EntryOutcome::ok(1),
        ])]);
        let (failures, status) = run(conn, batch_of(&["a", "b"]));
        assert!(status.is_ok());
        assert!(failures.is_empty());
    }

    #[test]
    fn retries_transient_failures_across_rounds() {
        let conn = ScriptedConnection::new(vec![
            ScriptedRound::ok(vec![
                EntryOutcome::ok(0),
                EntryOutcome::failed(1, Status::new(StatusCode::Unavailable, "busy")),
            ]),
            ScriptedRound::ok(vec![EntryOutcome::ok(0)]),
        ]);
        let (failures, status) = run(conn, batch_of(&["a", "b"]));
        assert!(status.is_ok());
        assert!(failures.is_empty());
    }

    #[test]
    fn broken_stream_then_success() {
        let conn = ScriptedConnection::new(vec![
            ScriptedRound::broken(Status::new(StatusCode::Unavailable, "reset")),
            ScriptedRound::ok(vec![EntryOutcome::ok(0)]),
        ]);
        let (failures, status) = run(conn, batch_of(&["a"]));
        assert!(status.is_ok());
        assert!(failures.is_empty());
    }

    #[test]
    fn permanent_call_failure_stops_the_loop() {
        let conn = ScriptedConnection::new(vec![ScriptedRound::broken(Status::new(
            StatusCode::PermissionDenied,
            "denied",
        ))]);
        let (failures, status) = run(conn, batch_of(&["a"]));
        assert_eq!(status.code(), StatusCode::PermissionDenied);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].original_index(), 0);
    }

    #[test]
    fn shut_down_queue_fires_callback_inline() {
        let queue = TaskQueue::new(1);
        queue.shutdown();

        let (tx, rx) = mpsc::channel();
        AsyncRetryBulkApply::start(
            Arc::new(ScriptedConnection::new(Vec::new())),
            queue,
            Arc::new(CallContext::new()),
            mutator(batch_of(&["a"])),
            Box::new(move |failures, status| {
                let _ = tx.send((failures, status));
            }),
        );

        let (failures, status) = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("callback did not fire");
        assert_eq!(status.code(), StatusCode::Internal);
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn cancellation_before_a_round_reports_cancelled() {
        let conn = ScriptedConnection::new(vec![ScriptedRound::ok(vec![EntryOutcome::ok(0)])]);
        let queue = TaskQueue::new(1);
        let ctx = Arc::new(CallContext::new());
        ctx.cancel();

        let (tx, rx) = mpsc::channel();
        AsyncRetryBulkApply::start(
            Arc::new(conn),
            queue.clone(),
            Arc::clone(&ctx),
            mutator(batch_of(&["a"])),
            Box::new(move |failures, status| {
                let _ = tx.send((failures, status));
            }),
        );

        let (failures, status) = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("callback did not fire");
        assert_eq!(status.code(), StatusCode::Cancelled);
        assert_eq!(failures.len(), 1);
        queue.shutdown();
    }
}
