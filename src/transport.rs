//! Transport boundary: wire message shapes and the streaming call contract.
//!
//! The bulk engine treats the wire encoding as opaque; these structs are the
//! request/response pair handed to a `Connection`. A real connection speaks
//! the service protocol; tests script one (see `crate::testing`).

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::{NamespaceId, RowMutation, TableId};
use crate::status::Status;

/// One streaming bulk-write request: the entries of a single round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutateRowsRequest {
    pub namespace: NamespaceId,
    pub table: TableId,
    pub entries: Vec<RowMutation>,
}

/// One chunk of a bulk-write response stream.
///
/// The service reports per-entry outcomes incrementally; a single call yields
/// zero or more chunks followed by a terminal call status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutateRowsResponse {
    pub entries: Vec<EntryOutcome>,
}

/// Outcome for one entry, addressed by its position in the *current* request
/// (not the caller's original batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub index: usize,
    pub status: Status,
}

impl EntryOutcome {
    pub fn ok(index: usize) -> Self {
        EntryOutcome {
            index,
            status: Status::ok(),
        }
    }

    pub fn failed(index: usize, status: Status) -> Self {
        EntryOutcome { index, status }
    }
}

/// Per-call context: carries the caller's cancellation signal.
///
/// Shared (via `Arc`) between the caller and whatever thread executes the
/// call. The engine adds no timeout of its own; deadlines belong to the
/// transport or the retry driver.
#[derive(Debug, Default)]
pub struct CallContext {
    cancelled: AtomicBool,
}

impl CallContext {
    pub fn new() -> Self {
        CallContext {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Ask the in-flight call to stop. The call completes with a `Cancelled`
    /// status, handled like any other call failure.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A connection able to issue the streaming bulk-write call.
///
/// Contract: `on_chunk` is invoked once per response chunk, in delivery
/// order, on the calling thread; the return value is the call's terminal
/// status, produced after the last chunk. Implementations must observe
/// `ctx.is_cancelled()` and finish early with a `Cancelled` status.
pub trait Connection: Send + Sync {
    fn mutate_rows(
        &self,
        ctx: &CallContext,
        request: &MutateRowsRequest,
        on_chunk: &mut dyn FnMut(MutateRowsResponse),
    ) -> Status;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mutation;
    use crate::status::StatusCode;

    #[test]
    fn request_roundtrip() {
        let request = MutateRowsRequest {
            namespace: NamespaceId::parse("prod").unwrap(),
            table: TableId::parse("events").unwrap(),
            entries: vec![RowMutation::new("r1").with(Mutation::delete_from_family("cf"))],
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: MutateRowsRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn chunk_roundtrip() {
        let chunk = MutateRowsResponse {
            entries: vec![
                EntryOutcome::ok(0),
                EntryOutcome::failed(1, Status::new(StatusCode::Unavailable, "busy")),
            ],
        };
        let json = serde_json::to_string(&chunk).unwrap();
        let parsed: MutateRowsResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, chunk);
    }

    #[test]
    fn cancel_flag() {
        let ctx = CallContext::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }
}
