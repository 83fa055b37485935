//! In-process fakes for exercising the bulk engine without a service.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::status::{Status, StatusCode};
use crate::transport::{
    CallContext, Connection, EntryOutcome, MutateRowsRequest, MutateRowsResponse,
};

/// Build a response chunk from entry outcomes.
pub fn chunk(entries: Vec<EntryOutcome>) -> MutateRowsResponse {
    MutateRowsResponse { entries }
}

/// One scripted call: the chunks to stream, then the final call status.
pub struct ScriptedRound {
    chunks: Vec<MutateRowsResponse>,
    status: Status,
}

impl ScriptedRound {
    pub fn new(chunks: Vec<MutateRowsResponse>, status: Status) -> Self {
        ScriptedRound { chunks, status }
    }

    /// A round that streams one chunk and finishes OK.
    pub fn ok(entries: Vec<EntryOutcome>) -> Self {
        ScriptedRound::new(vec![chunk(entries)], Status::ok())
    }

    /// A round whose stream breaks before any chunk is delivered.
    pub fn broken(status: Status) -> Self {
        ScriptedRound::new(Vec::new(), status)
    }
}

/// Connection fake that replays a fixed script, one round per call, and
/// records every request it receives.
pub struct ScriptedConnection {
    rounds: Mutex<VecDeque<ScriptedRound>>,
    requests: Mutex<Vec<MutateRowsRequest>>,
}

impl ScriptedConnection {
    pub fn new(rounds: Vec<ScriptedRound>) -> Self {
        ScriptedConnection {
            rounds: Mutex::new(rounds.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The requests seen so far, in call order.
    pub fn requests(&self) -> Vec<MutateRowsRequest> {
        self.requests
            .lock()
            .expect("scripted connection lock poisoned")
            .clone()
    }
}

impl Connection for ScriptedConnection {
    fn mutate_rows(
        &self,
        ctx: &CallContext,
        request: &MutateRowsRequest,
        on_chunk: &mut dyn FnMut(MutateRowsResponse),
    ) -> Status {
        self.requests
            .lock()
            .expect("scripted connection lock poisoned")
            .push(request.clone());

        if ctx.is_cancelled() {
            return Status::new(StatusCode::Cancelled, "call cancelled");
        }

        let round = self
            .rounds
            .lock()
            .expect("scripted connection lock poisoned")
            .pop_front();
        let Some(round) = round else {
            return Status::new(StatusCode::Internal, "script exhausted");
        };

        for chunk in round.chunks {
            if ctx.is_cancelled() {
                return Status::new(StatusCode::Cancelled, "call cancelled");
            }
            on_chunk(chunk);
        }
        round.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NamespaceId, TableId};

    fn request() -> MutateRowsRequest {
        MutateRowsRequest {
            namespace: NamespaceId::default(),
            table: TableId::parse("t").unwrap(),
            entries: Vec::new(),
        }
    }

    #[test]
    fn replays_rounds_in_order_then_reports_exhaustion() {
        let conn = ScriptedConnection::new(vec![
            ScriptedRound::broken(Status::new(StatusCode::Unavailable, "reset")),
            ScriptedRound::ok(Vec::new()),
        ]);
        let ctx = CallContext::new();
        let mut sink = |_chunk: MutateRowsResponse| {};

        assert_eq!(
            conn.mutate_rows(&ctx, &request(), &mut sink).code(),
            StatusCode::Unavailable
        );
        assert!(conn.mutate_rows(&ctx, &request(), &mut sink).is_ok());
        assert_eq!(
            conn.mutate_rows(&ctx, &request(), &mut sink).code(),
            StatusCode::Internal
        );
        assert_eq!(conn.requests().len(), 3);
    }

    #[test]
    fn cancelled_context_short_circuits() {
        let conn = ScriptedConnection::new(vec![ScriptedRound::ok(Vec::new())]);
        let ctx = CallContext::new();
        ctx.cancel();

        let mut chunks = 0;
        let status = conn.mutate_rows(&ctx, &request(), &mut |_| chunks += 1);
        assert_eq!(status.code(), StatusCode::Cancelled);
        assert_eq!(chunks, 0);
    }
}
