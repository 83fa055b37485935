//! Client library for the rowkv remote row/key-value storage service.
//!
//! The centerpiece is bulk application of row mutations: a batch is sent as
//! one streaming call, per-entry outcomes are reconciled as chunks arrive,
//! and entries that failed transiently are resubmitted with backoff while
//! they remain safe to retry. Failures always report the entry's position in
//! the caller's original batch.
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowkv::{BulkMutation, ClientConfig, Mutation, NamespaceId, RowMutation, Table, TableId};
//! # fn connect() -> Arc<dyn rowkv::Connection> { unimplemented!() }
//!
//! let table = Table::new(
//!     connect(),
//!     NamespaceId::parse("prod")?,
//!     TableId::parse("events")?,
//!     &ClientConfig::default(),
//! );
//! let batch = BulkMutation::new()
//!     .with(RowMutation::new("row-1").with(Mutation::set_cell_at("cf", "col", 1, "v")));
//! let (failures, status) = table.bulk_apply(batch);
//! assert!(status.is_ok());
//! assert!(failures.is_empty());
//! # Ok::<(), rowkv::Error>(())
//! ```

#![forbid(unsafe_code)]

pub mod bulk;
pub mod config;
pub mod core;
pub mod error;
pub mod policy;
pub mod queue;
pub mod status;
pub mod table;
pub mod testing;
pub mod transport;

pub use bulk::{BulkMutator, FailedMutation, FailureKind};
pub use config::ClientConfig;
pub use core::{
    BulkMutation, InvalidId, Mutation, NamespaceId, RowKey, RowMutation, TableId, Timestamp,
};
pub use error::{Error, Transience};
pub use policy::{
    AlwaysIdempotentPolicy, IdempotencyPolicy, LimitedErrorCountRetryPolicy, RetryPolicy,
    SafeIdempotencyPolicy,
};
pub use status::{Status, StatusCode};
pub use table::Table;
pub use transport::{
    CallContext, Connection, EntryOutcome, MutateRowsRequest, MutateRowsResponse,
};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
