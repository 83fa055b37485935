//! Core domain types: identifiers and the mutation model.

mod identity;
mod mutation;

pub use identity::{InvalidId, NamespaceId, RowKey, TableId};
pub use mutation::{BulkMutation, Mutation, RowMutation, Timestamp};
