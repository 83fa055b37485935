//! Row mutations and batches.
//!
//! A `Mutation` is one cell-level write op. A `RowMutation` groups the ops
//! for a single row. A `BulkMutation` is the caller's ordered batch; it is
//! immutable once handed to the bulk engine, and every entry keeps its
//! 0-based position in the batch (the *original index*) for error reporting.

use serde::{Deserialize, Serialize};

use super::identity::RowKey;

/// Cell timestamp for `SetCell`.
///
/// `ServerAssigned` lets the service pick the commit time, which makes the
/// write non-idempotent: re-applying it creates a second cell version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timestamp {
    ServerAssigned,
    /// Explicit timestamp in microseconds since the epoch.
    At(i64),
}

/// One cell-level write operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    SetCell {
        family: String,
        qualifier: Vec<u8>,
        timestamp: Timestamp,
        value: Vec<u8>,
    },

    DeleteFromColumn { family: String, qualifier: Vec<u8> },

    DeleteFromFamily { family: String },

    DeleteRow,
}

impl Mutation {
    /// Set a cell with a server-assigned timestamp.
    ///
    /// Convenient, but not idempotent under the safe idempotency policy;
    /// prefer `set_cell_at` for blind-retry safety.
    pub fn set_cell(
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Mutation::SetCell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: Timestamp::ServerAssigned,
            value: value.into(),
        }
    }

    /// Set a cell at an explicit timestamp (microseconds).
    pub fn set_cell_at(
        family: impl Into<String>,
        qualifier: impl Into<Vec<u8>>,
        timestamp_micros: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Mutation::SetCell {
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp: Timestamp::At(timestamp_micros),
            value: value.into(),
        }
    }

    pub fn delete_from_column(family: impl Into<String>, qualifier: impl Into<Vec<u8>>) -> Self {
        Mutation::DeleteFromColumn {
            family: family.into(),
            qualifier: qualifier.into(),
        }
    }

    pub fn delete_from_family(family: impl Into<String>) -> Self {
        Mutation::DeleteFromFamily {
            family: family.into(),
        }
    }
}

/// One row's set of write operations: a single entry in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMutation {
    pub row_key: RowKey,
    pub mutations: Vec<Mutation>,
}

impl RowMutation {
    pub fn new(row_key: impl Into<RowKey>) -> Self {
        RowMutation {
            row_key: row_key.into(),
            mutations: Vec::new(),
        }
    }

    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }
}

/// The caller's ordered batch of row mutations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkMutation {
    entries: Vec<RowMutation>,
}

impl BulkMutation {
    pub fn new() -> Self {
        BulkMutation {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: RowMutation) {
        self.entries.push(entry);
    }

    pub fn with(mut self, entry: RowMutation) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowMutation> {
        self.entries.iter()
    }

    pub(crate) fn into_entries(self) -> Vec<RowMutation> {
        self.entries
    }
}

impl From<Vec<RowMutation>> for BulkMutation {
    fn from(entries: Vec<RowMutation>) -> Self {
        BulkMutation { entries }
    }
}

impl FromIterator<RowMutation> for BulkMutation {
    fn from_iter<I: IntoIterator<Item = RowMutation>>(iter: I) -> Self {
        BulkMutation {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_roundtrip() {
        let m = Mutation::set_cell_at("cf", b"col".to_vec(), 1_000, b"v".to_vec());
        let json = serde_json::to_string(&m).unwrap();
        let parsed: Mutation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, m);
        assert!(json.contains("set_cell"));
    }

    #[test]
    fn batch_preserves_order() {
        let batch: BulkMutation = (0..4)
            .map(|i| RowMutation::new(format!("row-{i}").as_str()).with(Mutation::delete_from_family("cf")))
            .collect();
        assert_eq!(batch.len(), 4);
        let keys: Vec<_> = batch.iter().map(|e| e.row_key.clone()).collect();
        assert_eq!(keys[0], RowKey::from("row-0"));
        assert_eq!(keys[3], RowKey::from("row-3"));
    }
}
