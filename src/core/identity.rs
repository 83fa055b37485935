//! Identity atoms.
//!
//! NamespaceId: routing namespace for a table (may be empty = default)
//! TableId: table identifier within a namespace
//! RowKey: opaque row key bytes

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failure for an identifier.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("invalid namespace id {raw:?}: {reason}")]
    Namespace { raw: String, reason: String },

    #[error("invalid table id {raw:?}: {reason}")]
    Table { raw: String, reason: String },
}

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz-_.";

fn check_alphabet(s: &str) -> Option<String> {
    for c in s.bytes() {
        if !ID_ALPHABET.contains(&c) {
            return Some(format!("invalid character {:?}", c as char));
        }
    }
    None
}

/// Namespace identifier - lowercase alphanumeric plus `-_.`.
///
/// The empty namespace is valid and means "the service default"; requests
/// carry it verbatim.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceId(String);

impl NamespaceId {
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidId> {
        let s = s.into();
        if let Some(reason) = check_alphabet(&s) {
            return Err(InvalidId::Namespace { raw: s, reason });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamespaceId({:?})", self.0)
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Table identifier - non-empty, lowercase alphanumeric plus `-_.`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidId> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Table {
                raw: s,
                reason: "empty".into(),
            });
        }
        if let Some(reason) = check_alphabet(&s) {
            return Err(InvalidId::Table { raw: s, reason });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({:?})", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque row key bytes.
///
/// The service imposes no structure; keys sort bytewise.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(Vec<u8>);

impl RowKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for RowKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for RowKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({:?})", String::from_utf8_lossy(&self.0))
    }
}
