//! Call and per-entry outcome codes.
//!
//! The service reports one `Status` per streaming call and one per entry in
//! the response stream. `StatusCode::transience()` is the single table that
//! decides which codes are worth retrying; everything else in the crate
//! consults it rather than hard-coding code sets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Transience;

/// Canonical service error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::Ok => "ok",
            StatusCode::Cancelled => "cancelled",
            StatusCode::Unknown => "unknown",
            StatusCode::InvalidArgument => "invalid_argument",
            StatusCode::DeadlineExceeded => "deadline_exceeded",
            StatusCode::NotFound => "not_found",
            StatusCode::AlreadyExists => "already_exists",
            StatusCode::PermissionDenied => "permission_denied",
            StatusCode::ResourceExhausted => "resource_exhausted",
            StatusCode::FailedPrecondition => "failed_precondition",
            StatusCode::Aborted => "aborted",
            StatusCode::OutOfRange => "out_of_range",
            StatusCode::Unimplemented => "unimplemented",
            StatusCode::Internal => "internal",
            StatusCode::Unavailable => "unavailable",
            StatusCode::DataLoss => "data_loss",
            StatusCode::Unauthenticated => "unauthenticated",
        }
    }

    /// Whether retrying a call (or entry) that failed with this code may
    /// succeed.
    ///
    /// This is the classification table: transient outages and contention are
    /// retryable, everything else is permanent. Retrying `Ok` never helps, so
    /// it classifies as permanent too.
    pub fn transience(self) -> Transience {
        match self {
            StatusCode::Unavailable
            | StatusCode::DeadlineExceeded
            | StatusCode::Aborted
            | StatusCode::ResourceExhausted => Transience::Retryable,
            _ => Transience::Permanent,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a call or of a single entry within a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    code: StatusCode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Status {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Status {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    /// Whether retrying may succeed, per `StatusCode::transience()`.
    pub fn is_retryable(&self) -> bool {
        self.code.transience().is_retryable()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transience_table() {
        assert!(StatusCode::Unavailable.transience().is_retryable());
        assert!(StatusCode::DeadlineExceeded.transience().is_retryable());
        assert!(StatusCode::Aborted.transience().is_retryable());
        assert!(StatusCode::ResourceExhausted.transience().is_retryable());

        assert!(!StatusCode::Ok.transience().is_retryable());
        assert!(!StatusCode::InvalidArgument.transience().is_retryable());
        assert!(!StatusCode::PermissionDenied.transience().is_retryable());
        assert!(!StatusCode::NotFound.transience().is_retryable());
        assert!(!StatusCode::Cancelled.transience().is_retryable());
        assert!(!StatusCode::Internal.transience().is_retryable());
    }

    #[test]
    fn display_includes_message() {
        let status = Status::new(StatusCode::Unavailable, "backend overloaded");
        assert_eq!(status.to_string(), "unavailable: backend overloaded");
        assert_eq!(Status::ok().to_string(), "ok");
    }

    #[test]
    fn status_roundtrip() {
        let status = Status::new(StatusCode::NotFound, "no such row");
        let json = serde_json::to_string(&status).unwrap();
        let parsed: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }
}
