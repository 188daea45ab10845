use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;
use uuid::Uuid;

use crate::entity::OwnerId;

/// The category of number being allocated.
///
/// Each `(owner, kind)` pair has its own independent counter starting
/// at 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SequenceKind {
    Invoice,
    JobCard,
}

impl SequenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceKind::Invoice => "invoice",
            SequenceKind::JobCard => "job_card",
        }
    }
}

impl Display for SequenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-owner document number.
///
/// Numbers are positive, unique within `(owner, kind)`, and strictly
/// increasing in commit order. `Display` renders the zero-padded form
/// used on printed documents (`00042`).
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct SequenceNumber(pub i64);

impl SequenceNumber {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:05}", self.0)
    }
}

impl From<i64> for SequenceNumber {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Ledger persistence errors.
///
/// `LockTimeout` and `NumberConflict` are transient: the caller owns the
/// retry decision and should re-run the whole creation request. Anything
/// else is fatal to the single request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("timed out waiting for the {kind} counter lock of owner {owner}")]
    LockTimeout { owner: OwnerId, kind: SequenceKind },

    #[error("duplicate {kind} number {number} for owner {owner}")]
    NumberConflict {
        owner: OwnerId,
        kind: SequenceKind,
        number: SequenceNumber,
    },

    #[error("{kind} {id} not found for owner {owner}")]
    NotFound {
        owner: OwnerId,
        kind: SequenceKind,
        id: Uuid,
    },

    #[error("backend error: {reason}")]
    Backend { reason: String },
}

impl LedgerError {
    /// Whether the caller may retry the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout { .. } | LedgerError::NumberConflict { .. }
        )
    }

    pub fn backend(reason: impl Display) -> Self {
        LedgerError::Backend {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_zero_padded() {
        assert_eq!(SequenceNumber(7).to_string(), "00007");
        assert_eq!(SequenceNumber(42).to_string(), "00042");
        assert_eq!(SequenceNumber(123_456).to_string(), "123456");
    }

    #[test]
    fn retryable_classification() {
        let owner = OwnerId(1);
        assert!(LedgerError::LockTimeout {
            owner,
            kind: SequenceKind::Invoice
        }
        .is_retryable());
        assert!(LedgerError::NumberConflict {
            owner,
            kind: SequenceKind::JobCard,
            number: SequenceNumber(3)
        }
        .is_retryable());
        assert!(!LedgerError::backend("connection refused").is_retryable());
        assert!(!LedgerError::NotFound {
            owner,
            kind: SequenceKind::Invoice,
            id: Uuid::now_v7()
        }
        .is_retryable());
    }
}
