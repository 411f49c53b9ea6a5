use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Classification shared by every error the engine produces. Callers decide whether to retry, report or short-circuit
/// based on this, rather than on individual error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input (cart mismatch, withdrawal bounds, illegal transition request). Nothing was changed.
    Validation,
    /// The target is already in the requested, or a terminal, state. Safe to treat as a successful no-op.
    Conflict,
    /// Gateway timeouts, database contention and similar. The caller may retry.
    Transient,
    /// Something that should be unreachable, such as releasing refunded escrow. The transaction was aborted.
    InvariantViolation,
    NotFound,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transient => "transient",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::NotFound => "not_found",
        };
        f.write_str(s)
    }
}
