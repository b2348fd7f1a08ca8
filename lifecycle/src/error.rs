//! Error taxonomy for the ticket lifecycle core.
//!
//! Every core operation returns either a success value or one of these typed
//! failures. Nothing is silently swallowed at the aggregate layer; callers
//! decide how to surface each kind. QR decode is the one deliberate
//! exception: an invalid code is an expected outcome and is reported as
//! `valid = false` by the codec, never as an error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TicketTypeId;

/// Failure kinds surfaced by lifecycle operations.
///
/// The variants map one-to-one onto caller-facing outcomes:
/// validation failures and not-found lookups are terminal, conflicts mean a
/// state-machine precondition was violated, and backend failures may be
/// retried manually by the caller (the core never retries on its own).
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LifecycleError {
    /// Malformed input (bad email, missing fields). Not retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced ticket/event/type/transfer is absent. Not retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state-machine precondition was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Ticket type sold out at purchase time.
    ///
    /// The availability check is check-then-act against a shared counter, so
    /// a concurrent purchase can still win the last seat after the check
    /// passes. The backing store is the authority of record.
    #[error("ticket type {0} is sold out")]
    InventoryExhausted(TicketTypeId),

    /// No authenticated user for a mutating operation.
    #[error("not authenticated")]
    Unauthenticated,

    /// The persistence service rejected or failed the operation.
    #[error("backend unavailable: {0}")]
    Backend(String),
}

impl LifecycleError {
    /// Short machine-readable kind label, stable across message changes.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::InventoryExhausted(_) => "INVENTORY_EXHAUSTED",
            Self::Unauthenticated => "NOT_AUTHENTICATED",
            Self::Backend(_) => "BACKEND_UNAVAILABLE",
        }
    }
}

/// Result alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
