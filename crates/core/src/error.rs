//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conservation). Infrastructure concerns belong elsewhere. Every
/// kind is recoverable at the caller; no operation partially applies on error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A quantity was negative or otherwise unusable.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A monetary amount (unit price, shipping) was negative or malformed.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// A receipt would push cumulative received quantity past the ordered
    /// quantity for at least one line. The whole receipt is rejected.
    #[error("over-receipt: {0}")]
    OverReceipt(String),

    /// A history record was malformed (blank entity or event type).
    #[error("invalid history event: {0}")]
    InvalidHistoryEvent(String),

    /// A stale write was detected (optimistic version check failed).
    /// Callers should re-fetch and resubmit; the core never retries.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invalid_price(msg: impl Into<String>) -> Self {
        Self::InvalidPrice(msg.into())
    }

    pub fn over_receipt(msg: impl Into<String>) -> Self {
        Self::OverReceipt(msg.into())
    }

    pub fn invalid_history_event(msg: impl Into<String>) -> Self {
        Self::InvalidHistoryEvent(msg.into())
    }

    pub fn concurrent_modification(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
