//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, missing accounts, rejected debits). Storage faults belong to the
/// infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested account was not found.
    #[error("not found")]
    NotFound,

    /// A debit asked for more than the available balance.
    ///
    /// This is an expected business rejection, not a system fault.
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    /// A credit would take the balance past the largest storable value.
    #[error("balance limit exceeded: balance {balance}, requested {requested}")]
    LimitExceeded { balance: Decimal, requested: Decimal },
}

impl DomainError {
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

    pub fn insufficient_funds(balance: Decimal, requested: Decimal) -> Self {
        Self::InsufficientFunds { balance, requested }
    }

    pub fn limit_exceeded(balance: Decimal, requested: Decimal) -> Self {
        Self::LimitExceeded { balance, requested }
    }
}
