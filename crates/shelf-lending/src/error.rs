use std::time::Duration;

use shelf_ledger::LedgerError;
use shelf_types::TransactionId;

/// Errors produced by the lending workflows.
///
/// The `Display` text of the business-rule variants is user-facing and is
/// returned verbatim in API responses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LendingError {
    #[error("you have unpaid fines, please pay them first")]
    UnpaidFines,

    #[error("you have already borrowed this book")]
    AlreadyBorrowed,

    #[error("limit reached: max {limit} books borrowed")]
    LimitReached { limit: i64 },

    #[error("active borrow record not found")]
    NoActiveBorrow,

    #[error("transaction not found")]
    TransactionNotFound(TransactionId),

    #[error("unauthorized: this transaction does not belong to you")]
    NotOwner(TransactionId),

    #[error("no fine to pay for this transaction")]
    NoFineOwed,

    #[error("fine already paid")]
    AlreadyPaid,

    #[error("payment is already pending verification")]
    PaymentPending,

    #[error("invalid payment method (qris/manual)")]
    InvalidPaymentMethod(String),

    #[error("invalid action")]
    InvalidAction(String),

    #[error("only borrow transactions can be made late")]
    NotABorrow,

    #[error("book already returned")]
    AlreadyReturned,

    #[error("invalid order id: {0:?}")]
    InvalidOrderId(String),

    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("{0} is out of range")]
    OutOfRange(&'static str),

    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Coarse classification used to pick a transport status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    BusinessRule,
    Unauthorized,
    Forbidden,
    Internal,
}

impl LendingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPaymentMethod(_)
            | Self::InvalidAction(_)
            | Self::InvalidOrderId(_)
            | Self::InvalidSetting { .. }
            | Self::OutOfRange(_) => ErrorKind::Validation,
            Self::TransactionNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyBorrowed | Self::AlreadyPaid | Self::PaymentPending => {
                ErrorKind::Conflict
            }
            Self::UnpaidFines
            | Self::LimitReached { .. }
            | Self::NoActiveBorrow
            | Self::NoFineOwed
            | Self::NotABorrow
            | Self::AlreadyReturned => ErrorKind::BusinessRule,
            Self::NotOwner(_) => ErrorKind::Forbidden,
            Self::Timeout(_) | Self::LockPoisoned | Self::Ledger(_) => ErrorKind::Internal,
        }
    }
}

/// Result alias for lending operations.
pub type LendingResult<T> = Result<T, LendingError>;
