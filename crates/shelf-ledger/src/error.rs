use shelf_types::TransactionId;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("transaction not found: {0}")]
    NotFound(TransactionId),

    #[error("transaction {id}: field `{field}` cannot change after append")]
    IdentityChanged { id: TransactionId, field: &'static str },

    #[error("transaction {id} is {status}; field `{field}` is frozen")]
    Frozen {
        id: TransactionId,
        status: shelf_types::Status,
        field: &'static str,
    },

    #[error("transaction {0} has been deleted")]
    Deleted(TransactionId),

    #[error("ledger lock poisoned")]
    LockPoisoned,

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
