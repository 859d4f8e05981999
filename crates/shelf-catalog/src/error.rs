use shelf_types::BookId;

/// Errors produced by catalog stock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("book not found: {0}")]
    BookNotFound(BookId),

    #[error("stock must not be negative, got {0}")]
    InvalidStock(i64),

    #[error("catalog lock poisoned")]
    LockPoisoned,
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BookNotFound(_))
    }
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
