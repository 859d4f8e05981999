use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelf_types::{BookId, TransactionId, UserId};

use crate::error::LedgerResult;
use crate::records::{NewEntry, Transaction};

/// Write boundary for ledger mutations.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Append a new entry and return it with its assigned id.
    async fn append(&self, entry: NewEntry) -> LedgerResult<Transaction>;

    /// Replace a stored entry with `tx`.
    ///
    /// Implementations must reject changes to `user_id`, `book_id`, `action`
    /// and `created_at`, changes to non-payment fields of settled entries,
    /// and any update of a soft-deleted entry.
    async fn update(&self, tx: &Transaction) -> LedgerResult<Transaction>;

    /// Soft-delete every entry referencing `book_id`. Returns how many
    /// entries were newly marked.
    async fn soft_delete_by_book(&self, book_id: BookId, at: DateTime<Utc>)
        -> LedgerResult<usize>;
}

/// Read boundary for ledger queries. Soft-deleted entries are invisible.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn get(&self, id: TransactionId) -> LedgerResult<Option<Transaction>>;

    /// Entries for one user, newest first.
    async fn by_user(&self, user_id: UserId) -> LedgerResult<Vec<Transaction>>;

    /// Every entry, newest first.
    async fn all(&self) -> LedgerResult<Vec<Transaction>>;

    /// Latest borrow for the pair with no later return.
    async fn active_borrow(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> LedgerResult<Option<Transaction>>;

    /// Number of borrow entries for the user with no later return for the
    /// same book.
    async fn count_active_borrows(&self, user_id: UserId) -> LedgerResult<u64>;

    /// Entries with `fine > 0` and no `paid_at`, newest first.
    async fn unpaid_fines(&self, user_id: UserId) -> LedgerResult<Vec<Transaction>>;
}

/// A full ledger backend.
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> Ledger for T {}
