use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelf_types::{BookId, TransactionId, UserId};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::projection;
use crate::records::{NewEntry, Transaction};
use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory ledger for tests, local demos, and embedding.
///
/// Entries live in one vector (position = id - 1) with secondary indexes on
/// user, book, and the (user, book) pair. The pair index is what the
/// active-borrow queries scan.
pub struct InMemoryLedger {
    inner: RwLock<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    entries: Vec<Transaction>,
    pairs: HashMap<(UserId, BookId), Vec<usize>>,
    by_user: HashMap<UserId, Vec<usize>>,
    by_book: HashMap<BookId, Vec<usize>>,
}

impl LedgerState {
    fn live<'a>(&'a self, positions: &'a [usize]) -> impl Iterator<Item = &'a Transaction> + 'a {
        positions
            .iter()
            .filter_map(|&pos| self.entries.get(pos))
            .filter(|t| !t.is_deleted())
    }

    fn position(id: TransactionId) -> Option<usize> {
        usize::try_from(id.get()).ok()?.checked_sub(1)
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerState::default()),
        }
    }

    /// Number of entries ever appended, including soft-deleted ones.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.inner.write().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(mut entries: Vec<Transaction>) -> Vec<Transaction> {
    entries.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
    entries
}

/// Enforce append-only identity and the frozen state of settled entries.
fn check_update(stored: &Transaction, next: &Transaction) -> LedgerResult<()> {
    if stored.is_deleted() {
        return Err(LedgerError::Deleted(stored.id));
    }

    let identity = [
        ("user_id", stored.user_id != next.user_id),
        ("book_id", stored.book_id != next.book_id),
        ("action", stored.action != next.action),
        ("created_at", stored.created_at != next.created_at),
    ];
    if let Some((field, _)) = identity.iter().find(|(_, changed)| *changed) {
        return Err(LedgerError::IdentityChanged {
            id: stored.id,
            field: *field,
        });
    }

    if stored.status.is_settled() {
        let frozen = [
            ("due_date", stored.due_date != next.due_date),
            ("return_date", stored.return_date != next.return_date),
            ("fine", stored.fine != next.fine),
        ];
        if let Some((field, _)) = frozen.iter().find(|(_, changed)| *changed) {
            return Err(LedgerError::Frozen {
                id: stored.id,
                status: stored.status,
                field: *field,
            });
        }
    }

    Ok(())
}

#[async_trait]
impl LedgerWriter for InMemoryLedger {
    async fn append(&self, entry: NewEntry) -> LedgerResult<Transaction> {
        let mut state = self.write()?;

        let pos = state.entries.len();
        let id = TransactionId::new(pos as u64 + 1);
        let tx = entry.into_transaction(id);

        state
            .pairs
            .entry((tx.user_id, tx.book_id))
            .or_default()
            .push(pos);
        state.by_user.entry(tx.user_id).or_default().push(pos);
        state.by_book.entry(tx.book_id).or_default().push(pos);
        state.entries.push(tx.clone());

        debug!(tx_id = %id, user_id = %tx.user_id, book_id = %tx.book_id, action = %tx.action, "ledger append");
        Ok(tx)
    }

    async fn update(&self, tx: &Transaction) -> LedgerResult<Transaction> {
        let mut state = self.write()?;

        let stored = LedgerState::position(tx.id)
            .and_then(|pos| state.entries.get_mut(pos))
            .ok_or(LedgerError::NotFound(tx.id))?;

        check_update(stored, tx)?;

        let mut next = tx.clone();
        next.deleted_at = stored.deleted_at;
        *stored = next.clone();

        debug!(tx_id = %tx.id, status = %tx.status, "ledger update");
        Ok(next)
    }

    async fn soft_delete_by_book(
        &self,
        book_id: BookId,
        at: DateTime<Utc>,
    ) -> LedgerResult<usize> {
        let mut state = self.write()?;

        let positions = state.by_book.get(&book_id).cloned().unwrap_or_default();
        let mut marked = 0;
        for pos in positions {
            if let Some(entry) = state.entries.get_mut(pos) {
                if entry.deleted_at.is_none() {
                    entry.deleted_at = Some(at);
                    marked += 1;
                }
            }
        }

        debug!(book_id = %book_id, marked, "ledger soft delete");
        Ok(marked)
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn get(&self, id: TransactionId) -> LedgerResult<Option<Transaction>> {
        let state = self.read()?;
        Ok(LedgerState::position(id)
            .and_then(|pos| state.entries.get(pos))
            .filter(|t| !t.is_deleted())
            .cloned())
    }

    async fn by_user(&self, user_id: UserId) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        let entries = match state.by_user.get(&user_id) {
            Some(positions) => state.live(positions).cloned().collect(),
            None => Vec::new(),
        };
        Ok(newest_first(entries))
    }

    async fn all(&self) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        let entries = state
            .entries
            .iter()
            .filter(|t| !t.is_deleted())
            .cloned()
            .collect();
        Ok(newest_first(entries))
    }

    async fn active_borrow(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> LedgerResult<Option<Transaction>> {
        let state = self.read()?;
        let Some(positions) = state.pairs.get(&(user_id, book_id)) else {
            return Ok(None);
        };
        Ok(projection::latest_active_borrow(state.live(positions)).cloned())
    }

    async fn count_active_borrows(&self, user_id: UserId) -> LedgerResult<u64> {
        let state = self.read()?;
        let Some(positions) = state.by_user.get(&user_id) else {
            return Ok(0);
        };
        Ok(projection::active_borrows(state.live(positions)).len() as u64)
    }

    async fn unpaid_fines(&self, user_id: UserId) -> LedgerResult<Vec<Transaction>> {
        let state = self.read()?;
        let entries = match state.by_user.get(&user_id) {
            Some(positions) => state
                .live(positions)
                .filter(|t| t.has_unpaid_fine())
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(newest_first(entries))
    }
}
