use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Duration as Span;
use shelf_ledger::{Ledger, NewEntry, Transaction};
use shelf_types::{Action, BookId, Status, StockUpdate, TransactionId, UserId};
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info};

use crate::clock::Clock;
use crate::error::{LendingError, LendingResult};
use crate::outbox::Outbox;
use crate::settings::{Settings, SettingsProvider, SettingsUpdate};

/// Days subtracted by [`LendingService::make_late`] when no positive value
/// is given.
pub const DEFAULT_DAYS_LATE: i64 = 3;

/// Runtime knobs for [`LendingService`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LendingConfig {
    /// Upper bound on each operation, storage calls included.
    pub request_timeout: Duration,
    /// Serialize borrow and return per user so the duplicate and limit
    /// checks cannot interleave with another request's append.
    pub serialize_borrows: bool,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
            serialize_borrows: true,
        }
    }
}

type UserLocks = Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>;

/// Holds one user's borrow lock. On drop the lock is released and its map
/// entry removed once no other request holds or awaits it.
struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(&self.user_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&self.user_id);
            }
        }
    }
}

/// Borrow/return orchestration over a [`Ledger`].
///
/// Every public operation runs under `request_timeout`; a timeout aborts the
/// pending storage call and surfaces as [`LendingError::Timeout`]. Stock
/// events go through the [`Outbox`] after the ledger write has committed.
pub struct LendingService {
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) settings: SettingsProvider,
    pub(crate) clock: Arc<dyn Clock>,
    outbox: Outbox,
    config: LendingConfig,
    user_locks: UserLocks,
}

impl LendingService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        settings: SettingsProvider,
        clock: Arc<dyn Clock>,
        outbox: Outbox,
        config: LendingConfig,
    ) -> Self {
        Self {
            ledger,
            settings,
            clock,
            outbox,
            config,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> LendingConfig {
        self.config
    }

    /// Run `op` under the request timeout.
    pub(crate) async fn bounded<T, F>(&self, op: &'static str, fut: F) -> LendingResult<T>
    where
        F: Future<Output = LendingResult<T>>,
    {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                error!(op, timeout_ms = self.config.request_timeout.as_millis() as u64, "operation timed out");
                Err(LendingError::Timeout(self.config.request_timeout))
            }
        }
    }

    async fn lock_user(&self, user_id: UserId) -> LendingResult<Option<UserGuard<'_>>> {
        if !self.config.serialize_borrows {
            return Ok(None);
        }
        let lock = {
            let mut locks = self.user_locks.lock().map_err(|_| LendingError::LockPoisoned)?;
            Arc::clone(locks.entry(user_id).or_default())
        };
        Ok(Some(UserGuard {
            locks: &self.user_locks,
            user_id,
            guard: Some(lock.lock_owned().await),
        }))
    }

    /// Borrow `book_id` for `user_id`.
    ///
    /// Rejected while the user has any unpaid fine, already holds this book,
    /// or is at the borrow limit. On success the borrow entry is returned
    /// and a stock decrement is queued.
    pub async fn borrow_book(&self, user_id: UserId, book_id: BookId) -> LendingResult<Transaction> {
        self.bounded("borrow_book", self.do_borrow(user_id, book_id))
            .await
    }

    /// Return `book_id` for `user_id`.
    ///
    /// Closes the active borrow and appends a completed return entry that
    /// carries the overdue fine, if any. A stock increment is queued.
    pub async fn return_book(&self, user_id: UserId, book_id: BookId) -> LendingResult<Transaction> {
        self.bounded("return_book", self.do_return(user_id, book_id))
            .await
    }

    /// The user's entries, newest first.
    pub async fn history(&self, user_id: UserId) -> LendingResult<Vec<Transaction>> {
        self.bounded("history", async {
            self.ledger.by_user(user_id).await.map_err(LendingError::from)
        })
        .await
    }

    /// Every entry, newest first.
    pub async fn all_history(&self) -> LendingResult<Vec<Transaction>> {
        self.bounded("all_history", async {
            self.ledger.all().await.map_err(LendingError::from)
        })
        .await
    }

    /// The user's outstanding fines, newest first.
    pub async fn my_fines(&self, user_id: UserId) -> LendingResult<Vec<Transaction>> {
        self.bounded("my_fines", async {
            self.ledger.unpaid_fines(user_id).await.map_err(LendingError::from)
        })
        .await
    }

    /// Move a borrow's due date `days` into the past so a return incurs a
    /// fine. Testing aid; `days <= 0` uses [`DEFAULT_DAYS_LATE`], and a
    /// `days` that takes the date out of range is rejected.
    pub async fn make_late(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
        days: i64,
    ) -> LendingResult<Transaction> {
        self.bounded("make_late", self.do_make_late(user_id, tx_id, days))
            .await
    }

    /// Soft-delete every entry for a removed book.
    pub async fn delete_by_book(&self, book_id: BookId) -> LendingResult<usize> {
        self.bounded("delete_by_book", self.do_delete_by_book(book_id))
            .await
    }

    pub async fn get_settings(&self) -> LendingResult<Settings> {
        self.bounded("get_settings", self.settings.load()).await
    }

    /// Apply a partial update and return the resulting settings.
    pub async fn update_settings(&self, update: &SettingsUpdate) -> LendingResult<Settings> {
        self.bounded("update_settings", self.settings.update(update))
            .await
    }

    async fn do_borrow(&self, user_id: UserId, book_id: BookId) -> LendingResult<Transaction> {
        let _guard = self.lock_user(user_id).await?;

        if !self.ledger.unpaid_fines(user_id).await?.is_empty() {
            return Err(LendingError::UnpaidFines);
        }
        if self.ledger.active_borrow(user_id, book_id).await?.is_some() {
            return Err(LendingError::AlreadyBorrowed);
        }

        let settings = self.settings.load().await?;
        let active = self.ledger.count_active_borrows(user_id).await?;
        if active >= settings.max_borrow_limit.max(0) as u64 {
            return Err(LendingError::LimitReached {
                limit: settings.max_borrow_limit,
            });
        }

        let now = self.clock.now();
        let due = now
            .checked_add_signed(settings.borrow_period()?)
            .ok_or(LendingError::OutOfRange("due date"))?;
        let tx = self
            .ledger
            .append(NewEntry::borrow(user_id, book_id, due, now))
            .await?;

        info!(tx_id = %tx.id, %user_id, %book_id, due = %due, "book borrowed");
        self.outbox.stock_update(StockUpdate::borrowed(book_id));
        Ok(tx)
    }

    async fn do_return(&self, user_id: UserId, book_id: BookId) -> LendingResult<Transaction> {
        let _guard = self.lock_user(user_id).await?;

        let borrow = self
            .ledger
            .active_borrow(user_id, book_id)
            .await?
            .ok_or(LendingError::NoActiveBorrow)?;

        let now = self.clock.now();
        let fine = match borrow.due_date {
            Some(due) if now > due => self.settings.load().await?.fine_policy().fine(due, now),
            _ => 0,
        };

        let mut closed = borrow;
        closed.status = Status::Returned;
        closed.updated_at = now;
        self.ledger.update(&closed).await?;

        let entry = self
            .ledger
            .append(NewEntry::returned(user_id, book_id, fine, now))
            .await?;

        info!(tx_id = %entry.id, borrow_id = %closed.id, %user_id, %book_id, fine, "book returned");
        self.outbox.stock_update(StockUpdate::returned(book_id));
        Ok(entry)
    }

    async fn do_make_late(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
        days: i64,
    ) -> LendingResult<Transaction> {
        let mut tx = self.owned_transaction(user_id, tx_id).await?;
        if tx.action != Action::Borrow {
            return Err(LendingError::NotABorrow);
        }
        if tx.status == Status::Returned {
            return Err(LendingError::AlreadyReturned);
        }

        let days = if days > 0 { days } else { DEFAULT_DAYS_LATE };
        let now = self.clock.now();
        let due = Span::try_days(days)
            .and_then(|back| now.checked_sub_signed(back))
            .ok_or(LendingError::OutOfRange("days"))?;
        tx.due_date = Some(due);
        tx.updated_at = now;
        let tx = self.ledger.update(&tx).await?;

        info!(tx_id = %tx.id, %user_id, days, "borrow marked late");
        Ok(tx)
    }

    async fn do_delete_by_book(&self, book_id: BookId) -> LendingResult<usize> {
        let now = self.clock.now();
        let removed = self.ledger.soft_delete_by_book(book_id, now).await?;
        info!(%book_id, removed, "transactions soft-deleted for removed book");
        Ok(removed)
    }

    /// Fetch a transaction and check that `user_id` owns it.
    pub(crate) async fn owned_transaction(
        &self,
        user_id: UserId,
        tx_id: TransactionId,
    ) -> LendingResult<Transaction> {
        let tx = self.transaction(tx_id).await?;
        if tx.user_id != user_id {
            return Err(LendingError::NotOwner(tx_id));
        }
        Ok(tx)
    }

    pub(crate) async fn transaction(&self, tx_id: TransactionId) -> LendingResult<Transaction> {
        self.ledger
            .get(tx_id)
            .await?
            .ok_or(LendingError::TransactionNotFound(tx_id))
    }
}
