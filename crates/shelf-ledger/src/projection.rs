//! Relational derivation of "active borrow" state.
//!
//! A borrow entry is active when no return entry for the same (user, book)
//! pair was created after it. These functions work on any slice of entries,
//! so storage backends can share the definition instead of keeping a flag.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shelf_types::{Action, BookId, TransactionId, UserId};

use crate::records::Transaction;

type OrderKey = (DateTime<Utc>, TransactionId);

/// All active borrow entries among `entries`, newest first.
///
/// Soft-deleted entries are ignored. Several active borrows may exist for
/// one pair if entries were written out of band; each of them counts.
pub fn active_borrows<'a, I>(entries: I) -> Vec<&'a Transaction>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let live: Vec<&Transaction> = entries.into_iter().filter(|t| !t.is_deleted()).collect();

    let mut latest_return: HashMap<(UserId, BookId), OrderKey> = HashMap::new();
    for entry in live.iter().filter(|t| t.action == Action::Return) {
        let key = entry.order_key();
        latest_return
            .entry((entry.user_id, entry.book_id))
            .and_modify(|k| {
                if key > *k {
                    *k = key;
                }
            })
            .or_insert(key);
    }

    let mut active: Vec<&Transaction> = live
        .into_iter()
        .filter(|t| t.action == Action::Borrow)
        .filter(|t| match latest_return.get(&(t.user_id, t.book_id)) {
            Some(returned_at) => t.order_key() > *returned_at,
            None => true,
        })
        .collect();

    active.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
    active
}

/// The latest active borrow among `entries`, if any.
pub fn latest_active_borrow<'a, I>(entries: I) -> Option<&'a Transaction>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    active_borrows(entries).into_iter().next()
}
