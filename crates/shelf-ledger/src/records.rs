use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelf_types::{Action, BookId, PaymentMethod, Status, TransactionId, UserId};

/// A single ledger entry: one borrow or one return.
///
/// The fine lives on the return entry that computed it. Payment fields
/// (`paid_at`, `payment_method`, `payment_proof`) are the only ones the
/// payment workflow touches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub action: Action,
    pub status: Status,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    /// Fine in the smallest currency unit.
    pub fine: i64,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_proof: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A fine is outstanding while it is positive and unpaid.
    pub fn has_unpaid_fine(&self) -> bool {
        self.fine > 0 && self.paid_at.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Chronological position: creation time, then id for entries created in
    /// the same instant.
    pub fn order_key(&self) -> (DateTime<Utc>, TransactionId) {
        (self.created_at, self.id)
    }

    /// Clear payment method and proof so the fine can be paid again.
    pub fn clear_payment(&mut self) {
        self.payment_method = None;
        self.payment_proof.clear();
    }
}

/// Request to append a new entry. The ledger assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEntry {
    pub user_id: UserId,
    pub book_id: BookId,
    pub action: Action,
    pub status: Status,
    pub due_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub fine: i64,
    pub created_at: DateTime<Utc>,
}

impl NewEntry {
    /// An active borrow due at `due_date`.
    pub fn borrow(
        user_id: UserId,
        book_id: BookId,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            book_id,
            action: Action::Borrow,
            status: Status::Active,
            due_date: Some(due_date),
            return_date: None,
            fine: 0,
            created_at: now,
        }
    }

    /// A completed return carrying whatever fine was computed for it.
    pub fn returned(user_id: UserId, book_id: BookId, fine: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            book_id,
            action: Action::Return,
            status: Status::Completed,
            due_date: None,
            return_date: Some(now),
            fine,
            created_at: now,
        }
    }

    pub(crate) fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            user_id: self.user_id,
            book_id: self.book_id,
            action: self.action,
            status: self.status,
            due_date: self.due_date,
            return_date: self.return_date,
            fine: self.fine,
            paid_at: None,
            payment_method: None,
            payment_proof: String::new(),
            created_at: self.created_at,
            updated_at: self.created_at,
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn borrow_entry_shape() {
        let entry = NewEntry::borrow(UserId::new(1), BookId::new(2), at(5), at(1))
            .into_transaction(TransactionId::new(9));
        assert_eq!(entry.action, Action::Borrow);
        assert_eq!(entry.status, Status::Active);
        assert_eq!(entry.due_date, Some(at(5)));
        assert_eq!(entry.fine, 0);
        assert_eq!(entry.created_at, entry.updated_at);
        assert!(!entry.has_unpaid_fine());
    }

    #[test]
    fn return_entry_carries_fine() {
        let entry = NewEntry::returned(UserId::new(1), BookId::new(2), 2000, at(3))
            .into_transaction(TransactionId::new(1));
        assert_eq!(entry.status, Status::Completed);
        assert_eq!(entry.return_date, Some(at(3)));
        assert!(entry.has_unpaid_fine());
    }

    #[test]
    fn paid_fine_is_not_outstanding() {
        let mut entry = NewEntry::returned(UserId::new(1), BookId::new(2), 500, at(3))
            .into_transaction(TransactionId::new(1));
        entry.paid_at = Some(at(4));
        assert!(!entry.has_unpaid_fine());
    }

    #[test]
    fn deleted_marker_is_not_serialized() {
        let mut entry = NewEntry::returned(UserId::new(1), BookId::new(2), 0, at(3))
            .into_transaction(TransactionId::new(1));
        entry.deleted_at = Some(at(4));
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("deleted_at").is_none());
        assert_eq!(json["action"], "return");
    }

    #[test]
    fn order_key_breaks_ties_by_id() {
        let a = NewEntry::returned(UserId::new(1), BookId::new(2), 0, at(3))
            .into_transaction(TransactionId::new(1));
        let b = NewEntry::returned(UserId::new(1), BookId::new(2), 0, at(3))
            .into_transaction(TransactionId::new(2));
        assert!(a.order_key() < b.order_key());
    }
}
