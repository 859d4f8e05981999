use serde::{Deserialize, Serialize};

use crate::ids::BookId;
use crate::ledger::Action;

/// Queue names shared by the lending and catalog services.
pub mod topics {
    /// Stock deltas published by the lending service on borrow and return.
    pub const STOCK_UPDATES: &str = "stock_updates";
    /// Book removals published by the catalog service.
    pub const BOOK_DELETED: &str = "book_deleted_queue";
}

/// Instruction to the catalog to apply `stock += quantity` for a book.
///
/// Wire format (JSON): `{"book_id": 7, "action": "borrow", "quantity": -1}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
    pub book_id: BookId,
    pub action: Action,
    pub quantity: i64,
}

impl StockUpdate {
    /// One copy leaves the shelf.
    pub fn borrowed(book_id: BookId) -> Self {
        Self {
            book_id,
            action: Action::Borrow,
            quantity: -1,
        }
    }

    /// One copy comes back.
    pub fn returned(book_id: BookId) -> Self {
        Self {
            book_id,
            action: Action::Return,
            quantity: 1,
        }
    }
}

/// Notification that a book was removed from the catalog.
///
/// Wire format (JSON): `{"book_id": 7}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDeleted {
    pub book_id: BookId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_update_wire_format() {
        let json = serde_json::to_value(StockUpdate::borrowed(BookId::new(7))).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"book_id": 7, "action": "borrow", "quantity": -1})
        );
    }

    #[test]
    fn returned_is_positive() {
        let update = StockUpdate::returned(BookId::new(1));
        assert_eq!(update.quantity, 1);
        assert_eq!(update.action, Action::Return);
    }

    #[test]
    fn book_deleted_parses_from_catalog_payload() {
        let event: BookDeleted = serde_json::from_slice(br#"{"book_id": 7}"#).unwrap();
        assert_eq!(event.book_id, BookId::new(7));
    }

    #[test]
    fn book_deleted_rejects_missing_id() {
        assert!(serde_json::from_slice::<BookDeleted>(br#"{"id": 7}"#).is_err());
    }
}
