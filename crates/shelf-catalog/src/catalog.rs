use std::sync::Arc;

use serde::Serialize;
use shelf_queue::{publish_json, Publisher};
use shelf_types::{topics, BookDeleted, BookId};
use tracing::{info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::store::StockStore;

/// Current stock for one book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub book_id: BookId,
    pub stock: i64,
}

/// Catalog-side operations that the lending flow depends on.
pub struct Catalog {
    store: Arc<dyn StockStore>,
    publisher: Arc<dyn Publisher>,
}

impl Catalog {
    pub fn new(store: Arc<dyn StockStore>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    pub async fn stock(&self, book_id: BookId) -> CatalogResult<StockLevel> {
        let stock = self
            .store
            .stock(book_id)
            .await?
            .ok_or(CatalogError::BookNotFound(book_id))?;
        Ok(StockLevel { book_id, stock })
    }

    /// Set a book's stock, adding the book if it is new.
    pub async fn set_stock(&self, book_id: BookId, stock: i64) -> CatalogResult<StockLevel> {
        if stock < 0 {
            return Err(CatalogError::InvalidStock(stock));
        }
        self.store.set_stock(book_id, stock).await?;
        info!(%book_id, stock, "stock set");
        Ok(StockLevel { book_id, stock })
    }

    /// Remove a book and announce it on `book_deleted_queue`.
    ///
    /// The removal stands even if the announcement cannot be published.
    pub async fn delete_book(&self, book_id: BookId) -> CatalogResult<()> {
        if !self.store.remove(book_id).await? {
            return Err(CatalogError::BookNotFound(book_id));
        }
        info!(%book_id, "book deleted");

        let event = BookDeleted { book_id };
        match publish_json(self.publisher.as_ref(), topics::BOOK_DELETED, &event).await {
            Ok(message_id) => info!(%book_id, %message_id, topic = topics::BOOK_DELETED, "book deleted event published"),
            Err(e) => warn!(%book_id, error = %e, topic = topics::BOOK_DELETED, "failed to publish book deleted event"),
        }
        Ok(())
    }
}
