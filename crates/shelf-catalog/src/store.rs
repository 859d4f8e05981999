use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use shelf_types::BookId;

use crate::error::{CatalogError, CatalogResult};

/// Per-book stock counts.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn stock(&self, book_id: BookId) -> CatalogResult<Option<i64>>;

    /// Set the absolute stock, registering the book if it is new.
    async fn set_stock(&self, book_id: BookId, stock: i64) -> CatalogResult<()>;

    /// Apply `stock += delta`. Returns the new stock, or `None` when the book
    /// is unknown (nothing is changed).
    async fn adjust(&self, book_id: BookId, delta: i64) -> CatalogResult<Option<i64>>;

    /// Remove a book. Returns whether it existed.
    async fn remove(&self, book_id: BookId) -> CatalogResult<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    books: RwLock<HashMap<BookId, i64>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_books<I: IntoIterator<Item = (BookId, i64)>>(books: I) -> Self {
        Self {
            books: RwLock::new(books.into_iter().collect()),
        }
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn stock(&self, book_id: BookId) -> CatalogResult<Option<i64>> {
        let books = self.books.read().map_err(|_| CatalogError::LockPoisoned)?;
        Ok(books.get(&book_id).copied())
    }

    async fn set_stock(&self, book_id: BookId, stock: i64) -> CatalogResult<()> {
        let mut books = self.books.write().map_err(|_| CatalogError::LockPoisoned)?;
        books.insert(book_id, stock);
        Ok(())
    }

    async fn adjust(&self, book_id: BookId, delta: i64) -> CatalogResult<Option<i64>> {
        let mut books = self.books.write().map_err(|_| CatalogError::LockPoisoned)?;
        Ok(books.get_mut(&book_id).map(|stock| {
            *stock = stock.saturating_add(delta);
            *stock
        }))
    }

    async fn remove(&self, book_id: BookId) -> CatalogResult<bool> {
        let mut books = self.books.write().map_err(|_| CatalogError::LockPoisoned)?;
        Ok(books.remove(&book_id).is_some())
    }
}
