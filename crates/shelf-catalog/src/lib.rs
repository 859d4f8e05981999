//! Catalog stock for Shelf.
//!
//! Only the slice of the catalog that the lending flow touches: per-book
//! stock that follows `stock_updates`, and book removal that announces
//! itself on `book_deleted_queue`.

pub mod catalog;
pub mod consumer;
pub mod error;
pub mod store;

pub use catalog::{Catalog, StockLevel};
pub use consumer::StockUpdateHandler;
pub use error::{CatalogError, CatalogResult};
pub use store::{InMemoryStockStore, StockStore};
