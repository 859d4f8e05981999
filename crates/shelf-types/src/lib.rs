//! Foundation types for Shelf, the library lending backend.
//!
//! Every other Shelf crate depends on `shelf-types`. Nothing in here performs
//! I/O; the crate only defines the vocabulary shared by the ledger, the
//! lending service, the catalog, and the message queue.
//!
//! # Key Types
//!
//! - [`UserId`], [`BookId`], [`TransactionId`] - numeric identifiers
//! - [`Role`] - caller role carried by the auth context
//! - [`TimeUnit`] - granularity for borrow periods and fine billing
//! - [`Action`], [`Status`], [`PaymentMethod`] - ledger entry vocabulary
//! - [`StockUpdate`], [`BookDeleted`] - queue payloads exchanged between services

pub mod error;
pub mod events;
pub mod ids;
pub mod ledger;
pub mod role;
pub mod unit;

pub use error::TypeError;
pub use events::{topics, BookDeleted, StockUpdate};
pub use ids::{BookId, TransactionId, UserId};
pub use ledger::{Action, PaymentMethod, Status};
pub use role::Role;
pub use unit::TimeUnit;
