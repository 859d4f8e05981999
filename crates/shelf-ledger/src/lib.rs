//! Transaction ledger for Shelf.
//!
//! The ledger is an append/update-only log of borrow and return entries.
//! This crate provides:
//! - The [`Transaction`] record and the [`NewEntry`] append request
//! - `LedgerWriter` / `LedgerReader` trait boundaries
//! - [`InMemoryLedger`], indexed by (user, book) for relational queries
//! - [`projection`] helpers that derive "active borrow" state from entries
//!
//! # Design Rules
//!
//! 1. Borrow and return are separate entries; nothing links them except the
//!    (user, book) pair and creation order.
//! 2. An active borrow is a borrow entry with no later return entry for the
//!    same pair. There is no stored "is active" flag.
//! 3. Identity fields never change after append. Returned and completed
//!    entries only accept payment-field updates.
//! 4. Entries are never removed; a book deletion soft-deletes them and they
//!    disappear from every query.

pub mod error;
pub mod memory;
pub mod projection;
pub mod records;
pub mod traits;

pub use error::{LedgerError, LedgerResult};
pub use memory::InMemoryLedger;
pub use projection::{active_borrows, latest_active_borrow};
pub use records::{NewEntry, Transaction};
pub use traits::{Ledger, LedgerReader, LedgerWriter};
