//! Lending core for Shelf.
//!
//! Everything between an authenticated request and the ledger:
//! - [`settings`]: configuration store, typed settings with defaults
//! - [`fine`]: the pure overdue-fine calculator
//! - [`service`]: borrow/return orchestration with per-request timeouts
//! - [`payment`]: fine payment, admin verification, gateway callbacks
//! - [`outbox`]: non-blocking hand-off of stock events to the broker
//! - [`consumer`]: cascade soft-delete on `book_deleted_queue`

pub mod clock;
pub mod consumer;
pub mod error;
pub mod fine;
pub mod outbox;
pub mod payment;
pub mod service;
pub mod settings;

pub use clock::{Clock, ManualClock, SystemClock};
pub use consumer::BookDeletedHandler;
pub use error::{ErrorKind, LendingError, LendingResult};
pub use fine::{fine, FinePolicy};
pub use outbox::{run_publisher, Outbox, OutboxReceiver};
pub use payment::{CallbackOutcome, PaymentReceipt, Verification};
pub use service::{LendingConfig, LendingService, DEFAULT_DAYS_LATE};
pub use settings::{
    ConfigStore, InMemoryConfigStore, Settings, SettingsProvider, SettingsUpdate, MAX_BORROW_DAYS,
};
