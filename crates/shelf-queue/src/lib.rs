//! Message broker for Shelf.
//!
//! A small in-process broker with the semantics the lending and catalog
//! services rely on:
//! - Named topics with publish-order delivery
//! - Explicit acknowledgement; unsettled deliveries are redelivered
//! - Optional per-topic write-ahead log so unsettled messages survive a
//!   restart (at-least-once, no deduplication)
//! - A sequential consumer loop with bounded redelivery

pub mod broker;
pub mod consumer;
pub mod error;
pub mod message;
pub mod wal;

pub use broker::{publish_json, Broker, Delivery, Publisher, Subscription, TopicStats};
pub use consumer::{
    decode_json, run_consumer, ConsumerConfig, ConsumerStats, HandlerError, MessageHandler,
};
pub use error::{QueueError, QueueResult};
pub use message::{MessageId, QueuedMessage, WalRecord};
pub use wal::{SyncMode, WriteAheadLog};
