use std::io;

/// Errors produced by the message broker.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// I/O error during WAL operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Payload or WAL record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The broker has been closed and accepts no more messages.
    #[error("broker is closed")]
    Closed,

    /// Topic names must be non-empty and usable as file names.
    #[error("invalid topic name: {0:?}")]
    InvalidTopic(String),

    /// A delivery tag that is no longer outstanding was settled.
    #[error("delivery {tag} on topic {topic} is not outstanding")]
    UnknownDelivery { topic: String, tag: u64 },

    /// A broker lock was poisoned by a panicking thread.
    #[error("broker lock poisoned")]
    LockPoisoned,
}

/// Convenience alias used throughout the queue crate.
pub type QueueResult<T> = std::result::Result<T, QueueError>;
