use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broker-assigned message identity (UUIDv7, time ordered).
pub type MessageId = Uuid;

/// A message as stored by the broker.
///
/// The payload is opaque bytes; producers in this workspace put JSON in it.
/// There is no deduplication key: a message replayed after a crash keeps its
/// `id`, but consumers must tolerate seeing it twice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: MessageId,
    pub topic: String,
    /// Milliseconds since the Unix epoch at publish time.
    pub published_at_ms: u64,
    pub payload: Vec<u8>,
}

impl QueuedMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        let published_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            id: Uuid::now_v7(),
            topic: topic.into(),
            published_at_ms,
            payload,
        }
    }
}

/// Record kinds written to a topic's WAL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalRecord {
    /// A message entered the topic.
    Published(QueuedMessage),
    /// A message left the topic for good (acked, rejected, or dropped).
    Settled(MessageId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_messages_get_distinct_ids() {
        let a = QueuedMessage::new("t", b"a".to_vec());
        let b = QueuedMessage::new("t", b"b".to_vec());
        assert_ne!(a.id, b.id);
        assert_eq!(a.topic, "t");
        assert!(a.published_at_ms > 0);
    }

    #[test]
    fn wal_record_bincode_shape() {
        let msg = QueuedMessage::new("stock_updates", b"{}".to_vec());
        let record = WalRecord::Published(msg.clone());
        let bytes = bincode::serialize(&record).unwrap();
        let back: WalRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, WalRecord::Published(msg));
    }
}
