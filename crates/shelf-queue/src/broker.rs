use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::message::{MessageId, QueuedMessage, WalRecord};
use crate::wal::{SyncMode, WriteAheadLog};

/// Anything that can put a message on a topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` to `topic`. Returns the message id.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> QueueResult<MessageId>;
}

/// Serialize `value` as JSON and publish it.
pub async fn publish_json<P, T>(publisher: &P, topic: &str, value: &T) -> QueueResult<MessageId>
where
    P: Publisher + ?Sized,
    T: Serialize + Sync,
{
    let payload = serde_json::to_vec(value).map_err(|e| QueueError::Serialization(e.to_string()))?;
    publisher.publish(topic, payload).await
}

/// Depth snapshot for one topic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TopicStats {
    /// Messages waiting to be delivered.
    pub ready: usize,
    /// Messages delivered but not yet acked or nacked.
    pub unacked: usize,
}

#[derive(Clone, Debug)]
struct Pending {
    message: QueuedMessage,
    redeliveries: u32,
}

#[derive(Default)]
struct TopicState {
    ready: VecDeque<Pending>,
    unacked: HashMap<u64, Pending>,
    next_tag: u64,
    closed: bool,
}

struct Topic {
    name: String,
    state: Mutex<TopicState>,
    notify: Notify,
    wal: Option<WriteAheadLog>,
}

impl Topic {
    fn lock(&self) -> QueueResult<MutexGuard<'_, TopicState>> {
        self.state.lock().map_err(|_| QueueError::LockPoisoned)
    }

    /// Record that a message left the topic. Once nothing is outstanding the
    /// WAL is emptied so it does not grow without bound.
    fn settle_in_wal(&self, state: &TopicState, id: MessageId) -> QueueResult<()> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };
        if state.ready.is_empty() && state.unacked.is_empty() {
            wal.truncate()
        } else {
            wal.append(&WalRecord::Settled(id)).map(|_| ())
        }
    }

    fn wake(&self) {
        self.notify.notify_one();
    }
}

/// In-process message broker with durable, at-least-once topics.
///
/// Each topic keeps a ready queue and a table of unacked deliveries. When
/// the broker is opened on a data directory every topic gets its own WAL
/// (`<data_dir>/<topic>.wal`): publishes and settlements are logged, and
/// messages that were never settled are replayed when the topic is next
/// declared. Delivery order is publish order; a requeued message goes back
/// to the front.
pub struct Broker {
    topics: Mutex<HashMap<String, Arc<Topic>>>,
    data_dir: Option<PathBuf>,
    sync_mode: SyncMode,
}

impl Broker {
    /// A broker whose topics live only in memory.
    pub fn in_memory() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            data_dir: None,
            sync_mode: SyncMode::default(),
        }
    }

    /// A broker persisting every topic under `data_dir`.
    pub fn open(data_dir: &Path, sync_mode: SyncMode) -> QueueResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        info!(data_dir = %data_dir.display(), "broker opened");
        Ok(Self {
            topics: Mutex::new(HashMap::new()),
            data_dir: Some(data_dir.to_path_buf()),
            sync_mode,
        })
    }

    pub fn is_durable(&self) -> bool {
        self.data_dir.is_some()
    }

    /// Declare a topic, replaying its WAL the first time. Declaring an
    /// existing topic is a no-op. Returns the number of replayed messages.
    pub fn declare(&self, name: &str) -> QueueResult<usize> {
        let mut topics = self.topics.lock().map_err(|_| QueueError::LockPoisoned)?;
        if topics.contains_key(name) {
            return Ok(0);
        }
        validate_topic(name)?;

        let mut state = TopicState::default();
        let wal = match &self.data_dir {
            Some(dir) => {
                let wal = WriteAheadLog::open(&dir.join(format!("{name}.wal")), self.sync_mode)?;
                let pending = unsettled(wal.recover()?);
                let records: Vec<WalRecord> =
                    pending.iter().cloned().map(WalRecord::Published).collect();
                wal.rewrite(&records)?;
                state.ready = pending
                    .into_iter()
                    .map(|message| Pending {
                        message,
                        redeliveries: 0,
                    })
                    .collect();
                Some(wal)
            }
            None => None,
        };

        let replayed = state.ready.len();
        if replayed > 0 {
            info!(topic = name, replayed, "replaying unsettled messages");
        } else {
            debug!(topic = name, "topic declared");
        }

        topics.insert(
            name.to_string(),
            Arc::new(Topic {
                name: name.to_string(),
                state: Mutex::new(state),
                notify: Notify::new(),
                wal,
            }),
        );
        Ok(replayed)
    }

    /// Attach a consumer to `topic`, declaring it if needed.
    pub fn subscribe(&self, topic: &str) -> QueueResult<Subscription> {
        Ok(Subscription {
            topic: self.topic(topic)?,
        })
    }

    /// Publish synchronously. The message is in the WAL (when durable)
    /// before this returns.
    pub fn publish_now(&self, topic: &str, payload: Vec<u8>) -> QueueResult<MessageId> {
        let topic = self.topic(topic)?;
        let message = QueuedMessage::new(topic.name.clone(), payload);
        let id = message.id;

        {
            let mut state = topic.lock()?;
            if state.closed {
                return Err(QueueError::Closed);
            }
            if let Some(wal) = &topic.wal {
                wal.append(&WalRecord::Published(message.clone()))?;
            }
            state.ready.push_back(Pending {
                message,
                redeliveries: 0,
            });
        }
        topic.wake();

        debug!(topic = %topic.name, message_id = %id, "published");
        Ok(id)
    }

    pub fn stats(&self, topic: &str) -> QueueResult<TopicStats> {
        let topic = self.topic(topic)?;
        let state = topic.lock()?;
        Ok(TopicStats {
            ready: state.ready.len(),
            unacked: state.unacked.len(),
        })
    }

    /// Stop accepting publishes and end every subscription once its ready
    /// queue is observed closed. Unsettled messages stay in the WAL.
    pub fn close(&self) -> QueueResult<()> {
        let topics = self.topics.lock().map_err(|_| QueueError::LockPoisoned)?;
        for topic in topics.values() {
            topic.lock()?.closed = true;
            topic.notify.notify_waiters();
            topic.wake();
        }
        info!("broker closed");
        Ok(())
    }

    fn topic(&self, name: &str) -> QueueResult<Arc<Topic>> {
        self.declare(name)?;
        let topics = self.topics.lock().map_err(|_| QueueError::LockPoisoned)?;
        topics
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::InvalidTopic(name.to_string()))
    }
}

#[async_trait]
impl Publisher for Broker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> QueueResult<MessageId> {
        self.publish_now(topic, payload)
    }
}

fn validate_topic(name: &str) -> QueueResult<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(QueueError::InvalidTopic(name.to_string()))
    }
}

/// Published messages without a matching settlement, in publish order.
fn unsettled(records: Vec<WalRecord>) -> Vec<QueuedMessage> {
    let settled: HashSet<MessageId> = records
        .iter()
        .filter_map(|r| match r {
            WalRecord::Settled(id) => Some(*id),
            WalRecord::Published(_) => None,
        })
        .collect();
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|r| match r {
            WalRecord::Published(m) if !settled.contains(&m.id) && seen.insert(m.id) => Some(m),
            _ => None,
        })
        .collect()
}

/// A consumer's handle on one topic.
pub struct Subscription {
    topic: Arc<Topic>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic.name
    }

    /// Wait for the next message. Returns `None` once the broker is closed.
    ///
    /// Cancel-safe: a message is only taken off the ready queue in the same
    /// synchronous step that hands it out.
    pub async fn next(&mut self) -> Option<Delivery> {
        loop {
            match self.try_next() {
                Ok(Some(delivery)) => return Some(delivery),
                Ok(None) => {}
                Err(QueueError::Closed) => return None,
                Err(e) => {
                    warn!(topic = %self.topic.name, error = %e, "subscription failed");
                    return None;
                }
            }
            self.topic.notify.notified().await;
        }
    }

    /// Take the next ready message without waiting.
    pub fn try_next(&mut self) -> QueueResult<Option<Delivery>> {
        let mut state = self.topic.lock()?;
        if state.closed {
            return Err(QueueError::Closed);
        }
        let Some(pending) = state.ready.pop_front() else {
            return Ok(None);
        };

        state.next_tag += 1;
        let tag = state.next_tag;
        state.unacked.insert(tag, pending.clone());

        debug!(
            topic = %self.topic.name,
            delivery_tag = tag,
            redeliveries = pending.redeliveries,
            "delivered"
        );
        Ok(Some(Delivery {
            tag,
            message: pending.message,
            redeliveries: pending.redeliveries,
            topic: Arc::clone(&self.topic),
            settled: false,
        }))
    }
}

/// A message handed to a consumer. Must be settled with [`Delivery::ack`]
/// or [`Delivery::nack`]; a delivery dropped unsettled goes back to the
/// front of its topic.
pub struct Delivery {
    tag: u64,
    message: QueuedMessage,
    redeliveries: u32,
    topic: Arc<Topic>,
    settled: bool,
}

impl Delivery {
    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    pub fn message(&self) -> &QueuedMessage {
        &self.message
    }

    /// How many times this message was handed out before this delivery.
    pub fn redeliveries(&self) -> u32 {
        self.redeliveries
    }

    /// Processing succeeded; remove the message permanently.
    pub fn ack(mut self) -> QueueResult<()> {
        self.settled = true;
        self.remove()
    }

    /// Processing failed. With `requeue` the message goes back to the front
    /// of the topic; without it the message is discarded.
    pub fn nack(mut self, requeue: bool) -> QueueResult<()> {
        self.settled = true;
        if requeue {
            self.requeue()
        } else {
            self.remove()
        }
    }

    fn remove(&self) -> QueueResult<()> {
        let mut state = self.topic.lock()?;
        if state.unacked.remove(&self.tag).is_none() {
            return Err(self.unknown());
        }
        self.topic.settle_in_wal(&state, self.message.id)
    }

    fn requeue(&self) -> QueueResult<()> {
        {
            let mut state = self.topic.lock()?;
            let Some(mut pending) = state.unacked.remove(&self.tag) else {
                return Err(self.unknown());
            };
            pending.redeliveries += 1;
            state.ready.push_front(pending);
        }
        self.topic.wake();
        Ok(())
    }

    fn unknown(&self) -> QueueError {
        QueueError::UnknownDelivery {
            topic: self.topic.name.clone(),
            tag: self.tag,
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!(
            topic = %self.topic.name,
            delivery_tag = self.tag,
            "delivery dropped unsettled; requeueing"
        );
        if let Err(e) = self.requeue() {
            warn!(topic = %self.topic.name, error = %e, "requeue on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(d: &Delivery) -> String {
        String::from_utf8(d.payload().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let broker = Broker::in_memory();
        let mut sub = broker.subscribe("stock_updates").unwrap();
        broker.publish_now("stock_updates", b"1".to_vec()).unwrap();
        broker.publish_now("stock_updates", b"2".to_vec()).unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(body(&first), "1");
        first.ack().unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(body(&second), "2");
        second.ack().unwrap();

        assert_eq!(broker.stats("stock_updates").unwrap(), TopicStats::default());
    }

    #[tokio::test]
    async fn waiting_subscriber_wakes_on_publish() {
        let broker = Arc::new(Broker::in_memory());
        let mut sub = broker.subscribe("t").unwrap();

        let publisher = Arc::clone(&broker);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            publisher.publish("t", b"late".to_vec()).await.unwrap();
        });

        let delivery = sub.next().await.unwrap();
        assert_eq!(body(&delivery), "late");
        delivery.ack().unwrap();
    }

    #[tokio::test]
    async fn nack_requeue_redelivers_first() {
        let broker = Broker::in_memory();
        let mut sub = broker.subscribe("t").unwrap();
        broker.publish_now("t", b"a".to_vec()).unwrap();
        broker.publish_now("t", b"b".to_vec()).unwrap();

        let a = sub.next().await.unwrap();
        assert_eq!(a.redeliveries(), 0);
        a.nack(true).unwrap();

        let again = sub.next().await.unwrap();
        assert_eq!(body(&again), "a");
        assert_eq!(again.redeliveries(), 1);
        again.nack(false).unwrap();

        let b = sub.next().await.unwrap();
        assert_eq!(body(&b), "b");
        b.ack().unwrap();
    }

    #[tokio::test]
    async fn dropped_delivery_is_requeued() {
        let broker = Broker::in_memory();
        let mut sub = broker.subscribe("t").unwrap();
        broker.publish_now("t", b"x".to_vec()).unwrap();

        {
            let _lost = sub.next().await.unwrap();
            assert_eq!(broker.stats("t").unwrap().unacked, 1);
        }
        assert_eq!(broker.stats("t").unwrap().ready, 1);

        let retry = sub.try_next().unwrap().unwrap();
        assert_eq!(retry.redeliveries(), 1);
        retry.ack().unwrap();
    }

    #[tokio::test]
    async fn close_ends_subscriptions_and_rejects_publish() {
        let broker = Broker::in_memory();
        let mut sub = broker.subscribe("t").unwrap();
        broker.close().unwrap();

        assert!(sub.next().await.is_none());
        assert!(matches!(
            broker.publish_now("t", b"x".to_vec()),
            Err(QueueError::Closed)
        ));
    }

    #[tokio::test]
    async fn publish_json_encodes_payload() {
        #[derive(Serialize)]
        struct Ping {
            n: u32,
        }
        let broker = Broker::in_memory();
        let mut sub = broker.subscribe("t").unwrap();
        publish_json(&broker, "t", &Ping { n: 4 }).await.unwrap();

        let d = sub.next().await.unwrap();
        assert_eq!(body(&d), r#"{"n":4}"#);
        d.ack().unwrap();
    }

    #[test]
    fn rejects_bad_topic_names() {
        let broker = Broker::in_memory();
        assert!(broker.declare("").is_err());
        assert!(broker.declare("../escape").is_err());
        assert!(broker.declare("book_deleted_queue").is_ok());
    }

    #[tokio::test]
    async fn unsettled_messages_replay_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let broker = Broker::open(dir.path(), SyncMode::EveryWrite).unwrap();
            let mut sub = broker.subscribe("t").unwrap();
            broker.publish_now("t", b"done".to_vec()).unwrap();
            broker.publish_now("t", b"in-flight".to_vec()).unwrap();
            broker.publish_now("t", b"queued".to_vec()).unwrap();

            sub.next().await.unwrap().ack().unwrap();
            let in_flight = sub.next().await.unwrap();
            assert_eq!(body(&in_flight), "in-flight");
            // Simulate a crash: the delivery is never settled.
            std::mem::forget(in_flight);
        }

        let broker = Broker::open(dir.path(), SyncMode::default()).unwrap();
        assert_eq!(broker.declare("t").unwrap(), 2);
        let mut sub = broker.subscribe("t").unwrap();
        let first = sub.next().await.unwrap();
        assert_eq!(body(&first), "in-flight");
        first.ack().unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(body(&second), "queued");
        second.ack().unwrap();
    }

    #[tokio::test]
    async fn fully_settled_topic_leaves_empty_wal() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::open(dir.path(), SyncMode::default()).unwrap();
        let mut sub = broker.subscribe("t").unwrap();
        broker.publish_now("t", b"a".to_vec()).unwrap();
        sub.next().await.unwrap().ack().unwrap();

        let len = std::fs::metadata(dir.path().join("t.wal")).unwrap().len();
        assert_eq!(len, 0);
    }
}
