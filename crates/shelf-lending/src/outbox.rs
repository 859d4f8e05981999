use std::sync::Arc;

use shelf_queue::{publish_json, Publisher};
use shelf_types::{topics, StockUpdate};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hand-off point between request handlers and the queue.
///
/// Enqueueing never waits on the broker. A background task drains the
/// channel and publishes; failures there are logged and the event is lost,
/// which the catalog tolerates as stock drift.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<StockUpdate>,
}

/// Receiving half, drained by [`run_publisher`].
pub type OutboxReceiver = mpsc::UnboundedReceiver<StockUpdate>;

impl Outbox {
    /// An outbox and its receiving half, for callers that drive publishing
    /// themselves.
    pub fn channel() -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// An outbox with its publisher task already running. The task ends
    /// once every clone of the outbox is dropped and returns how many
    /// events it published.
    pub fn spawn(publisher: Arc<dyn Publisher>) -> (Self, JoinHandle<u64>) {
        let (outbox, rx) = Self::channel();
        let handle = tokio::spawn(run_publisher(rx, publisher));
        (outbox, handle)
    }

    /// Queue a stock delta for publishing.
    pub fn stock_update(&self, update: StockUpdate) {
        if self.tx.send(update).is_err() {
            warn!(book_id = %update.book_id, action = %update.action, "outbox closed; stock update dropped");
        }
    }
}

/// Publish every queued stock update to [`topics::STOCK_UPDATES`] until the
/// channel closes.
pub async fn run_publisher(mut rx: OutboxReceiver, publisher: Arc<dyn Publisher>) -> u64 {
    let mut published = 0;
    while let Some(update) = rx.recv().await {
        match publish_json(publisher.as_ref(), topics::STOCK_UPDATES, &update).await {
            Ok(message_id) => {
                published += 1;
                debug!(
                    topic = topics::STOCK_UPDATES,
                    book_id = %update.book_id,
                    quantity = update.quantity,
                    %message_id,
                    "stock update published"
                );
            }
            Err(e) => warn!(
                topic = topics::STOCK_UPDATES,
                book_id = %update.book_id,
                quantity = update.quantity,
                error = %e,
                "failed to publish stock update"
            ),
        }
    }
    published
}
