use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broker::{Delivery, Subscription};

/// Why a handler could not process a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The payload can never be processed. Rejected without requeue.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Processing failed but may succeed later. Requeued up to the
    /// consumer's redelivery limit.
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Processes one message payload.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Decode a JSON payload, classifying decode failures as malformed.
pub fn decode_json<T: DeserializeOwned>(payload: &[u8]) -> Result<T, HandlerError> {
    serde_json::from_slice(payload).map_err(|e| HandlerError::Malformed(e.to_string()))
}

/// Consumer loop settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Requeues allowed after a [`HandlerError::Failed`] before the message
    /// is dropped.
    pub max_redeliveries: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: 3,
        }
    }
}

/// Counters reported when a consumer loop exits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
    pub dropped: u64,
}

/// What the loop did with one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Acked,
    Rejected,
    Requeued,
    Dropped,
}

/// Consume `subscription` sequentially until `shutdown` flips to `true`,
/// its sender is dropped, or the broker closes.
///
/// Every delivery is settled explicitly after the handler returns: acked on
/// success, rejected on a malformed payload, requeued on failure until
/// `max_redeliveries` is exhausted, then dropped.
pub async fn run_consumer<H>(
    mut subscription: Subscription,
    handler: Arc<H>,
    config: ConsumerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> ConsumerStats
where
    H: MessageHandler + ?Sized,
{
    let topic = subscription.topic().to_string();
    let mut stats = ConsumerStats::default();
    info!(topic = %topic, "consumer started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        let delivery = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            next = subscription.next() => match next {
                Some(delivery) => delivery,
                None => break,
            },
        };

        match process(&topic, delivery, handler.as_ref(), config).await {
            Outcome::Acked => stats.acked += 1,
            Outcome::Rejected => stats.rejected += 1,
            Outcome::Requeued => stats.requeued += 1,
            Outcome::Dropped => stats.dropped += 1,
        }
    }

    info!(
        topic = %topic,
        acked = stats.acked,
        rejected = stats.rejected,
        requeued = stats.requeued,
        dropped = stats.dropped,
        "consumer stopped"
    );
    stats
}

async fn process<H>(topic: &str, delivery: Delivery, handler: &H, config: ConsumerConfig) -> Outcome
where
    H: MessageHandler + ?Sized,
{
    let tag = delivery.tag();
    let result = handler.handle(delivery.payload()).await;
    let (outcome, settled) = match result {
        Ok(()) => {
            debug!(topic, delivery_tag = tag, "message processed");
            (Outcome::Acked, delivery.ack())
        }
        Err(HandlerError::Malformed(reason)) => {
            warn!(topic, delivery_tag = tag, %reason, "rejecting malformed message");
            (Outcome::Rejected, delivery.nack(false))
        }
        Err(HandlerError::Failed(reason)) if delivery.redeliveries() < config.max_redeliveries => {
            warn!(
                topic,
                delivery_tag = tag,
                redeliveries = delivery.redeliveries(),
                %reason,
                "handler failed; requeueing"
            );
            (Outcome::Requeued, delivery.nack(true))
        }
        Err(HandlerError::Failed(reason)) => {
            error!(
                topic,
                delivery_tag = tag,
                redeliveries = delivery.redeliveries(),
                %reason,
                "handler failed; redelivery limit reached, dropping message"
            );
            (Outcome::Dropped, delivery.nack(false))
        }
    };

    if let Err(e) = settled {
        error!(topic, delivery_tag = tag, error = %e, "failed to settle delivery");
    }
    outcome
}
