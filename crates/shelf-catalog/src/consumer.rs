use std::sync::Arc;

use async_trait::async_trait;
use shelf_queue::{decode_json, HandlerError, MessageHandler};
use shelf_types::StockUpdate;
use tracing::{info, warn};

use crate::store::StockStore;

/// Applies `stock_updates` messages as `stock += quantity`.
///
/// There is no deduplication: a redelivered message is applied again.
/// Updates for unknown books are logged and acknowledged.
pub struct StockUpdateHandler {
    store: Arc<dyn StockStore>,
}

impl StockUpdateHandler {
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MessageHandler for StockUpdateHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let update: StockUpdate = decode_json(payload)?;

        match self.store.adjust(update.book_id, update.quantity).await {
            Ok(Some(stock)) => {
                info!(
                    book_id = %update.book_id,
                    action = %update.action,
                    quantity = update.quantity,
                    stock,
                    "stock updated"
                );
                Ok(())
            }
            Ok(None) => {
                warn!(book_id = %update.book_id, quantity = update.quantity, "stock update for unknown book ignored");
                Ok(())
            }
            Err(e) => Err(HandlerError::Failed(e.to_string())),
        }
    }
}
