use std::sync::Arc;

use async_trait::async_trait;
use shelf_queue::{decode_json, HandlerError, MessageHandler};
use shelf_types::BookDeleted;
use tracing::info;

use crate::service::LendingService;

/// Applies `book_deleted_queue` messages: every ledger entry for the book is
/// soft-deleted. Replays are harmless since already-deleted entries are
/// skipped.
pub struct BookDeletedHandler {
    service: Arc<LendingService>,
}

impl BookDeletedHandler {
    pub fn new(service: Arc<LendingService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for BookDeletedHandler {
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let event: BookDeleted = decode_json(payload)?;
        info!(book_id = %event.book_id, "received book deleted event");

        self.service
            .delete_by_book(event.book_id)
            .await
            .map(|_| ())
            .map_err(|e| HandlerError::Failed(e.to_string()))
    }
}
