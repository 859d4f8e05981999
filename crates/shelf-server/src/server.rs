use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use shelf_catalog::{Catalog, InMemoryStockStore, StockUpdateHandler};
use shelf_ledger::InMemoryLedger;
use shelf_lending::{
    BookDeletedHandler, InMemoryConfigStore, LendingConfig, LendingService, Outbox,
    SettingsProvider, SystemClock,
};
use shelf_queue::{run_consumer, Broker, ConsumerConfig, ConsumerStats, SyncMode};
use shelf_types::topics;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::{AuthProvider, TokenTableAuth};
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::router::build_router;
use crate::state::AppState;

/// How long shutdown waits for queued stock events to reach the broker.
const PUBLISHER_DRAIN: Duration = Duration::from_secs(5);

/// A fully wired Shelf process: broker, lending and catalog services, both
/// queue consumers, and the HTTP router.
pub struct ShelfServer {
    config: ServerConfig,
    state: AppState,
    broker: Arc<Broker>,
    shutdown: watch::Sender<bool>,
    consumers: Vec<JoinHandle<ConsumerStats>>,
    publisher: JoinHandle<u64>,
}

impl ShelfServer {
    /// Wire everything with bearer tokens from the config. Must run inside
    /// a Tokio runtime; consumers and the outbox publisher start here.
    pub fn build(config: ServerConfig) -> ServerResult<Self> {
        let auth = Arc::new(TokenTableAuth::from_entries(&config.tokens));
        Self::build_with_auth(config, auth)
    }

    pub fn build_with_auth(config: ServerConfig, auth: Arc<dyn AuthProvider>) -> ServerResult<Self> {
        config.validate()?;

        let broker = Arc::new(match &config.data_dir {
            Some(dir) => {
                let sync_mode = if config.fsync_every_write {
                    SyncMode::EveryWrite
                } else {
                    SyncMode::OsDefault
                };
                Broker::open(dir, sync_mode)?
            }
            None => Broker::in_memory(),
        });
        for topic in [topics::STOCK_UPDATES, topics::BOOK_DELETED] {
            broker.declare(topic)?;
        }

        let (outbox, publisher) = Outbox::spawn(broker.clone());
        let settings = SettingsProvider::new(Arc::new(InMemoryConfigStore::with_defaults(
            config.settings_seed(),
        )));
        let lending = Arc::new(LendingService::new(
            Arc::new(InMemoryLedger::new()),
            settings,
            Arc::new(SystemClock),
            outbox,
            LendingConfig {
                request_timeout: config.request_timeout(),
                serialize_borrows: config.serialize_borrows,
            },
        ));

        let stock_store = Arc::new(InMemoryStockStore::with_books(
            config.books.iter().map(|b| (b.id, b.stock)),
        ));
        let catalog = Arc::new(Catalog::new(stock_store.clone(), broker.clone()));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let consumer_config = ConsumerConfig {
            max_redeliveries: config.consumer.max_redeliveries,
        };
        let consumers = vec![
            tokio::spawn(run_consumer(
                broker.subscribe(topics::STOCK_UPDATES)?,
                Arc::new(StockUpdateHandler::new(stock_store)),
                consumer_config,
                shutdown_rx.clone(),
            )),
            tokio::spawn(run_consumer(
                broker.subscribe(topics::BOOK_DELETED)?,
                Arc::new(BookDeletedHandler::new(lending.clone())),
                consumer_config,
                shutdown_rx,
            )),
        ];

        info!(
            durable = broker.is_durable(),
            tokens = config.tokens.len(),
            books = config.books.len(),
            "shelf server wired"
        );

        Ok(Self {
            config,
            state: AppState {
                lending,
                catalog,
                auth,
            },
            broker,
            shutdown,
            consumers,
            publisher,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until `signal` resolves, then shut down in order.
    pub async fn serve<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(bind_addr = %self.config.bind_addr, "shelf server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await?;
        self.shutdown().await
    }

    /// Stop the consumers, flush the outbox, and close the broker.
    /// Unsettled messages stay in the WAL for the next start.
    pub async fn shutdown(self) -> ServerResult<()> {
        let Self {
            state,
            broker,
            shutdown,
            consumers,
            publisher,
            ..
        } = self;

        if shutdown.send(true).is_err() {
            warn!("consumers already stopped");
        }
        for handle in consumers {
            if let Err(e) = handle.await {
                warn!(error = %e, "consumer task failed");
            }
        }

        drop(state);
        match tokio::time::timeout(PUBLISHER_DRAIN, publisher).await {
            Ok(Ok(published)) => info!(published, "outbox drained"),
            Ok(Err(e)) => warn!(error = %e, "outbox publisher failed"),
            Err(_) => warn!(
                timeout_ms = PUBLISHER_DRAIN.as_millis() as u64,
                "outbox publisher still running at shutdown"
            ),
        }

        broker.close()?;
        info!("shelf server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use shelf_types::{BookId, UserId};

    fn config() -> ServerConfig {
        ServerConfig::from_toml(
            r#"
            [[tokens]]
            token = "reader"
            user_id = 2

            [[books]]
            id = 7
            stock = 2
            "#,
        )
        .unwrap()
    }

    async fn wait_for_stock(server: &ShelfServer, book: BookId, expected: i64) {
        for _ in 0..200 {
            if let Ok(level) = server.state().catalog.stock(book).await {
                if level.stock == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("stock of {book} never reached {expected}");
    }

    #[tokio::test]
    async fn borrow_and_return_move_stock() {
        let server = ShelfServer::build(config()).unwrap();
        let lending = server.state().lending.clone();

        lending.borrow_book(UserId::new(2), BookId::new(7)).await.unwrap();
        wait_for_stock(&server, BookId::new(7), 1).await;

        lending.return_book(UserId::new(2), BookId::new(7)).await.unwrap();
        wait_for_stock(&server, BookId::new(7), 2).await;

        drop(lending);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn book_deletion_cascades_to_ledger() {
        let server = ShelfServer::build(config()).unwrap();
        let lending = server.state().lending.clone();
        lending.borrow_book(UserId::new(2), BookId::new(7)).await.unwrap();

        server.state().catalog.delete_book(BookId::new(7)).await.unwrap();

        let mut remaining = usize::MAX;
        for _ in 0..200 {
            remaining = lending.history(UserId::new(2)).await.unwrap().len();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 0);

        drop(lending);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn durable_queue_uses_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.data_dir = Some(dir.path().to_path_buf());

        let server = ShelfServer::build(config).unwrap();
        assert!(server.broker().is_durable());
        assert!(dir.path().join("stock_updates.wal").exists());
        assert!(dir.path().join("book_deleted_queue.wal").exists());
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn custom_auth_provider() {
        let auth = Arc::new(crate::auth::TokenTableAuth::new([(
            "x".to_string(),
            Identity::admin(UserId::new(9)),
        )]));
        let server = ShelfServer::build_with_auth(ServerConfig::default(), auth).unwrap();
        assert!(server.config().tokens.is_empty());
        let _router = server.router();
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let mut config = config();
        config.request_timeout_ms = 0;
        assert!(ShelfServer::build(config).is_err());
    }
}
