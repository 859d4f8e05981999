//! HTTP server for Shelf.
//!
//! Exposes the lending workflows and a small catalog surface over REST,
//! authenticates callers with bearer tokens, and runs the queue consumers
//! that keep catalog stock and the ledger in step.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handler;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{AuthProvider, Credentials, Identity, TokenTableAuth};
pub use config::{BookSeed, ConsumerSection, LogFormat, ServerConfig, TokenEntry};
pub use error::{ServerError, ServerResult};
pub use response::{ApiError, ApiResult, Envelope};
pub use server::ShelfServer;
pub use state::AppState;
