use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with every Shelf endpoint.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/transactions", get(handler::all_transactions))
        .route("/transactions/borrow/:book_id", post(handler::borrow_book))
        .route("/transactions/return/:book_id", post(handler::return_book))
        .route("/transactions/history", get(handler::history))
        .route(
            "/transactions/settings",
            get(handler::get_settings).post(handler::update_settings),
        )
        .route("/transactions/fines", get(handler::my_fines))
        .route("/transactions/pay-fine/:tx_id", post(handler::pay_fine))
        .route("/transactions/verify/:tx_id", post(handler::verify_fine))
        .route("/transactions/callback", post(handler::payment_callback))
        .route("/transactions/test/make-late/:tx_id", post(handler::make_late))
        .route(
            "/books/:book_id/stock",
            get(handler::get_stock).put(handler::set_stock),
        )
        .route("/books/:book_id", delete(handler::delete_book))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
