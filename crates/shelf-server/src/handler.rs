//! Request handlers. Each one parses its inputs, calls the lending or
//! catalog service, and wraps the result in an [`Envelope`].

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use shelf_catalog::StockLevel;
use shelf_ledger::Transaction;
use shelf_lending::{CallbackOutcome, Settings, SettingsUpdate, DEFAULT_DAYS_LATE};
use shelf_types::{BookId, PaymentMethod, TransactionId};

use crate::extract::{AdminCaller, Caller};
use crate::response::{ApiError, ApiResult, Envelope};
use crate::state::AppState;

type Reply<T> = ApiResult<Json<Envelope<T>>>;

fn book_id(raw: &str) -> ApiResult<BookId> {
    raw.parse().map_err(|_| ApiError::bad_request("invalid book id"))
}

fn transaction_id(raw: &str) -> ApiResult<TransactionId> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("invalid transaction id"))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload.map(|Json(v)| v).map_err(|_| ApiError::invalid_body())
}

pub async fn health() -> Json<Envelope<Value>> {
    Envelope::ok(
        "ok",
        json!({
            "name": "shelf",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

pub async fn borrow_book(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
) -> Reply<Transaction> {
    let book = book_id(&raw)?;
    let tx = state.lending.borrow_book(caller.user_id, book).await?;
    Ok(Envelope::ok("book borrowed successfully", tx))
}

pub async fn return_book(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
) -> Reply<Transaction> {
    let book = book_id(&raw)?;
    let tx = state.lending.return_book(caller.user_id, book).await?;
    Ok(Envelope::ok("book returned successfully", tx))
}

pub async fn history(State(state): State<AppState>, Caller(caller): Caller) -> Reply<Vec<Transaction>> {
    let entries = state.lending.history(caller.user_id).await?;
    Ok(Envelope::ok("transaction history retrieved", entries))
}

pub async fn all_transactions(
    State(state): State<AppState>,
    _admin: AdminCaller,
) -> Reply<Vec<Transaction>> {
    let entries = state.lending.all_history().await?;
    Ok(Envelope::ok("all transactions retrieved", entries))
}

pub async fn get_settings(State(state): State<AppState>, _caller: Caller) -> Reply<Settings> {
    let settings = state.lending.get_settings().await?;
    Ok(Envelope::ok("settings retrieved", settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    _admin: AdminCaller,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Reply<Settings> {
    let update = body(payload)?;
    let settings = state.lending.update_settings(&update).await?;
    Ok(Envelope::ok("settings updated successfully", settings))
}

pub async fn my_fines(State(state): State<AppState>, Caller(caller): Caller) -> Reply<Vec<Transaction>> {
    let fines = state.lending.my_fines(caller.user_id).await?;
    Ok(Envelope::ok("unpaid fines retrieved", fines))
}

#[derive(Debug, Deserialize)]
pub struct PayFineRequest {
    pub method: String,
    #[serde(default)]
    pub proof: String,
}

pub async fn pay_fine(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
    payload: Result<Json<PayFineRequest>, JsonRejection>,
) -> Reply<Value> {
    let tx_id = transaction_id(&raw)?;
    let req = body(payload)?;
    let receipt = state
        .lending
        .pay_fine(caller.user_id, tx_id, &req.method, &req.proof)
        .await?;

    let data = match receipt.method {
        PaymentMethod::Qris => json!({
            "qr_string": receipt.message,
            "message": "Scan this QR code to pay",
        }),
        PaymentMethod::Manual => json!({ "message": receipt.message }),
    };
    Ok(Envelope::ok("payment initiated", data))
}

#[derive(Debug, Deserialize)]
pub struct VerifyFineRequest {
    pub action: String,
}

pub async fn verify_fine(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(raw): Path<String>,
    payload: Result<Json<VerifyFineRequest>, JsonRejection>,
) -> Reply<Transaction> {
    let tx_id = transaction_id(&raw)?;
    let req = body(payload)?;
    let tx = state.lending.verify_fine(tx_id, &req.action).await?;
    Ok(Envelope::ok("fine verification processed", tx))
}

/// Gateway notification. Gateways disagree on the status field name, so
/// both `status` and `transaction_status` are read.
#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub transaction_status: Option<String>,
}

pub async fn payment_callback(
    State(state): State<AppState>,
    payload: Result<Json<CallbackRequest>, JsonRejection>,
) -> Reply<CallbackOutcome> {
    let req = body(payload)?;
    let status = req.status.or(req.transaction_status).unwrap_or_default();
    let outcome = state
        .lending
        .handle_payment_callback(&req.order_id, &status)
        .await?;
    Ok(Envelope::ok("callback received", outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct MakeLateQuery {
    pub days: Option<String>,
}

pub async fn make_late(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(raw): Path<String>,
    Query(query): Query<MakeLateQuery>,
) -> Reply<Transaction> {
    let tx_id = transaction_id(&raw)?;
    let days = query
        .days
        .and_then(|d| d.trim().parse::<i64>().ok())
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_DAYS_LATE);
    let tx = state.lending.make_late(caller.user_id, tx_id, days).await?;
    Ok(Envelope::ok("transaction marked as late for testing", tx))
}

pub async fn get_stock(
    State(state): State<AppState>,
    _caller: Caller,
    Path(raw): Path<String>,
) -> Reply<StockLevel> {
    let book = book_id(&raw)?;
    let level = state.catalog.stock(book).await?;
    Ok(Envelope::ok("stock retrieved", level))
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: i64,
}

pub async fn set_stock(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(raw): Path<String>,
    payload: Result<Json<SetStockRequest>, JsonRejection>,
) -> Reply<StockLevel> {
    let book = book_id(&raw)?;
    let req = body(payload)?;
    let level = state.catalog.set_stock(book, req.stock).await?;
    Ok(Envelope::ok("stock updated", level))
}

pub async fn delete_book(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(raw): Path<String>,
) -> Reply<()> {
    let book = book_id(&raw)?;
    state.catalog.delete_book(book).await?;
    Ok(Envelope::message("book deleted successfully"))
}
