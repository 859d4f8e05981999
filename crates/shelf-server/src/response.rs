use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use shelf_catalog::CatalogError;
use shelf_lending::{ErrorKind, LendingError};
use tracing::error;

use crate::error::ServerError;

/// Body shape of every JSON response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
            data: Some(data),
        })
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
            data: None,
        })
    }
}

/// An error response: a status code plus the message placed in the
/// envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn admins_only() -> Self {
        Self::new(StatusCode::FORBIDDEN, "access denied: admins only")
    }

    pub fn invalid_body() -> Self {
        Self::bad_request("invalid request body")
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::BusinessRule => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LendingError> for ApiError {
    fn from(e: LendingError) -> Self {
        let status = status_for(e.kind());
        if status.is_server_error() {
            error!(error = %e, "lending operation failed");
        }
        Self::new(status, e.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        let status = match &e {
            CatalogError::BookNotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::InvalidStock(_) => StatusCode::BAD_REQUEST,
            CatalogError::LockPoisoned => {
                error!(error = %e, "catalog operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<ServerError> for ApiError {
    fn from(e: ServerError) -> Self {
        match e {
            ServerError::AuthFailed(message) => Self::unauthorized(message),
            other => {
                error!(error = %other, "request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> {
            status: "error",
            message: self.message,
            data: None,
        };
        (self.status, Json(body)).into_response()
    }
}
