//! Response shaping and error mapping.
//!
//! # Responsibilities
//! - Render every failure as `{"error": {kind, code, message, cause}}`
//! - Map engine, store, refresh and catalog errors to HTTP status codes
//!
//! # Design Decisions
//! - Engine errors keep their numeric code so clients can match on it
//! - Store outages are 503 whether they surface directly or as a refresh cause

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::catalog::CatalogError;
use crate::currency::{OperationError, RefreshError};
use crate::engine::{EngineError, EngineErrorKind};
use crate::store::StoreError;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

/// An error response.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                kind,
                code: None,
                message: message.into(),
                cause: None,
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn read_only() -> Self {
        Self::new(StatusCode::FORBIDDEN, "read_only", "gateway is in read-only mode")
    }

    fn with_cause(mut self, cause: impl ToString) -> Self {
        self.body.cause = Some(cause.to_string());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorEnvelope { error: self.body })).into_response()
    }
}

fn engine_status(kind: EngineErrorKind) -> StatusCode {
    match kind {
        EngineErrorKind::InvalidInput
        | EngineErrorKind::UnknownDataSource
        | EngineErrorKind::UnknownEntityType => StatusCode::BAD_REQUEST,
        EngineErrorKind::NotFound => StatusCode::NOT_FOUND,
        EngineErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        EngineErrorKind::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        EngineErrorKind::InvalidConfiguration | EngineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_kind(kind: EngineErrorKind) -> &'static str {
    match kind {
        EngineErrorKind::InvalidInput => "invalid_input",
        EngineErrorKind::NotFound => "not_found",
        EngineErrorKind::UnknownDataSource => "unknown_data_source",
        EngineErrorKind::UnknownEntityType => "unknown_entity_type",
        EngineErrorKind::PermissionDenied => "permission_denied",
        EngineErrorKind::ResourceExhausted => "resource_exhausted",
        EngineErrorKind::InvalidConfiguration => "invalid_configuration",
        EngineErrorKind::Internal => "internal",
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let mut api = Self::new(engine_status(e.kind), engine_kind(e.kind), e.message);
        api.body.code = Some(e.kind.code());
        api
    }
}

impl From<OperationError> for ApiError {
    fn from(e: OperationError) -> Self {
        match e {
            OperationError::Engine(e) => e.into(),
            OperationError::RefreshFailed { error, cause } => {
                let mut api = ApiError::from(error).with_cause(&cause);
                api.status = StatusCode::SERVICE_UNAVAILABLE;
                api
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        if e.is_unavailable() {
            Self::new(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", e.to_string())
        } else {
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

impl From<RefreshError> for ApiError {
    fn from(e: RefreshError) -> Self {
        match e {
            RefreshError::Store(e) => e.into(),
            RefreshError::Bind(e) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "bind_failed", e.to_string()),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::InvalidCode { .. } => Self::new(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
            CatalogError::AlreadyExists(_) => Self::new(StatusCode::CONFLICT, "already_exists", e.to_string()),
            CatalogError::Contended(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, "contended", e.to_string()),
            CatalogError::Corrupt { .. } => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
            CatalogError::Store(e) => e.into(),
        }
    }
}
