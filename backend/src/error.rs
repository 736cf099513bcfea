//! Error handling for the inventory costing service
//!
//! Provides consistent JSON error responses for every failure the engine can
//! surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::TransitionError;
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        item_id: Uuid,
        location_id: Uuid,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Validation failure on a single field
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// The transaction was rolled back and the call can be repeated as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::DatabaseError(_) | AppError::Conflict(_))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientInventory { .. } | AppError::InvalidStateTransition(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DatabaseError(sqlx::Error::PoolTimedOut) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DatabaseError(_)
            | AppError::Configuration(_)
            | AppError::Internal(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> ErrorDetail {
        match self {
            AppError::Validation { field, message } => ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message: message.clone(),
                field: Some(field.clone()),
                details: None,
            },
            AppError::ValidationError(msg) => ErrorDetail {
                code: "VALIDATION_ERROR".to_string(),
                message: msg.clone(),
                field: None,
                details: None,
            },
            AppError::NotFound(resource) => ErrorDetail {
                code: "NOT_FOUND".to_string(),
                message: format!("{} not found", resource),
                field: None,
                details: None,
            },
            AppError::InsufficientInventory {
                item_id,
                location_id,
                requested,
                available,
            } => ErrorDetail {
                code: "INSUFFICIENT_INVENTORY".to_string(),
                message: format!(
                    "Insufficient inventory. Requested: {}, Available: {}",
                    requested.normalize(),
                    available.normalize()
                ),
                field: None,
                details: Some(serde_json::json!({
                    "item_id": item_id,
                    "location_id": location_id,
                    "requested": requested,
                    "available": available,
                })),
            },
            AppError::InvalidStateTransition(msg) => ErrorDetail {
                code: "INVALID_STATE_TRANSITION".to_string(),
                message: msg.clone(),
                field: None,
                details: None,
            },
            AppError::Conflict(msg) => ErrorDetail {
                code: "CONFLICT".to_string(),
                message: msg.clone(),
                field: None,
                details: None,
            },
            AppError::Configuration(msg) => ErrorDetail {
                code: "CONFIGURATION_ERROR".to_string(),
                message: format!("Configuration error: {}", msg),
                field: None,
                details: None,
            },
            AppError::DatabaseError(_) => ErrorDetail {
                code: "DATABASE_ERROR".to_string(),
                message: "A database error occurred".to_string(),
                field: None,
                details: None,
            },
            AppError::Internal(msg) => ErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message: msg.clone(),
                field: None,
                details: None,
            },
            AppError::InternalError(_) => ErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message: "An internal server error occurred".to_string(),
                field: None,
                details: None,
            },
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::InvalidStateTransition(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields = errors
            .field_errors()
            .into_keys()
            .collect::<Vec<_>>()
            .join(", ");
        AppError::ValidationError(format!("Invalid fields: {}", fields))
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_detail = self.detail();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
