use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Reconciliation of {charge_id} failed: {source}")]
    Reconciliation {
        charge_id: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn reconciliation(charge_id: impl Into<String>, source: AppError) -> Self {
        AppError::Reconciliation {
            charge_id: charge_id.into(),
            source: Box::new(source),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Reconciliation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Whether the caller may safely retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Gateway(_) | AppError::Database(_) | AppError::Reconciliation { .. }
        )
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
