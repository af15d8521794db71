use analysis::{FieldError, ValidationError};
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Response extension marking a 500 caused by the storage layer.
#[derive(Debug, Clone, Copy)]
pub struct StorageFailure;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("persistence is not configured")]
    Unavailable,

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn rejected(field: &str, message: String) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err.0)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::rejected("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::rejected("query", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::rejected("path", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "validation_failed", "fields": fields }),
            ),
            ApiError::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "entity": entity, "id": id }),
            ),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "persistence_unavailable" }),
            ),
            ApiError::Storage(err) => {
                error!(error = ?err, "storage call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal_error" }),
                )
            }
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::Storage(_)) {
            response.extensions_mut().insert(StorageFailure);
        }
        response
    }
}
