use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

/// Per-field validation messages, keyed by request field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Invalid fields")]
    InvalidFields(FieldErrors),

    #[error("{0}")]
    State(String),

    #[error("Authentication credentials were not provided or are invalid")]
    Unauthenticated,

    #[error("{0}")]
    Authorization(String),

    #[error("Malformed catalog: {0}")]
    Parse(String),

    #[error("Request was throttled")]
    Throttled,

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn field(name: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(name.to_string(), vec![message.into()]);
        AppError::InvalidFields(errors)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            AppError::State(_) => StatusCode::CONFLICT,
            AppError::Unauthenticated | AppError::Authorization(_) => StatusCode::FORBIDDEN,
            AppError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn errors(&self) -> Value {
        match self {
            AppError::InvalidFields(fields) => serde_json::json!(fields),
            _ => Value::String(self.to_string()),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    #[serde(rename = "Status")]
    pub status: bool,
    pub message: String,
    #[serde(rename = "Errors")]
    #[schema(value_type = Object)]
    pub errors: Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AppError::OrmError(err) => tracing::error!(error = %err, "database failure"),
            AppError::Internal(err) => tracing::error!(error = %err, "internal failure"),
            _ => tracing::debug!(error = %self, status = %status, "request rejected"),
        }

        let body = ErrorResponse {
            status: false,
            message: self.to_string(),
            errors: self.errors(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_are_reported_per_field() {
        let err = AppError::field("password", "too short");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.errors(), serde_json::json!({ "password": ["too short"] }));
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::State("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Unauthenticated.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Authorization("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Parse("x".into()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Throttled.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }
}
