use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use catalog_core::ValidationError;
use catalog_products::{CatalogError, RepositoryError};

/// Shown instead of the store's own message when a constraint rejects a record.
pub const INTEGRITY_MESSAGE: &str = "Error en los datos enviados. Asegúrese de que todos los campos obligatorios están presentes y son válidos.";
pub const NOT_FOUND_MESSAGE: &str = "Producto no encontrado.";
pub const INVALID_ID_MESSAGE: &str = "Identificador de producto inválido.";

/// Error body of every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Every failure an HTTP handler can report, already classified.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Business-rule violation; the message is shown as is.
    #[error("{0}")]
    Validation(ValidationError),

    /// Store constraint violation; the detail is logged, not returned.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("not found")]
    NotFound,

    /// Request could not be parsed (body or path).
    #[error("{message}")]
    BadRequest { status: StatusCode, message: String },

    /// Anything else; the raw message is returned.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn invalid_id() -> Self {
        Self::BadRequest {
            status: StatusCode::BAD_REQUEST,
            message: INVALID_ID_MESSAGE.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Integrity(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest { status, .. } => *status,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message put in the response body.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(e) => e.message().to_string(),
            ApiError::Integrity(_) => INTEGRITY_MESSAGE.to_string(),
            ApiError::NotFound => NOT_FOUND_MESSAGE.to_string(),
            ApiError::BadRequest { message, .. } => message.clone(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(e) => ApiError::Validation(e),
            CatalogError::Repository(RepositoryError::Integrity(msg)) => ApiError::Integrity(msg),
            CatalogError::Repository(RepositoryError::Backend(msg)) => ApiError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Validation(e) => tracing::warn!("invalid product data: {e}"),
            ApiError::Integrity(detail) => tracing::warn!("data integrity error: {detail}"),
            ApiError::NotFound | ApiError::BadRequest { .. } => {}
            ApiError::Internal(msg) => tracing::error!("unclassified error: {msg}"),
        }
        json_error(status, self.public_message())
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors_with_their_message() {
        let err: ApiError = CatalogError::Validation(ValidationError::new(
            "El precio del producto debe ser mayor que cero.",
        ))
        .into();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.public_message(),
            "El precio del producto debe ser mayor que cero."
        );
    }

    #[test]
    fn integrity_errors_hide_store_detail() {
        let err: ApiError =
            CatalogError::Repository(RepositoryError::integrity("null value in column \"title\""))
                .into();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), INTEGRITY_MESSAGE);
    }

    #[test]
    fn backend_errors_are_server_errors_with_raw_message() {
        let err: ApiError =
            CatalogError::Repository(RepositoryError::backend("connection pool closed")).into();

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "connection pool closed");
    }

    #[test]
    fn not_found_and_invalid_id() {
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::invalid_id().status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::invalid_id().public_message(), INVALID_ID_MESSAGE);
    }

    #[tokio::test]
    async fn response_body_has_only_a_message() {
        let response = ApiError::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "message": NOT_FOUND_MESSAGE }));
    }
}
