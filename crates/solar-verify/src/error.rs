use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::verification::{RepositoryError, ServiceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Top-level error for the service binary and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("server error: {0}")]
    Server(#[from] axum::Error),
    #[error("verification error: {0}")]
    Verification(#[from] ServiceError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Verification(ServiceError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Verification(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Verification(ServiceError::Conflict(_))
            | AppError::Verification(ServiceError::Repository(RepositoryError::Conflict)) => {
                StatusCode::CONFLICT
            }
            AppError::Verification(ServiceError::Repository(_))
            | AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::verification::{
        ApplicationId, ApplicationStatus, ConflictError, ValidationError,
    };

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (
                ServiceError::Validation(ValidationError::EmptyAddress),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ServiceError::NotFound(ApplicationId("app-000001".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                ServiceError::Conflict(ConflictError::InProgress {
                    status: ApplicationStatus::Verifying,
                }),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Repository(RepositoryError::Conflict),
                StatusCode::CONFLICT,
            ),
            (
                ServiceError::Repository(RepositoryError::Unavailable("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn message_is_prefixed_with_the_error_family() {
        let err = AppError::from(ServiceError::NotFound(ApplicationId("app-000042".to_string())));
        assert!(err.to_string().starts_with("verification error:"));
        assert!(err.to_string().contains("app-000042"));
    }
}
