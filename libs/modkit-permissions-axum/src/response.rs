use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use modkit_permissions::PermissionError;
use serde_json::json;

use crate::config::GuardConfig;

const INTERNAL_ERROR_DETAIL: &str = "Internal permission check error";
const HIDDEN_VALIDATION_DETAIL: &str = "Request validation failed";

/// HTTP rendering of a [`PermissionError`].
///
/// - `Denied`: the rejection's status with `{"detail": message}`
/// - `Validation`: the configured status with `{"detail": [errors]}`
/// - anything else: 500 with a generic detail; the cause is logged
#[derive(Debug)]
pub struct PermissionRejection {
    error: PermissionError,
    validation_status: StatusCode,
    expose_validation_errors: bool,
}

impl PermissionRejection {
    #[must_use]
    pub fn new(error: PermissionError, config: &GuardConfig) -> Self {
        Self {
            error,
            validation_status: config.validation_status(),
            expose_validation_errors: config.expose_validation_errors,
        }
    }

    #[must_use]
    pub fn error(&self) -> &PermissionError {
        &self.error
    }

    #[must_use]
    pub fn into_error(self) -> PermissionError {
        self.error
    }
}

impl From<PermissionError> for PermissionRejection {
    fn from(error: PermissionError) -> Self {
        Self::new(error, &GuardConfig::default())
    }
}

impl IntoResponse for PermissionRejection {
    fn into_response(self) -> Response {
        match self.error {
            PermissionError::Denied(rejection) => {
                tracing::debug!("Permission rejected: {}", rejection.message);
                (rejection.status_code, Json(json!({ "detail": rejection.message }))).into_response()
            }
            PermissionError::Validation(errors) => {
                tracing::debug!("Permission inputs failed validation: {errors}");
                let body = if self.expose_validation_errors {
                    json!({ "detail": errors })
                } else {
                    json!({ "detail": HIDDEN_VALIDATION_DETAIL })
                };
                (self.validation_status, Json(body)).into_response()
            }
            PermissionError::Check(err) => {
                tracing::error!("Permission check failed: {err:#}");
                internal_error()
            }
            err @ PermissionError::Unsolved { .. } => {
                tracing::error!("Permission resolution failed: {err}");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": INTERNAL_ERROR_DETAIL })),
    )
        .into_response()
}
