use http::StatusCode;
use modkit_permissions::PermissionsConfig;
use serde::{Deserialize, Serialize};

/// Settings of a [`crate::PermissionGuard`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    pub permissions: PermissionsConfig,

    /// Status answered when an eagerly solved input fails validation.
    pub validation_status_code: u16,

    /// Include the failing inputs in validation responses.
    pub expose_validation_errors: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            permissions: PermissionsConfig::default(),
            validation_status_code: StatusCode::UNPROCESSABLE_ENTITY.as_u16(),
            expose_validation_errors: true,
        }
    }
}

impl GuardConfig {
    /// Configured validation status, falling back to 422 when out of range.
    #[must_use]
    pub fn validation_status(&self) -> StatusCode {
        StatusCode::from_u16(self.validation_status_code).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
    }
}
