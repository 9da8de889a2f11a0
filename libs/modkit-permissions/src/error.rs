use std::fmt;

use http::StatusCode;
use serde::Serialize;

/// Rejection produced by a failing top-level permission with `auto_error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status_code: StatusCode,
    pub message: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status_code.as_u16())
    }
}

/// Why a declared input could not be solved for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationErrorKind {
    #[error("field required")]
    Missing,

    #[error("{message}")]
    Invalid { message: String },
}

/// A single input that failed to solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{location}: {kind}")]
pub struct ValidationError {
    /// Where the input comes from, e.g. `header.x-user-age`.
    pub location: String,
    #[serde(flatten)]
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    #[must_use]
    pub fn missing(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind: ValidationErrorKind::Missing,
        }
    }

    #[must_use]
    pub fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            kind: ValidationErrorKind::Invalid {
                message: message.into(),
            },
        }
    }
}

/// Every input that failed to solve for one resolution attempt. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// `None` when `errors` is empty.
    #[must_use]
    pub fn new(errors: Vec<ValidationError>) -> Option<Self> {
        (!errors.is_empty()).then(|| Self(errors))
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(err: ValidationError) -> Self {
        Self(vec![err])
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("request validation failed")?;
        for (i, err) in self.0.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Errors surfaced by resolving or authorizing a permission.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("permission denied: {0}")]
    Denied(Rejection),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// A check raised an error that is neither a skip nor a fail signal.
    #[error("permission check error: {0}")]
    Check(anyhow::Error),

    /// A bound check asked for an input that was never solved.
    #[error("input `{input}` was not solved for this request")]
    Unsolved { input: String },
}

impl PermissionError {
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
