//! Tri-state check results and the signals that produce them.
//!
//! A check either passes, fails (optionally with a reason) or skips
//! (abstains, optionally with a reason). Skips are neutral for both `AND`
//! and `OR` combinators, so a caller has to branch on them explicitly:
//! [`CheckResult::as_bool`] returns `None` for a skip instead of guessing.

use std::future::Future;

use crate::error::PermissionError;
use crate::permission::Permission;

/// Outcome of a single permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// The check succeeded.
    Pass,
    /// The check failed. A `None` reason is replaced by the permission's
    /// message when the result crosses [`call_permissions_check`].
    Fail(Option<String>),
    /// The check abstained.
    Skip(Option<String>),
}

impl CheckResult {
    /// Failed result carrying `reason`.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(Some(reason.into()))
    }

    /// Skipped result carrying `reason`.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skip(Some(reason.into()))
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skip(_))
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Pass)
    }

    /// Boolean view of the result; `None` for a skip.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Pass => Some(true),
            Self::Fail(_) => Some(false),
            Self::Skip(_) => None,
        }
    }

    /// Reason attached to a failed or skipped result.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Fail(reason) | Self::Skip(reason) => reason.as_deref(),
        }
    }
}

impl From<bool> for CheckResult {
    fn from(value: bool) -> Self {
        if value { Self::Pass } else { Self::Fail(None) }
    }
}

/// Free-function form of [`CheckResult::is_skipped`].
#[must_use]
pub fn is_skipped(result: &CheckResult) -> bool {
    result.is_skipped()
}

/// Free-function form of [`CheckResult::is_failed`].
#[must_use]
pub fn is_failed(result: &CheckResult) -> bool {
    result.is_failed()
}

/// Free-function form of [`CheckResult::is_successful`].
#[must_use]
pub fn is_successful(result: &CheckResult) -> bool {
    result.is_successful()
}

/// Non-local exit from a check body.
///
/// `Skip` and `Fail` are the early-return sugar produced by [`skip`] and
/// [`fail`]; they are observationally identical to returning the matching
/// [`CheckResult`]. `Other` carries any unrelated error raised by user code
/// and is never turned into a result.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("permission check skipped")]
    Skip(Option<String>),

    #[error("permission check failed")]
    Fail(Option<String>),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What a check body returns.
pub type CheckOutcome = Result<CheckResult, CheckError>;

/// Abstain from inside a check body: `return skip(Some("no token"));`.
///
/// # Errors
///
/// Always returns [`CheckError::Skip`].
pub fn skip<T>(reason: Option<&str>) -> Result<T, CheckError> {
    Err(CheckError::Skip(reason.map(ToOwned::to_owned)))
}

/// Fail from inside a check body: `return fail(Some("token expired"));`.
///
/// # Errors
///
/// Always returns [`CheckError::Fail`].
pub fn fail<T>(reason: Option<&str>) -> Result<T, CheckError> {
    Err(CheckError::Fail(reason.map(ToOwned::to_owned)))
}

/// Runs `check` on behalf of `permission` and classifies its outcome.
///
/// Skip/fail signals become [`CheckResult::Skip`] / [`CheckResult::Fail`],
/// a failure without a reason takes the permission's message, and any other
/// error is propagated as [`PermissionError::Check`] untouched.
///
/// # Errors
///
/// Returns [`PermissionError::Check`] when the check raised an error that is
/// neither a skip nor a fail signal.
pub async fn call_permissions_check<F>(
    permission: &Permission,
    check: F,
) -> Result<CheckResult, PermissionError>
where
    F: Future<Output = CheckOutcome>,
{
    Ok(permission.normalize(classify(check).await?))
}

/// Classifies a check outcome, keeping a reasonless failure as `Fail(None)`
/// so the permission that ends evaluation can name it.
pub(crate) async fn classify<F>(check: F) -> Result<CheckResult, PermissionError>
where
    F: Future<Output = CheckOutcome>,
{
    match check.await {
        Ok(result) => Ok(result),
        Err(CheckError::Fail(reason)) => Ok(CheckResult::Fail(reason)),
        Err(CheckError::Skip(reason)) => Ok(CheckResult::Skip(reason)),
        Err(CheckError::Other(err)) => Err(PermissionError::Check(err)),
    }
}
