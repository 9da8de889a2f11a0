//! Deferred resolution.
//!
//! A lazy permission solves its child's inputs only when it is checked, and
//! abstains instead of failing the request when that raises one of the
//! errors listed in its [`SkipOn`] set.

use std::fmt;
use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::PermissionError;
use crate::permission::Permission;
use crate::resolver::PermissionResolver;
use crate::result::CheckResult;

#[derive(Clone)]
enum Matcher {
    Validation,
    Error {
        name: &'static str,
        matches: fn(&anyhow::Error) -> bool,
    },
    Any,
}

impl Matcher {
    fn matches(&self, err: &PermissionError) -> bool {
        match (self, err) {
            (Self::Any | Self::Validation, PermissionError::Validation(_))
            | (Self::Any, PermissionError::Check(_)) => true,
            (Self::Error { matches, .. }, PermissionError::Check(inner)) => matches(inner),
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Error { name, .. } => *name,
            Self::Any => "any",
        }
    }
}

fn is_error<E>(err: &anyhow::Error) -> bool
where
    E: std::error::Error + Send + Sync + 'static,
{
    err.is::<E>() || err.chain().any(|cause| cause.is::<E>())
}

/// Errors a lazy permission turns into a skip.
#[derive(Clone, Default)]
pub struct SkipOn {
    matchers: Arc<[Matcher]>,
}

impl SkipOn {
    /// Skips nothing: errors propagate as they would eagerly.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Skip when an input fails to solve.
    #[must_use]
    pub fn validation() -> Self {
        Self::none().with_validation()
    }

    /// Skip when a check raises `E`.
    #[must_use]
    pub fn error<E>() -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::none().with_error::<E>()
    }

    /// Skip on validation errors and on every error raised by a check.
    ///
    /// Unsolved inputs and denials are never skipped.
    #[must_use]
    pub fn any() -> Self {
        Self::none().push(Matcher::Any)
    }

    #[must_use]
    pub fn with_validation(self) -> Self {
        self.push(Matcher::Validation)
    }

    #[must_use]
    pub fn with_error<E>(self) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.push(Matcher::Error {
            name: std::any::type_name::<E>(),
            matches: is_error::<E>,
        })
    }

    /// Every class in `self` or `other`.
    #[must_use]
    pub fn union(self, other: &SkipOn) -> Self {
        other
            .matchers
            .iter()
            .cloned()
            .fold(self, Self::push)
    }

    fn push(self, matcher: Matcher) -> Self {
        if self.matchers.iter().any(|m| m.name() == matcher.name()) {
            return self;
        }
        let mut matchers = self.matchers.to_vec();
        matchers.push(matcher);
        Self {
            matchers: matchers.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, err: &PermissionError) -> bool {
        self.matchers.iter().any(|matcher| matcher.matches(err))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl fmt::Debug for SkipOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.matchers.iter().map(Matcher::name))
            .finish()
    }
}

/// Defers resolution of `permission` until it is checked.
///
/// Wrapping a lazy permission again extends its skip set instead of nesting.
#[must_use]
pub fn lazy(permission: &Permission, skip_on: SkipOn) -> Permission {
    match permission.flattenable_lazy() {
        Some((inner, existing)) => {
            Permission::lazy_node(inner.clone(), existing.clone().union(&skip_on))
        }
        None => Permission::lazy_node(permission.clone(), skip_on),
    }
}

impl Permission {
    /// See [`lazy`].
    #[must_use]
    pub fn lazy(&self, skip_on: SkipOn) -> Permission {
        lazy(self, skip_on)
    }
}

/// Solves and checks the lazy child against the current request.
pub(crate) async fn check(
    resolver: &PermissionResolver,
    skip_on: &SkipOn,
    cx: &mut RequestContext,
) -> Result<CheckResult, PermissionError> {
    let outcome = match resolver.resolve(cx).await {
        Ok(resolved) => resolved.evaluate(cx).await,
        Err(err) => Err(err),
    };

    match outcome {
        Err(err) if skip_on.matches(&err) => {
            tracing::debug!(
                permission = %resolver.permission().id(),
                error = %err,
                "lazy permission skipped"
            );
            Ok(CheckResult::Skip(None))
        }
        other => other,
    }
}
