//! Standard predicates.
//!
//! Each predicate reads one declared input and compares it with the values
//! given at declaration time. Hosts provide the input, e.g. a role taken
//! from the security context.

use async_trait::async_trait;

use crate::dependency::{AnyDep, Dep, Inputs};
use crate::permission::{Check, Permission};
use crate::result::{CheckOutcome, CheckResult};

/// Passes when the authentication input is `true`.
#[derive(Debug, Clone)]
pub struct IsAuthenticated {
    authenticated: Dep<bool>,
}

impl IsAuthenticated {
    #[must_use]
    pub fn new(authenticated: Dep<bool>) -> Self {
        Self { authenticated }
    }

    #[must_use]
    pub fn into_permission(self) -> Permission {
        Permission::new(self)
    }
}

#[async_trait]
impl Check for IsAuthenticated {
    fn inputs(&self) -> Vec<AnyDep> {
        vec![self.authenticated.erased()]
    }

    async fn check(&self, inputs: &Inputs) -> CheckOutcome {
        Ok(CheckResult::from(*inputs.get(&self.authenticated)?))
    }
}

/// Passes when the current role is one of `roles`.
#[derive(Debug, Clone)]
pub struct HasRole {
    role: Dep<String>,
    roles: Vec<String>,
}

impl HasRole {
    #[must_use]
    pub fn new<I, S>(role: Dep<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn into_permission(self) -> Permission {
        Permission::new(self)
    }
}

#[async_trait]
impl Check for HasRole {
    fn inputs(&self) -> Vec<AnyDep> {
        vec![self.role.erased()]
    }

    async fn check(&self, inputs: &Inputs) -> CheckOutcome {
        let current = inputs.get(&self.role)?;
        Ok(self.roles.iter().any(|role| role == current).into())
    }
}

/// Passes when every scope in `scopes` is granted.
#[derive(Debug, Clone)]
pub struct HasScope {
    granted: Dep<Vec<String>>,
    scopes: Vec<String>,
}

impl HasScope {
    #[must_use]
    pub fn new<I, S>(granted: Dep<Vec<String>>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            granted,
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn into_permission(self) -> Permission {
        Permission::new(self)
    }
}

#[async_trait]
impl Check for HasScope {
    fn inputs(&self) -> Vec<AnyDep> {
        vec![self.granted.erased()]
    }

    async fn check(&self, inputs: &Inputs) -> CheckOutcome {
        let granted = inputs.get(&self.granted)?;
        Ok(self
            .scopes
            .iter()
            .all(|required| granted.iter().any(|scope| scope == required))
            .into())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::RequestContext;
    use crate::error::PermissionError;
    use crate::plan::PlanCache;

    fn cx() -> RequestContext {
        RequestContext::default().with_plan_cache(Arc::new(PlanCache::new(16)))
    }

    async fn authorize(permission: &Permission) -> Result<CheckResult, PermissionError> {
        permission.authorize(&mut cx()).await
    }

    #[tokio::test]
    async fn is_authenticated() {
        let yes = IsAuthenticated::new(Dep::value("auth", true)).into_permission();
        let no = IsAuthenticated::new(Dep::value("auth", false)).into_permission();

        assert_eq!(authorize(&yes).await.unwrap(), CheckResult::Pass);
        assert!(authorize(&no).await.unwrap_err().is_denied());
    }

    #[tokio::test]
    async fn has_role() {
        let role = Dep::value("role", "moderator".to_owned());

        let staff = HasRole::new(role.clone(), ["admin", "moderator"]).into_permission();
        assert_eq!(authorize(&staff).await.unwrap(), CheckResult::Pass);

        let admin = HasRole::new(role, ["admin"]).into_permission();
        assert!(authorize(&admin).await.unwrap_err().is_denied());
    }

    #[tokio::test]
    async fn has_scope_requires_all() {
        let granted = Dep::value("scopes", vec!["read".to_owned()]);

        let read = HasScope::new(granted.clone(), ["read"]).into_permission();
        assert_eq!(authorize(&read).await.unwrap(), CheckResult::Pass);

        let read_write = HasScope::new(granted, ["read", "write"]).into_permission();
        assert!(authorize(&read_write).await.unwrap_err().is_denied());
    }

    #[tokio::test]
    async fn empty_scope_grant_fails() {
        let p = HasScope::new(Dep::value("scopes", Vec::new()), ["read"]).into_permission();
        let err = authorize(&p).await.unwrap_err();
        assert!(matches!(err, PermissionError::Denied(r) if r.message == "Permission denied"));
    }
}
