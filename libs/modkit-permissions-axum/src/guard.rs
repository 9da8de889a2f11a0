//! Route middleware enforcing a permission.
//!
//! ```ignore
//! let guard = PermissionGuard::new(is_admin);
//! let app = Router::new()
//!     .route("/admin", get(handler))
//!     .route_layer(axum::middleware::from_fn_with_state(guard, enforce));
//! ```

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use modkit_permissions::{
    CheckResult, DefaultInjector, Injector, Permission, PlanCache, RequestContext,
};

use crate::config::GuardConfig;
use crate::response::PermissionRejection;

/// Final result of the permission that let the request through.
///
/// Inserted into the request extensions before the handler runs, so a
/// handler can tell an explicit pass from an abstention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized(pub CheckResult);

/// State of the [`enforce`] middleware.
#[derive(Clone)]
pub struct PermissionGuard {
    permission: Permission,
    injector: Arc<dyn Injector>,
    plans: Arc<PlanCache>,
    config: Arc<GuardConfig>,
}

impl PermissionGuard {
    /// Guard with the default injector and the process-wide plan cache.
    #[must_use]
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            injector: Arc::new(DefaultInjector::new()),
            plans: PlanCache::global(),
            config: Arc::new(GuardConfig::default()),
        }
    }

    /// Guard with its own plan cache sized from `config`.
    #[must_use]
    pub fn from_config(permission: Permission, config: GuardConfig) -> Self {
        Self {
            plans: Arc::new(PlanCache::from_config(&config.permissions)),
            config: Arc::new(config),
            ..Self::new(permission)
        }
    }

    #[must_use]
    pub fn with_injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = injector;
        self
    }

    /// Share one plan cache between several guards.
    #[must_use]
    pub fn with_plan_cache(mut self, plans: Arc<PlanCache>) -> Self {
        self.plans = plans;
        self
    }

    #[must_use]
    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    #[must_use]
    pub fn plans(&self) -> &Arc<PlanCache> {
        &self.plans
    }
}

impl std::fmt::Debug for PermissionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGuard")
            .field("permission", &self.permission)
            .field("plans", &self.plans)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Authorizes the request against the guard's permission, then runs the
/// handler or answers with a [`PermissionRejection`].
///
/// Plans are cached under the matched route template when axum provides
/// one, so `/users/1` and `/users/2` share a plan.
#[tracing::instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
pub async fn enforce(State(guard): State<PermissionGuard>, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let route = parts
        .extensions
        .get::<MatchedPath>()
        .map_or_else(|| parts.uri.path().to_owned(), |matched| matched.as_str().to_owned());

    let mut cx = RequestContext::new(parts)
        .with_route(route)
        .with_injector(Arc::clone(&guard.injector))
        .with_plan_cache(Arc::clone(&guard.plans));

    match guard.permission.authorize(&mut cx).await {
        Ok(result) => {
            let mut parts = cx.into_parts();
            parts.extensions.insert(Authorized(result));
            next.run(Request::from_parts(parts, body)).await
        }
        Err(err) => PermissionRejection::new(err, &guard.config).into_response(),
    }
}
