#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]
//! Composable permission checks.
//!
//! Permissions are declared once, combined with `&`, `|` and `!`, and
//! evaluated per request in two phases: a [`PermissionResolver`] solves the
//! declared inputs through an [`Injector`], then the [`ResolvedPermission`]
//! runs the checks. Every check yields a tri-state [`CheckResult`]; skips are
//! neutral for both `AND` and `OR`.
//!
//! ```ignore
//! let role = Dep::from_fn("role", |cx| Ok(role_of(cx.headers())));
//! let guard = IsAuthenticated::new(authenticated).into_permission()
//!     & !HasRole::new(role, ["banned"]).into_permission();
//!
//! let mut cx = RequestContext::new(parts);
//! guard.authorize(&mut cx).await?;
//! ```

// Result algebra
pub mod error;
pub mod result;

// Request-time inputs
pub mod context;
pub mod dependency;
pub mod injector;

// Declarations and evaluation
pub mod lazy;
pub mod permission;
pub mod plan;
pub mod resolver;

// Built-in predicates
pub mod common;

pub mod config;

pub use common::{HasRole, HasScope, IsAuthenticated};
pub use config::PermissionsConfig;
pub use context::{DependencyCache, RequestContext};
pub use dependency::{AnyDep, Dep, DepId, Inputs, Provide, Value, header, headers, required_header};
pub use error::{PermissionError, Rejection, ValidationError, ValidationErrorKind, ValidationErrors};
pub use injector::{DefaultInjector, Injector, Solved};
pub use lazy::{SkipOn, lazy};
pub use permission::{Check, Permission, PermissionId, PermissionKind, permission, permission_with};
pub use plan::{Plan, PlanCache};
pub use resolver::{Param, PermissionResolver, ResolvedPermission, Signature};
pub use result::{
    CheckError, CheckOutcome, CheckResult, call_permissions_check, fail, is_failed, is_skipped,
    is_successful, skip,
};
