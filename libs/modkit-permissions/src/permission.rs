//! Permission declarations and their boolean composition.
//!
//! A [`Permission`] is declared once (usually when routes are built) and
//! shared by every request. It is a cheap handle over an immutable
//! declaration: a leaf check with its declared inputs, or a combinator over
//! other permissions. Combining permissions with `&`, `|` and `!` never
//! mutates an operand; it creates a new declaration with a new
//! [`PermissionId`].

use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr, Not};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::StatusCode;

use crate::dependency::{AnyDep, Inputs};
use crate::lazy::SkipOn;
use crate::resolver::Signature;
use crate::result::{CheckError, CheckOutcome, CheckResult};

pub const DEFAULT_MESSAGE: &str = "Permission denied";
pub const ALL_DEFAULT_MESSAGE: &str = "Not all permissions were satisfied";
pub const ANY_DEFAULT_MESSAGE: &str = "None of the permissions were satisfied";
pub const NOT_DEFAULT_MESSAGE: &str = "The permission was satisfied, but it should not have been";
pub const DEFAULT_STATUS_CODE: StatusCode = StatusCode::FORBIDDEN;

static NEXT_PERMISSION_ID: AtomicU64 = AtomicU64::new(1);

/// Arena handle of a permission declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionId(u64);

impl PermissionId {
    fn next() -> Self {
        Self(NEXT_PERMISSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A leaf predicate.
///
/// Implementors declare the inputs they read and check them once solved.
/// Returning `Ok(CheckResult::Fail(None))` and returning `fail(None)` are
/// equivalent; both take the permission's message.
#[async_trait]
pub trait Check: Send + Sync + 'static {
    fn inputs(&self) -> Vec<AnyDep> {
        Vec::new()
    }

    async fn check(&self, inputs: &Inputs) -> CheckOutcome;
}

/// Shape of a permission node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    Leaf,
    All,
    Any,
    Not,
    Wrapper,
    Lazy,
}

impl PermissionKind {
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::All => ALL_DEFAULT_MESSAGE,
            Self::Any => ANY_DEFAULT_MESSAGE,
            Self::Not => NOT_DEFAULT_MESSAGE,
            Self::Leaf | Self::Wrapper | Self::Lazy => DEFAULT_MESSAGE,
        }
    }
}

#[derive(Clone)]
pub(crate) enum Node {
    Leaf {
        check: Arc<dyn Check>,
        inputs: Vec<AnyDep>,
    },
    All(Vec<Permission>),
    Any(Vec<Permission>),
    Not(Permission),
    Wrapper(Permission),
    Lazy {
        inner: Permission,
        skip_on: SkipOn,
    },
}

impl Node {
    fn kind(&self) -> PermissionKind {
        match self {
            Self::Leaf { .. } => PermissionKind::Leaf,
            Self::All(_) => PermissionKind::All,
            Self::Any(_) => PermissionKind::Any,
            Self::Not(_) => PermissionKind::Not,
            Self::Wrapper(_) => PermissionKind::Wrapper,
            Self::Lazy { .. } => PermissionKind::Lazy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    message: Option<Arc<str>>,
    status_code: Option<StatusCode>,
    auto_error: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            message: None,
            status_code: None,
            auto_error: true,
        }
    }
}

struct Declaration {
    id: PermissionId,
    node: Node,
    settings: Settings,
    signature: OnceLock<Arc<Signature>>,
}

/// Handle to an immutable permission declaration.
///
/// Equality and hashing use the declaration's [`PermissionId`]: two
/// structurally identical declarations are distinct permissions.
#[derive(Clone)]
pub struct Permission(Arc<Declaration>);

impl Permission {
    /// Leaf permission backed by `check`.
    #[must_use]
    pub fn new(check: impl Check) -> Self {
        let inputs = check.inputs();
        Self::from_node(
            Node::Leaf {
                check: Arc::new(check),
                inputs,
            },
            Settings::default(),
        )
    }

    /// N-ary AND over `permissions`, in order.
    #[must_use]
    pub fn all(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::from_node(
            Node::All(permissions.into_iter().collect()),
            Settings::default(),
        )
    }

    /// N-ary OR over `permissions`, in order.
    #[must_use]
    pub fn any(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self::from_node(
            Node::Any(permissions.into_iter().collect()),
            Settings::default(),
        )
    }

    /// Transparent wrapper: checks `permission` under its own settings.
    #[must_use]
    pub fn wrap(permission: &Permission) -> Self {
        Self::from_node(Node::Wrapper(permission.clone()), Settings::default())
    }

    /// Negation. Negating a negation gives back the original permission.
    #[must_use]
    pub fn negate(&self) -> Self {
        match &self.0.node {
            Node::Not(inner) => inner.clone(),
            _ => Self::from_node(Node::Not(self.clone()), Settings::default()),
        }
    }

    pub(crate) fn lazy_node(inner: Permission, skip_on: SkipOn) -> Self {
        Self::from_node(Node::Lazy { inner, skip_on }, Settings::default())
    }

    fn from_node(node: Node, settings: Settings) -> Self {
        Self(Arc::new(Declaration {
            id: PermissionId::next(),
            node,
            settings,
            signature: OnceLock::new(),
        }))
    }

    fn with_settings(&self, settings: Settings) -> Self {
        Self::from_node(self.0.node.clone(), settings)
    }

    /// Same check with a different rejection message.
    #[must_use]
    pub fn with_message(&self, message: impl Into<String>) -> Self {
        self.with_settings(Settings {
            message: Some(Arc::from(message.into())),
            ..self.0.settings.clone()
        })
    }

    /// Same check with a different rejection status code.
    #[must_use]
    pub fn with_status_code(&self, status_code: StatusCode) -> Self {
        self.with_settings(Settings {
            status_code: Some(status_code),
            ..self.0.settings.clone()
        })
    }

    /// Same check that returns its failure instead of rejecting when `false`.
    #[must_use]
    pub fn with_auto_error(&self, auto_error: bool) -> Self {
        self.with_settings(Settings {
            auto_error,
            ..self.0.settings.clone()
        })
    }

    #[must_use]
    pub fn id(&self) -> PermissionId {
        self.0.id
    }

    #[must_use]
    pub fn kind(&self) -> PermissionKind {
        self.0.node.kind()
    }

    /// Direct children of a combinator, wrapper or lazy node.
    #[must_use]
    pub fn children(&self) -> &[Permission] {
        match &self.0.node {
            Node::Leaf { .. } => &[],
            Node::All(children) | Node::Any(children) => children,
            Node::Not(child) | Node::Wrapper(child) | Node::Lazy { inner: child, .. } => {
                std::slice::from_ref(child)
            }
        }
    }

    /// Inputs declared by a leaf; empty for every other kind.
    #[must_use]
    pub fn declared_inputs(&self) -> &[AnyDep] {
        match &self.0.node {
            Node::Leaf { inputs, .. } => inputs,
            _ => &[],
        }
    }

    #[must_use]
    pub fn exc_message(&self) -> &str {
        self.0
            .settings
            .message
            .as_deref()
            .unwrap_or_else(|| self.kind().default_message())
    }

    #[must_use]
    pub fn exc_status_code(&self) -> StatusCode {
        self.0.settings.status_code.unwrap_or(DEFAULT_STATUS_CODE)
    }

    #[must_use]
    pub fn auto_error(&self) -> bool {
        self.0.settings.auto_error
    }

    fn has_default_settings(&self) -> bool {
        self.0.settings == Settings::default()
    }

    /// Unnamed failures take this permission's message.
    pub(crate) fn normalize(&self, result: CheckResult) -> CheckResult {
        match result {
            CheckResult::Fail(None) => CheckResult::Fail(Some(self.exc_message().to_owned())),
            other => other,
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.0.node
    }

    pub(crate) fn signature_cell(&self) -> &OnceLock<Arc<Signature>> {
        &self.0.signature
    }

    /// Lazy nodes keep their own settings only when flattening is safe.
    pub(crate) fn flattenable_lazy(&self) -> Option<(&Permission, &SkipOn)> {
        match &self.0.node {
            Node::Lazy { inner, skip_on } if self.has_default_settings() => Some((inner, skip_on)),
            _ => None,
        }
    }
}

impl PartialEq for Permission {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Permission {}

impl Hash for Permission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = format!("{:?}{}", self.kind(), self.id());
        match &self.0.node {
            Node::Leaf { inputs, .. } => f
                .debug_tuple(&label)
                .field(&inputs.iter().map(AnyDep::name).collect::<Vec<_>>())
                .finish(),
            _ => {
                let mut tuple = f.debug_tuple(&label);
                for child in self.children() {
                    tuple.field(child);
                }
                tuple.finish()
            }
        }
    }
}

/// Flattens operands of `kind` that carry no overrides into one n-ary node.
fn merge(kind: PermissionKind, lhs: &Permission, rhs: &Permission) -> Permission {
    let mut children = Vec::with_capacity(2);
    for operand in [lhs, rhs] {
        if operand.kind() == kind && operand.has_default_settings() {
            children.extend(operand.children().iter().cloned());
        } else {
            children.push(operand.clone());
        }
    }

    let node = match kind {
        PermissionKind::All => Node::All(children),
        _ => Node::Any(children),
    };
    Permission::from_node(node, Settings::default())
}

macro_rules! impl_combinator {
    ($trait:ident, $method:ident, $kind:expr) => {
        impl $trait for Permission {
            type Output = Permission;

            fn $method(self, rhs: Permission) -> Permission {
                merge($kind, &self, &rhs)
            }
        }

        impl $trait<&Permission> for Permission {
            type Output = Permission;

            fn $method(self, rhs: &Permission) -> Permission {
                merge($kind, &self, rhs)
            }
        }

        impl $trait<Permission> for &Permission {
            type Output = Permission;

            fn $method(self, rhs: Permission) -> Permission {
                merge($kind, self, &rhs)
            }
        }

        impl $trait<&Permission> for &Permission {
            type Output = Permission;

            fn $method(self, rhs: &Permission) -> Permission {
                merge($kind, self, rhs)
            }
        }
    };
}

impl_combinator!(BitAnd, bitand, PermissionKind::All);
impl_combinator!(BitOr, bitor, PermissionKind::Any);

impl Not for Permission {
    type Output = Permission;

    fn not(self) -> Permission {
        self.negate()
    }
}

impl Not for &Permission {
    type Output = Permission;

    fn not(self) -> Permission {
        self.negate()
    }
}

type CheckFn = dyn Fn(Inputs) -> BoxFuture<'static, CheckOutcome> + Send + Sync;

struct FnCheck {
    inputs: Vec<AnyDep>,
    f: Box<CheckFn>,
}

#[async_trait]
impl Check for FnCheck {
    fn inputs(&self) -> Vec<AnyDep> {
        self.inputs.clone()
    }

    async fn check(&self, inputs: &Inputs) -> CheckOutcome {
        (self.f)(inputs.clone()).await
    }
}

fn fn_check<F, Fut, R>(inputs: impl IntoIterator<Item = AnyDep>, f: F) -> FnCheck
where
    F: Fn(Inputs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CheckError>> + Send + 'static,
    R: Into<CheckResult>,
{
    FnCheck {
        inputs: inputs.into_iter().collect(),
        f: Box::new(move |inputs| {
            let fut = f(inputs);
            Box::pin(async move { fut.await.map(Into::into) })
        }),
    }
}

/// Leaf permission from an async closure over its solved inputs.
///
/// ```ignore
/// let role = header("x-role");
/// let is_admin = permission([role.erased()], move |inputs| {
///     let role = role.clone();
///     async move { Ok(inputs.get(&role)?.as_deref() == Some("admin")) }
/// });
/// ```
#[must_use]
pub fn permission<F, Fut, R>(inputs: impl IntoIterator<Item = AnyDep>, f: F) -> Permission
where
    F: Fn(Inputs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CheckError>> + Send + 'static,
    R: Into<CheckResult>,
{
    Permission::new(fn_check(inputs, f))
}

/// Like [`permission`], with the rejection message and status code set.
#[must_use]
pub fn permission_with<F, Fut, R>(
    message: impl Into<String>,
    status_code: StatusCode,
    inputs: impl IntoIterator<Item = AnyDep>,
    f: F,
) -> Permission
where
    F: Fn(Inputs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CheckError>> + Send + 'static,
    R: Into<CheckResult>,
{
    let check = fn_check(inputs, f);
    let inputs = check.inputs.clone();
    Permission::from_node(
        Node::Leaf {
            check: Arc::new(check),
            inputs,
        },
        Settings {
            message: Some(Arc::from(message.into())),
            status_code: Some(status_code),
            auto_error: true,
        },
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn leaf() -> Permission {
        permission([], |_| async { Ok(true) })
    }

    fn ids(permissions: &[Permission]) -> Vec<PermissionId> {
        permissions.iter().map(Permission::id).collect()
    }

    #[test]
    fn every_declaration_gets_its_own_id() {
        let a = leaf();
        let b = leaf();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_ne!(a, a.with_message("other"));
    }

    #[test]
    fn and_flattens_both_sides() {
        let (a, b, c, d) = (leaf(), leaf(), leaf(), leaf());
        let merged = (&a & &b) & (&c & &d);

        assert_eq!(merged.kind(), PermissionKind::All);
        assert_eq!(ids(merged.children()), ids(&[a, b, c, d]));
    }

    #[test]
    fn or_flattens_both_sides() {
        let (a, b, c, d) = (leaf(), leaf(), leaf(), leaf());
        let merged = (&a | &b) | (&c | &d);

        assert_eq!(merged.kind(), PermissionKind::Any);
        assert_eq!(ids(merged.children()), ids(&[a, b, c, d]));
    }

    #[test]
    fn mixed_kinds_nest() {
        let (a, b, c) = (leaf(), leaf(), leaf());
        let expr = (&a & &b) | &c;

        assert_eq!(expr.kind(), PermissionKind::Any);
        assert_eq!(expr.children()[0].kind(), PermissionKind::All);
        assert_eq!(ids(expr.children()[0].children()), ids(&[a, b]));
        assert_eq!(expr.children()[1], c);
    }

    #[test]
    fn overridden_combinator_is_not_flattened() {
        let (a, b, c) = (leaf(), leaf(), leaf());
        let inner = (&a & &b).with_message("a and b");
        let expr = &inner & &c;

        assert_eq!(expr.children().len(), 2);
        assert_eq!(expr.children()[0], inner);
        assert_eq!(expr.children()[0].exc_message(), "a and b");
    }

    #[test]
    fn double_negation_returns_original() {
        let p = leaf();
        let negated = !&p;
        assert_eq!(negated.kind(), PermissionKind::Not);
        assert_eq!(!negated, p);
    }

    #[test]
    fn combinator_operands_are_untouched() {
        let (a, b) = (leaf(), leaf());
        let all = &a & &b;
        let _ = &all & leaf();
        assert_eq!(all.children().len(), 2);
    }

    #[test]
    fn default_messages_by_kind() {
        let (a, b) = (leaf(), leaf());
        assert_eq!(a.exc_message(), DEFAULT_MESSAGE);
        assert_eq!((&a & &b).exc_message(), ALL_DEFAULT_MESSAGE);
        assert_eq!((&a | &b).exc_message(), ANY_DEFAULT_MESSAGE);
        assert_eq!((!&a).exc_message(), NOT_DEFAULT_MESSAGE);
        assert_eq!(Permission::wrap(&a).exc_message(), DEFAULT_MESSAGE);
        assert_eq!(a.exc_status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn overrides_are_kept_together() {
        let p = leaf()
            .with_message("admins only")
            .with_status_code(StatusCode::UNAUTHORIZED)
            .with_auto_error(false);

        assert_eq!(p.exc_message(), "admins only");
        assert_eq!(p.exc_status_code(), StatusCode::UNAUTHORIZED);
        assert!(!p.auto_error());
    }

    #[test]
    fn permission_with_sets_overrides() {
        let role = crate::dependency::header("x-role");
        let p = permission_with("staff only", StatusCode::NOT_FOUND, [role.erased()], |_| async {
            Ok(CheckResult::Pass)
        });

        assert_eq!(p.exc_message(), "staff only");
        assert_eq!(p.exc_status_code(), StatusCode::NOT_FOUND);
        assert_eq!(p.declared_inputs().len(), 1);
        assert_eq!(p.declared_inputs()[0].id(), role.id());
    }

    #[test]
    fn debug_shows_tree() {
        let p = leaf();
        let rendered = format!("{:?}", !&p);
        assert!(rendered.starts_with("Not#"));
        assert!(rendered.contains("Leaf#"));
    }
}
