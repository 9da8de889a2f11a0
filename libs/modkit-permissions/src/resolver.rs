//! Two-phase evaluation.
//!
//! At declaration time a [`PermissionResolver`] exposes the [`Signature`] of
//! a permission: its own inputs plus the resolvers of its children. At
//! request time the resolver solves that signature and binds the solved
//! values into a [`ResolvedPermission`], which runs the checks.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::context::RequestContext;
use crate::dependency::{AnyDep, Inputs};
use crate::error::{PermissionError, Rejection};
use crate::injector::solve_into;
use crate::lazy::{self, SkipOn};
use crate::permission::{Check, Node, Permission};
use crate::result::{CheckResult, classify};

/// One parameter a resolver asks the injector for.
#[derive(Debug, Clone)]
pub enum Param {
    /// A declared input of a leaf.
    Input(AnyDep),
    /// A child permission, solved through its own resolver.
    Permission(PermissionResolver),
    /// The request itself; lazy nodes solve their child on demand.
    Request,
}

#[derive(Debug, Clone, Default)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    fn of(permission: &Permission) -> Self {
        let params = match permission.node() {
            Node::Leaf { inputs, .. } => inputs.iter().cloned().map(Param::Input).collect(),
            Node::All(children) | Node::Any(children) => children
                .iter()
                .map(|child| Param::Permission(child.resolver()))
                .collect(),
            Node::Not(child) | Node::Wrapper(child) => vec![Param::Permission(child.resolver())],
            Node::Lazy { .. } => vec![Param::Request],
        };
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Declaration-time adapter between a permission and the injector.
#[derive(Clone)]
pub struct PermissionResolver {
    permission: Permission,
    signature: Arc<Signature>,
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("permission", &self.permission.id())
            .field("params", &self.signature.len())
            .finish()
    }
}

impl Permission {
    /// Resolver for this declaration; its signature is computed once.
    #[must_use]
    pub fn resolver(&self) -> PermissionResolver {
        let signature = self
            .signature_cell()
            .get_or_init(|| Arc::new(Signature::of(self)));
        PermissionResolver {
            permission: self.clone(),
            signature: Arc::clone(signature),
        }
    }

    /// Resolves, checks and enforces this permission for one request.
    ///
    /// # Errors
    ///
    /// - [`PermissionError::Validation`] when an eagerly solved input fails
    /// - [`PermissionError::Denied`] when the check fails and `auto_error` is set
    /// - [`PermissionError::Check`] when a check raised an unrelated error
    #[tracing::instrument(skip_all, fields(permission = %self.id(), route = %cx.route()))]
    pub async fn authorize(&self, cx: &mut RequestContext) -> Result<CheckResult, PermissionError> {
        let resolved = self.resolver().resolve(cx).await?;
        let result = resolved.check_permissions(cx).await?;
        self.enforce(result)
    }

    /// Turns a final failing result into a rejection when `auto_error` is set.
    ///
    /// Skips are allowed: a permission that abstains does not reject.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Denied`] for a failure with `auto_error`.
    pub fn enforce(&self, result: CheckResult) -> Result<CheckResult, PermissionError> {
        match result {
            CheckResult::Fail(reason) if self.auto_error() => {
                let message = reason.unwrap_or_else(|| self.exc_message().to_owned());
                tracing::debug!(permission = %self.id(), %message, "permission denied");
                Err(PermissionError::Denied(Rejection {
                    status_code: self.exc_status_code(),
                    message,
                }))
            }
            other => {
                tracing::debug!(permission = %self.id(), result = ?other, "permission allowed");
                Ok(other)
            }
        }
    }
}

impl PermissionResolver {
    #[must_use]
    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Solves this resolver's plan for the request and binds the values.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Validation`] with every input that failed
    /// to solve.
    pub async fn resolve(&self, cx: &mut RequestContext) -> Result<ResolvedPermission, PermissionError> {
        let plan = cx.plans().fetch(cx.route(), self);
        solve_into(cx, plan.deps()).await?;
        self.bind(cx)
    }

    /// Binds already solved inputs from the request cache.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Unsolved`] when an eager input is missing
    /// from the cache.
    pub fn bind(&self, cx: &RequestContext) -> Result<ResolvedPermission, PermissionError> {
        let binding = match self.permission.node() {
            Node::Leaf { check, inputs } => Binding::Leaf {
                check: Arc::clone(check),
                inputs: bind_inputs(inputs, cx)?,
            },
            Node::All(children) => Binding::All(bind_children(children, cx)?),
            Node::Any(children) => Binding::Any(bind_children(children, cx)?),
            Node::Not(child) => Binding::Not(Box::new(child.resolver().bind(cx)?)),
            Node::Wrapper(child) => Binding::Wrapper(Box::new(child.resolver().bind(cx)?)),
            Node::Lazy { inner, skip_on } => Binding::Lazy {
                resolver: inner.resolver(),
                skip_on: skip_on.clone(),
            },
        };

        Ok(ResolvedPermission {
            permission: self.permission.clone(),
            binding,
        })
    }
}

fn bind_inputs(inputs: &[AnyDep], cx: &RequestContext) -> Result<Inputs, PermissionError> {
    inputs
        .iter()
        .map(|dep| {
            cx.cache()
                .get(dep.id())
                .map(|value| (dep.clone(), Arc::clone(value)))
                .ok_or_else(|| PermissionError::Unsolved {
                    input: dep.name().to_owned(),
                })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Inputs::new)
}

fn bind_children(
    children: &[Permission],
    cx: &RequestContext,
) -> Result<Vec<ResolvedPermission>, PermissionError> {
    children.iter().map(|child| child.resolver().bind(cx)).collect()
}

enum Binding {
    Leaf { check: Arc<dyn Check>, inputs: Inputs },
    All(Vec<ResolvedPermission>),
    Any(Vec<ResolvedPermission>),
    Not(Box<ResolvedPermission>),
    Wrapper(Box<ResolvedPermission>),
    Lazy { resolver: PermissionResolver, skip_on: SkipOn },
}

/// A permission bound to the solved inputs of one request.
pub struct ResolvedPermission {
    permission: Permission,
    binding: Binding,
}

impl std::fmt::Debug for ResolvedPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPermission")
            .field("permission", &self.permission)
            .finish_non_exhaustive()
    }
}

impl ResolvedPermission {
    #[must_use]
    pub fn permission(&self) -> &Permission {
        &self.permission
    }

    /// Evaluates the bound tree.
    ///
    /// Children run one at a time in declaration order and evaluation stops
    /// as soon as the outcome is decided. Explicit failure reasons surface
    /// unchanged; a failure without one takes the message of this
    /// permission, the outermost evaluated node. Nothing is enforced here;
    /// see [`Permission::enforce`].
    ///
    /// # Errors
    ///
    /// Propagates [`PermissionError::Check`] from any check, and validation
    /// errors of lazy nodes that are not configured to skip them.
    pub async fn check_permissions(
        &self,
        cx: &mut RequestContext,
    ) -> Result<CheckResult, PermissionError> {
        let result = self.evaluate(cx).await?;
        Ok(self.permission.normalize(result))
    }

    /// Recursive evaluator; reasonless failures stay `Fail(None)`.
    pub(crate) fn evaluate<'a>(
        &'a self,
        cx: &'a mut RequestContext,
    ) -> BoxFuture<'a, Result<CheckResult, PermissionError>> {
        Box::pin(async move {
            Ok::<_, PermissionError>(match &self.binding {
                Binding::Leaf { check, inputs } => classify(check.check(inputs)).await?,
                Binding::All(children) => all(children, cx).await?,
                Binding::Any(children) => any(children, cx).await?,
                Binding::Not(child) => match child.evaluate(cx).await? {
                    skipped @ CheckResult::Skip(_) => skipped,
                    CheckResult::Pass => CheckResult::Fail(None),
                    CheckResult::Fail(_) => CheckResult::Pass,
                },
                Binding::Wrapper(child) => child.evaluate(cx).await?,
                Binding::Lazy { resolver, skip_on } => lazy::check(resolver, skip_on, cx).await?,
            })
        })
    }
}

async fn all(
    children: &[ResolvedPermission],
    cx: &mut RequestContext,
) -> Result<CheckResult, PermissionError> {
    let mut decided = false;
    for child in children {
        match child.evaluate(cx).await? {
            CheckResult::Skip(_) => {}
            failed @ CheckResult::Fail(_) => return Ok(failed),
            CheckResult::Pass => decided = true,
        }
    }
    Ok(if decided { CheckResult::Pass } else { CheckResult::Skip(None) })
}

async fn any(
    children: &[ResolvedPermission],
    cx: &mut RequestContext,
) -> Result<CheckResult, PermissionError> {
    let mut decided = false;
    for child in children {
        match child.evaluate(cx).await? {
            CheckResult::Skip(_) => {}
            CheckResult::Pass => return Ok(CheckResult::Pass),
            CheckResult::Fail(_) => decided = true,
        }
    }
    Ok(if decided { CheckResult::Fail(None) } else { CheckResult::Skip(None) })
}
