//! Boundary with the host's dependency solver.
//!
//! The core only ever asks one question: "solve these declared inputs for
//! the current request". [`DefaultInjector`] answers it by running each
//! descriptor's provider; hosts with their own container implement
//! [`Injector`] instead.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::dependency::{AnyDep, Dep, DepId, Value};
use crate::error::{ValidationError, ValidationErrors};

/// Result of solving a batch of inputs.
#[derive(Default)]
pub struct Solved {
    pub values: Vec<(DepId, Value)>,
    pub errors: Vec<ValidationError>,
}

impl fmt::Debug for Solved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solved")
            .field("values", &self.values.iter().map(|(id, _)| id).collect::<Vec<_>>())
            .field("errors", &self.errors)
            .finish()
    }
}

#[async_trait]
pub trait Injector: Send + Sync {
    /// Solves `inputs` for the request in `cx`.
    ///
    /// Inputs already present in `cx.cache()` may be left out of the
    /// returned values. Failures are reported in [`Solved::errors`], never
    /// by panicking or dropping the input silently.
    async fn solve(&self, inputs: &[AnyDep], cx: &RequestContext) -> Solved;
}

/// Injector that runs each descriptor's own provider.
///
/// Overrides replace the provider of a declared input while keeping its
/// identity, so checks reading the original descriptor see the overriding
/// value.
#[derive(Default, Clone)]
pub struct DefaultInjector {
    overrides: HashMap<DepId, AnyDep>,
}

impl DefaultInjector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve `dep` with `replacement`'s provider.
    #[must_use]
    pub fn with_override<T>(mut self, dep: &Dep<T>, replacement: &Dep<T>) -> Self {
        self.overrides
            .insert(dep.id(), dep.with_provider_of(replacement));
        self
    }

    #[must_use]
    pub fn has_overrides(&self) -> bool {
        !self.overrides.is_empty()
    }
}

impl fmt::Debug for DefaultInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultInjector")
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

#[async_trait]
impl Injector for DefaultInjector {
    async fn solve(&self, inputs: &[AnyDep], cx: &RequestContext) -> Solved {
        let mut solved = Solved::default();
        for input in inputs {
            if cx.cache().contains(input.id()) {
                continue;
            }
            let provider = self.overrides.get(&input.id()).unwrap_or(input);
            match provider.provide(cx).await {
                Ok(value) => solved.values.push((input.id(), value)),
                Err(err) => solved.errors.push(err),
            }
        }
        solved
    }
}

/// Solves `inputs` with the context's injector and stores the values in the
/// request cache.
pub(crate) async fn solve_into(
    cx: &mut RequestContext,
    inputs: &[AnyDep],
) -> Result<(), ValidationErrors> {
    if inputs.iter().all(|input| cx.cache().contains(input.id())) {
        return Ok(());
    }

    let injector = std::sync::Arc::clone(cx.injector());
    let Solved { values, errors } = injector.solve(inputs, cx).await;
    cx.cache_mut().extend(values);

    match ValidationErrors::new(errors) {
        Some(errors) => Err(errors),
        None => Ok(()),
    }
}
