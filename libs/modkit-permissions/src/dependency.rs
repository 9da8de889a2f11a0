//! Declared inputs of a permission check.
//!
//! A [`Dep<T>`] describes one value a check needs from the current request
//! (a header, the authenticated user, a role looked up in a store). The
//! descriptor itself is static and shared across requests; the injector
//! solves it once per request and stores the value in the request cache
//! under the descriptor's [`DepId`].

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use http::HeaderMap;

use crate::context::RequestContext;
use crate::error::ValidationError;
use crate::result::CheckError;

/// Type-erased solved value.
pub type Value = Arc<dyn Any + Send + Sync>;

static NEXT_DEP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle of a declared input; the per-request cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        Self(NEXT_DEP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Produces the value of a declared input for one request.
#[async_trait]
pub trait Provide: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the request does not carry a usable
    /// value for this input.
    async fn provide(&self, cx: &RequestContext) -> Result<Self::Output, ValidationError>;
}

#[async_trait]
trait ErasedProvider: Send + Sync {
    async fn provide_erased(&self, cx: &RequestContext) -> Result<Value, ValidationError>;
}

struct Erased<P>(P);

#[async_trait]
impl<P: Provide> ErasedProvider for Erased<P> {
    async fn provide_erased(&self, cx: &RequestContext) -> Result<Value, ValidationError> {
        let value = self.0.provide(cx).await?;
        Ok(Arc::new(value))
    }
}

struct Constant(Value);

#[async_trait]
impl ErasedProvider for Constant {
    async fn provide_erased(&self, _cx: &RequestContext) -> Result<Value, ValidationError> {
        Ok(Arc::clone(&self.0))
    }
}

struct FnProvider<F, T>(F, PhantomData<fn() -> T>);

#[async_trait]
impl<F, T> Provide for FnProvider<F, T>
where
    F: Fn(&RequestContext) -> Result<T, ValidationError> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    type Output = T;

    async fn provide(&self, cx: &RequestContext) -> Result<T, ValidationError> {
        (self.0)(cx)
    }
}

/// Type-erased input descriptor, as it appears in a resolver signature.
#[derive(Clone)]
pub struct AnyDep {
    id: DepId,
    name: Arc<str>,
    provider: Arc<dyn ErasedProvider>,
}

impl AnyDep {
    #[must_use]
    pub fn id(&self) -> DepId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Solves this input against the request.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`ValidationError`].
    pub async fn provide(&self, cx: &RequestContext) -> Result<Value, ValidationError> {
        self.provider.provide_erased(cx).await
    }
}

impl fmt::Debug for AnyDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyDep")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Typed input descriptor.
pub struct Dep<T> {
    erased: AnyDep,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Dep<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Dep<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Dep").field(&self.erased.name).finish()
    }
}

impl<T: Send + Sync + 'static> Dep<T> {
    #[must_use]
    pub fn new<P>(name: impl Into<Arc<str>>, provider: P) -> Self
    where
        P: Provide<Output = T>,
    {
        Self::from_erased(name.into(), Arc::new(Erased(provider)))
    }

    /// Input computed synchronously from the request.
    #[must_use]
    pub fn from_fn<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<T, ValidationError> + Send + Sync + 'static,
    {
        Self::new(name, FnProvider(f, PhantomData))
    }

    /// Input that always resolves to `value`.
    #[must_use]
    pub fn value(name: impl Into<Arc<str>>, value: T) -> Self {
        Self::from_erased(name.into(), Arc::new(Constant(Arc::new(value))))
    }

    fn from_erased(name: Arc<str>, provider: Arc<dyn ErasedProvider>) -> Self {
        Self {
            erased: AnyDep {
                id: DepId::next(),
                name,
                provider,
            },
            _marker: PhantomData,
        }
    }
}

impl<T> Dep<T> {
    #[must_use]
    pub fn id(&self) -> DepId {
        self.erased.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.erased.name
    }

    #[must_use]
    pub fn erased(&self) -> AnyDep {
        self.erased.clone()
    }

    /// Replaces the provider while keeping this descriptor's identity.
    pub(crate) fn with_provider_of(&self, replacement: &Dep<T>) -> AnyDep {
        AnyDep {
            id: self.erased.id,
            name: Arc::clone(&replacement.erased.name),
            provider: Arc::clone(&replacement.erased.provider),
        }
    }
}

impl<T> From<Dep<T>> for AnyDep {
    fn from(dep: Dep<T>) -> Self {
        dep.erased
    }
}

impl<T> From<&Dep<T>> for AnyDep {
    fn from(dep: &Dep<T>) -> Self {
        dep.erased.clone()
    }
}

fn header_location(name: &str) -> String {
    format!("header.{name}")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ValidationError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| {
                    ValidationError::invalid(header_location(name), "header value is not visible ASCII")
                })
        })
        .transpose()
}

/// Optional request header as a string.
#[must_use]
pub fn header(name: &str) -> Dep<Option<String>> {
    let name = name.to_ascii_lowercase();
    Dep::from_fn(header_location(&name), move |cx| {
        Ok(header_str(cx.headers(), &name)?.map(ToOwned::to_owned))
    })
}

/// Required request header parsed as `T`.
///
/// A missing header is reported as [`crate::ValidationErrorKind::Missing`],
/// a value that does not parse as [`crate::ValidationErrorKind::Invalid`].
#[must_use]
pub fn required_header<T>(name: &str) -> Dep<T>
where
    T: FromStr + Send + Sync + 'static,
    T::Err: fmt::Display,
{
    let name = name.to_ascii_lowercase();
    Dep::from_fn(header_location(&name), move |cx| {
        let raw = header_str(cx.headers(), &name)?
            .ok_or_else(|| ValidationError::missing(header_location(&name)))?;
        raw.trim()
            .parse::<T>()
            .map_err(|err| ValidationError::invalid(header_location(&name), err.to_string()))
    })
}

/// The full request header map.
#[must_use]
pub fn headers() -> Dep<HeaderMap> {
    Dep::from_fn("headers", |cx| Ok(cx.headers().clone()))
}

/// Solved values handed to one leaf check, in declaration order.
#[derive(Clone, Default)]
pub struct Inputs {
    values: Vec<(AnyDep, Value)>,
}

impl Inputs {
    pub(crate) fn new(values: Vec<(AnyDep, Value)>) -> Self {
        Self { values }
    }

    /// Value solved for `dep`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Other`] when `dep` is not one of the check's
    /// declared inputs.
    pub fn get<T: 'static>(&self, dep: &Dep<T>) -> Result<&T, CheckError> {
        let (_, value) = self
            .values
            .iter()
            .find(|(declared, _)| declared.id == dep.id())
            .ok_or_else(|| anyhow::anyhow!("input `{}` is not declared by this check", dep.name()))?;

        let value: &T = (**value)
            .downcast_ref::<T>()
            .ok_or_else(|| anyhow::anyhow!("input `{}` was solved with an unexpected type", dep.name()))?;
        Ok(value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(dep, _)| dep.name())
    }
}

impl fmt::Debug for Inputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::error::ValidationErrorKind;

    fn cx_with_headers(pairs: &[(&str, &str)]) -> RequestContext {
        let mut builder = http::Request::builder().uri("/items");
        for (name, value) in pairs {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        RequestContext::new(parts)
    }

    #[test]
    fn ids_are_unique() {
        let a = header("x-role");
        let b = header("x-role");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), b.name());
        assert_eq!(a.clone().id(), a.id());
    }

    #[tokio::test]
    async fn optional_header() {
        let dep = header("X-Role");
        let cx = cx_with_headers(&[("x-role", "admin")]);
        let value = dep.erased().provide(&cx).await.unwrap();
        assert_eq!(value.downcast_ref::<Option<String>>(), Some(&Some("admin".to_owned())));

        let cx = cx_with_headers(&[]);
        let value = dep.erased().provide(&cx).await.unwrap();
        assert_eq!(value.downcast_ref::<Option<String>>(), Some(&None));
    }

    #[tokio::test]
    async fn required_header_reports_missing_and_invalid() {
        let dep = required_header::<u32>("age");

        let err = dep.erased().provide(&cx_with_headers(&[])).await.unwrap_err();
        assert_eq!(err.location, "header.age");
        assert_eq!(err.kind, ValidationErrorKind::Missing);

        let err = dep
            .erased()
            .provide(&cx_with_headers(&[("age", "abc")]))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::Invalid { .. }));

        let value = dep
            .erased()
            .provide(&cx_with_headers(&[("age", "42")]))
            .await
            .unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
    }

    #[tokio::test]
    async fn constant_value() {
        let dep = Dep::value("tenant", "acme".to_owned());
        let value = dep.erased().provide(&RequestContext::default()).await.unwrap();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("acme"));
    }

    #[test]
    fn inputs_lookup_by_descriptor() {
        let declared = Dep::value("flag", true);
        let other = Dep::value("flag", true);
        let inputs = Inputs::new(vec![(declared.erased(), Arc::new(true) as Value)]);

        assert!(*inputs.get(&declared).unwrap());
        assert!(matches!(inputs.get(&other), Err(CheckError::Other(_))));
        assert_eq!(inputs.names().collect::<Vec<_>>(), vec!["flag"]);
    }
}
