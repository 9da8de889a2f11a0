use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::HeaderMap;
use http::request::Parts;

use crate::dependency::{Dep, DepId, Value};
use crate::injector::{DefaultInjector, Injector};
use crate::plan::PlanCache;

/// Per-request memoization of solved inputs, keyed by [`DepId`].
#[derive(Default, Clone)]
pub struct DependencyCache {
    values: HashMap<DepId, Value>,
}

impl DependencyCache {
    #[must_use]
    pub fn get(&self, id: DepId) -> Option<&Value> {
        self.values.get(&id)
    }

    /// Typed view of a cached value.
    #[must_use]
    pub fn get_typed<T: 'static>(&self, dep: &Dep<T>) -> Option<&T> {
        self.values
            .get(&dep.id())
            .and_then(|value| (**value).downcast_ref::<T>())
    }

    #[must_use]
    pub fn contains(&self, id: DepId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn insert(&mut self, id: DepId, value: Value) {
        self.values.insert(id, value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Extend<(DepId, Value)> for DependencyCache {
    fn extend<I: IntoIterator<Item = (DepId, Value)>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl fmt::Debug for DependencyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Everything permission evaluation needs to know about the current request.
///
/// Created by the host for each request and threaded through resolution and
/// checking. Owns the request head, the route key used for plan caching,
/// the request's dependency cache, and handles to the injector and plan
/// cache shared across requests.
pub struct RequestContext {
    parts: Parts,
    route: Arc<str>,
    cache: DependencyCache,
    injector: Arc<dyn Injector>,
    plans: Arc<PlanCache>,
}

impl RequestContext {
    /// Context for `parts` with the route taken from the URI path, the
    /// default injector and the process-wide plan cache.
    #[must_use]
    pub fn new(parts: Parts) -> Self {
        let route = Arc::from(parts.uri.path());
        Self {
            parts,
            route,
            cache: DependencyCache::default(),
            injector: Arc::new(DefaultInjector::default()),
            plans: PlanCache::global(),
        }
    }

    /// Route key for plan caching, usually the matched route template.
    #[must_use]
    pub fn with_route(mut self, route: impl Into<Arc<str>>) -> Self {
        self.route = route.into();
        self
    }

    #[must_use]
    pub fn with_injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = injector;
        self
    }

    #[must_use]
    pub fn with_plan_cache(mut self, plans: Arc<PlanCache>) -> Self {
        self.plans = plans;
        self
    }

    #[must_use]
    pub fn parts(&self) -> &Parts {
        &self.parts
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    #[must_use]
    pub fn route(&self) -> &Arc<str> {
        &self.route
    }

    #[must_use]
    pub fn cache(&self) -> &DependencyCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut DependencyCache {
        &mut self.cache
    }

    #[must_use]
    pub fn injector(&self) -> &Arc<dyn Injector> {
        &self.injector
    }

    #[must_use]
    pub fn plans(&self) -> &Arc<PlanCache> {
        &self.plans
    }

    /// Gives the request head back to the host, dropping the cache.
    #[must_use]
    pub fn into_parts(self) -> Parts {
        self.parts
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        let (parts, ()) = http::Request::new(()).into_parts();
        Self::new(parts)
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("route", &self.route)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn route_defaults_to_path() {
        let (parts, ()) = http::Request::builder()
            .uri("/items/42?full=true")
            .body(())
            .unwrap()
            .into_parts();
        let cx = RequestContext::new(parts);
        assert_eq!(&**cx.route(), "/items/42");

        let cx = cx.with_route("/items/{id}");
        assert_eq!(&**cx.route(), "/items/{id}");
        assert_eq!(cx.into_parts().uri.query(), Some("full=true"));
    }

    #[test]
    fn cache_is_typed_by_descriptor() {
        let dep = Dep::value("user", "alice".to_owned());
        let mut cx = RequestContext::default();
        assert!(cx.cache().is_empty());

        cx.cache_mut().insert(dep.id(), Arc::new("alice".to_owned()));
        assert!(cx.cache().contains(dep.id()));
        assert_eq!(cx.cache().get_typed(&dep).map(String::as_str), Some("alice"));

        let wrong_type: Dep<u32> = Dep::value("user", 1);
        assert!(cx.cache().get_typed(&wrong_type).is_none());
    }
}
