//! Resolution plans and their process-wide cache.
//!
//! A [`Plan`] is the flattened list of inputs a resolver needs solved before
//! it can bind. Plans depend only on the declaration, so [`PlanCache`] keeps
//! one per `(route, permission)` and hands the same plan to every request.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::config::PermissionsConfig;
use crate::dependency::AnyDep;
use crate::permission::PermissionId;
use crate::resolver::{Param, PermissionResolver, Signature};

/// Inputs to solve for one resolver, deduplicated, in first-seen order.
///
/// Lazy nodes contribute nothing: their inputs are solved when the lazy
/// node itself is checked.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    deps: Vec<AnyDep>,
}

impl Plan {
    #[must_use]
    pub fn build(resolver: &PermissionResolver) -> Self {
        let mut seen = HashSet::new();
        let mut deps = Vec::new();
        collect(resolver.signature(), &mut seen, &mut deps);
        Self { deps }
    }

    #[must_use]
    pub fn deps(&self) -> &[AnyDep] {
        &self.deps
    }
}

fn collect(signature: &Signature, seen: &mut HashSet<crate::DepId>, deps: &mut Vec<AnyDep>) {
    for param in signature.params() {
        match param {
            Param::Input(dep) => {
                if seen.insert(dep.id()) {
                    deps.push(dep.clone());
                }
            }
            Param::Permission(child) => collect(child.signature(), seen, deps),
            Param::Request => {}
        }
    }
}

struct CachedPlan {
    plan: Arc<Plan>,
    last_used: AtomicU64,
}

type PlanKey = (Arc<str>, PermissionId);

/// Bounded LRU cache of plans keyed by `(route, permission id)`.
pub struct PlanCache {
    entries: DashMap<PlanKey, CachedPlan>,
    capacity: usize,
    clock: AtomicU64,
}

static GLOBAL: LazyLock<Arc<PlanCache>> =
    LazyLock::new(|| Arc::new(PlanCache::new(PermissionsConfig::default().plan_cache_capacity)));

impl PlanCache {
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            clock: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn from_config(config: &PermissionsConfig) -> Self {
        Self::new(config.plan_cache_capacity)
    }

    /// Process-wide cache used by contexts that were not given their own.
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Cached plan for `resolver` under `route`, built on first use.
    pub fn fetch(&self, route: &Arc<str>, resolver: &PermissionResolver) -> Arc<Plan> {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        let key = (Arc::clone(route), resolver.permission().id());

        if let Some(entry) = self.entries.get(&key) {
            entry.last_used.store(tick, Ordering::Relaxed);
            return Arc::clone(&entry.plan);
        }

        let plan = {
            let entry = self.entries.entry(key).or_insert_with(|| {
                tracing::debug!(
                    route = %route,
                    permission = %resolver.permission().id(),
                    "building permission resolution plan"
                );
                CachedPlan {
                    plan: Arc::new(Plan::build(resolver)),
                    last_used: AtomicU64::new(tick),
                }
            });
            Arc::clone(&entry.plan)
        };

        self.evict_over_capacity();
        plan
    }

    fn evict_over_capacity(&self) {
        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());

            let Some(key) = oldest else {
                return;
            };
            if self.entries.remove(&key).is_some() {
                tracing::debug!(route = %key.0, permission = %key.1, "evicted permission resolution plan");
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn contains(&self, route: &str, id: PermissionId) -> bool {
        self.entries.contains_key(&(Arc::from(route), id))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::from_config(&PermissionsConfig::default())
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
