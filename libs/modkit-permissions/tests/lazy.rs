#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use modkit_permissions::{
    CheckError, CheckOutcome, CheckResult, Dep, Inputs, Permission, PermissionError, PlanCache,
    Provide, RequestContext, SkipOn, ValidationError, ValidationErrorKind, lazy, permission,
    required_header,
};

// ── fixtures ──

struct AgeIsMoreThan {
    age: Dep<u32>,
    min: u32,
}

#[async_trait]
impl modkit_permissions::Check for AgeIsMoreThan {
    fn inputs(&self) -> Vec<modkit_permissions::AnyDep> {
        vec![self.age.erased()]
    }

    async fn check(&self, inputs: &Inputs) -> CheckOutcome {
        Ok((*inputs.get(&self.age)? > self.min).into())
    }
}

fn age_over_18() -> Permission {
    Permission::new(AgeIsMoreThan {
        age: required_header("age"),
        min: 18,
    })
}

fn request(headers: &[(&str, &str)], plans: &Arc<PlanCache>) -> RequestContext {
    let mut builder = http::Request::builder().uri("/lazy");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let (parts, ()) = builder.body(()).unwrap().into_parts();
    RequestContext::new(parts).with_plan_cache(Arc::clone(plans))
}

struct Counting {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Provide for Counting {
    type Output = bool;

    async fn provide(&self, _cx: &RequestContext) -> Result<bool, ValidationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

fn reads(dep: &Dep<bool>) -> Permission {
    let d = dep.clone();
    permission([dep.erased()], move |inputs| {
        let value = inputs.get(&d).copied();
        async move { value }
    })
}

#[derive(Debug, thiserror::Error)]
#[error("role store unavailable")]
struct StoreDown;

// ── skip on validation ──

#[tokio::test]
async fn lazy_age_check() {
    let plans = Arc::new(PlanCache::new(16));
    let p = lazy(&age_over_18(), SkipOn::validation());

    let ok = p.authorize(&mut request(&[("age", "20")], &plans)).await;
    assert_eq!(ok.unwrap(), CheckResult::Pass);

    let young = p.authorize(&mut request(&[("age", "17")], &plans)).await;
    assert!(young.unwrap_err().is_denied());

    let invalid = p.authorize(&mut request(&[("age", "abc")], &plans)).await;
    assert!(invalid.unwrap().is_skipped());

    let missing = p.authorize(&mut request(&[], &plans)).await;
    assert!(missing.unwrap().is_skipped());
}

#[tokio::test]
async fn eager_age_check_reports_validation() {
    let plans = Arc::new(PlanCache::new(16));
    let err = age_over_18()
        .authorize(&mut request(&[], &plans))
        .await
        .unwrap_err();

    match err {
        PermissionError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors.errors()[0].location, "header.age");
            assert_eq!(errors.errors()[0].kind, ValidationErrorKind::Missing);
        }
        other => panic!("expected validation error, got: {other:?}"),
    }
}

#[tokio::test]
async fn lazy_without_validation_in_skip_set_still_fails() {
    let plans = Arc::new(PlanCache::new(16));
    let p = age_over_18().lazy(SkipOn::error::<StoreDown>());

    let err = p.authorize(&mut request(&[], &plans)).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn lazy_skip_is_neutral_in_and() {
    let plans = Arc::new(PlanCache::new(16));
    let always = permission([], |_| async { Ok(true) });
    let p = &always & &age_over_18().lazy(SkipOn::validation());

    let result = p.authorize(&mut request(&[], &plans)).await.unwrap();
    assert_eq!(result, CheckResult::Pass);
}

// ── skip on check errors ──

#[tokio::test]
async fn check_error_class_becomes_skip() {
    let plans = Arc::new(PlanCache::new(16));
    let flaky = permission([], |_| async {
        Err::<bool, _>(CheckError::Other(anyhow::Error::new(StoreDown)))
    });

    let skipped = flaky.lazy(SkipOn::error::<StoreDown>());
    let result = skipped.authorize(&mut request(&[], &plans)).await.unwrap();
    assert!(result.is_skipped());

    let strict = flaky.lazy(SkipOn::validation());
    let err = strict.authorize(&mut request(&[], &plans)).await.unwrap_err();
    assert!(matches!(err, PermissionError::Check(_)));
}

// ── deferred solving ──

#[tokio::test]
async fn lazy_inputs_are_not_solved_when_short_circuited() {
    let plans = Arc::new(PlanCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));
    let expensive = Dep::new("expensive", Counting { calls: Arc::clone(&calls) });

    let always = permission([], |_| async { Ok(true) });
    let p = &always | &reads(&expensive).lazy(SkipOn::validation());

    p.authorize(&mut request(&[], &plans)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let eager = &always | &reads(&expensive);
    eager.authorize(&mut request(&[], &plans)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lazy_and_eager_share_the_request_cache() {
    let plans = Arc::new(PlanCache::new(16));
    let calls = Arc::new(AtomicUsize::new(0));
    let shared = Dep::new("shared", Counting { calls: Arc::clone(&calls) });

    let p = reads(&shared) & reads(&shared).lazy(SkipOn::validation());
    let mut cx = request(&[], &plans);
    assert_eq!(p.authorize(&mut cx).await.unwrap(), CheckResult::Pass);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cx.cache().contains(shared.id()));
}

// ── plan cache ──

#[tokio::test]
async fn lazy_plans_are_cached_per_route() {
    let plans = Arc::new(PlanCache::new(16));
    let inner = age_over_18();
    let p = inner.lazy(SkipOn::validation());

    for _ in 0..3 {
        p.authorize(&mut request(&[("age", "30")], &plans)).await.unwrap();
    }

    assert_eq!(plans.len(), 2);
    assert!(plans.contains("/lazy", p.id()));
    assert!(plans.contains("/lazy", inner.id()));
}
