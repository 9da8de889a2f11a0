//! Permission inputs backed by axum extractors.

use std::any::type_name;
use std::fmt::Display;
use std::marker::PhantomData;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use modkit_permissions::{Dep, Provide, RequestContext, ValidationError};

fn short_type_name<T>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

struct Extractor<E>(PhantomData<fn() -> E>);

#[async_trait]
impl<E> Provide for Extractor<E>
where
    E: FromRequestParts<()> + Send + Sync + 'static,
    E::Rejection: Display,
{
    type Output = E;

    async fn provide(&self, cx: &RequestContext) -> Result<E, ValidationError> {
        let mut parts = cx.parts().clone();
        E::from_request_parts(&mut parts, &())
            .await
            .map_err(|rejection| ValidationError::invalid(short_type_name::<E>(), rejection.to_string()))
    }
}

/// Input solved by running the extractor `E` on the request head.
///
/// A rejection is reported as an invalid input located at the extractor's
/// type name, so it answers 422 eagerly and can be skipped lazily.
#[must_use]
pub fn extract<E>() -> Dep<E>
where
    E: FromRequestParts<()> + Send + Sync + 'static,
    E::Rejection: Display,
{
    Dep::new(short_type_name::<E>(), Extractor(PhantomData))
}

/// Input read from the request extensions, e.g. a security context inserted
/// by an upstream authentication middleware.
#[must_use]
pub fn extension<T>() -> Dep<T>
where
    T: Clone + Send + Sync + 'static,
{
    let location = format!("extension.{}", short_type_name::<T>());
    Dep::from_fn(location.clone(), move |cx| {
        cx.parts()
            .extensions
            .get::<T>()
            .cloned()
            .ok_or_else(|| ValidationError::missing(location.clone()))
    })
}
