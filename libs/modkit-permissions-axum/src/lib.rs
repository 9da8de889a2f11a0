#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]
//! Axum glue for `modkit-permissions`.
//!
//! [`enforce`] runs a [`PermissionGuard`]'s permission before the handler.
//! Every authorization error is rendered by
//! [`PermissionRejection`]; [`extract`] and [`extension`] turn axum
//! extractors and request extensions into permission inputs.

pub mod config;
pub mod extract;
pub mod guard;
pub mod response;

pub use config::GuardConfig;
pub use extract::{extension, extract};
pub use guard::{Authorized, PermissionGuard, enforce};
pub use response::PermissionRejection;
