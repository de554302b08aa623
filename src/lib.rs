//! # idbridge (electronic identification to membership login)
//!
//! `idbridge` lets a user prove their identity with an electronic-identification
//! provider (a signed-challenge service reached through a broker API) and, once the
//! identity is confirmed, logs the matching account into a membership backend.
//!
//! ## Authentication flow
//!
//! A [`flow::Flow`] owns one authentication attempt:
//!
//! 1. A transaction is started with the ID provider ([`provider`]).
//! 2. While the transaction is pending, its status is polled every two seconds and
//!    the visual challenge (QR image) is refreshed on its own two-second cadence
//!    ([`challenge`]). Mobile user agents are sent to the provider app through a
//!    deep link instead ([`device`]).
//! 3. A completed transaction yields an identity that is checked against, and then
//!    logged into, the membership backend ([`membership`]).
//! 4. The embedding host page receives exactly one outcome message ([`notify`]).
//!
//! ## Surfaces
//!
//! The `idbridge` binary can run a single attempt from a terminal
//! (`idbridge authenticate`) or host attempts for browsers over HTTP
//! (`idbridge serve`, see [`api`]).

pub mod api;
pub mod challenge;
pub mod cli;
pub mod device;
pub mod error;
pub mod flow;
pub mod membership;
pub mod notify;
pub mod provider;

use std::{future::Future, pin::Pin};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Boxed future returned by the service seams so they stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
