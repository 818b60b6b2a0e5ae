//! idgate: identity-aware reverse proxy.
//!
//! Sits in front of one or more backend services, forces unauthenticated
//! clients through an OIDC Authorization Code flow, and authorizes each
//! request against a per-site role policy before forwarding it.
//!
//! # Pieces
//!
//! - [`jwt`]: compact JWT codec, JWK key material, RS256 verification
//! - [`oidc`]: provider discovery and the Authorization Code flow
//! - [`policy`]: the immutable site list and access decisions
//! - [`session`]: cookie ↔ policy-version-bound session keys
//! - [`store`]: TTL'd key-value state shared across requests
//! - [`gateway`]: router, per-request glue, backend forwarding

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jwt;
pub mod oidc;
pub mod policy;
pub mod session;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
