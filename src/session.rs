//! Session identity: binding an opaque cookie to a policy snapshot.
//!
//! The browser holds a random cookie value; the gateway never stores it.
//! Every key-value lookup happens under the derived session key
//! `hex(sha256(cookie + "." + policy_version))`, which also makes the key
//! safe to log. Because the policy version is part of the derivation, a
//! policy edit re-keys every session and orphans all cached access maps.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Name of the gateway's session cookie
pub const COOKIE_NAME: &str = "__idproxy";

/// Cookie lifetime in seconds (24 h)
pub const COOKIE_MAX_AGE_SECS: u64 = 24 * 3600;

/// Mint a fresh cookie value: 16 random bytes, URL-safe base64 without
/// padding
#[must_use]
pub fn new_cookie_value() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Derive the session key for a cookie value under a policy version
#[must_use]
pub fn derive(cookie_value: &str, policy_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cookie_value.as_bytes());
    hasher.update(b".");
    hasher.update(policy_version.as_bytes());
    hex::encode(hasher.finalize())
}

/// `Set-Cookie` header value for a freshly minted session cookie.
/// `SameSite=None` because the OIDC callback arrives as a cross-site
/// navigation from the provider.
#[must_use]
pub fn set_cookie_header(value: &str) -> String {
    format!(
        "{COOKIE_NAME}={value}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; HttpOnly; Secure; SameSite=None"
    )
}
