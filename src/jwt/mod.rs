//! Compact JWT codec.
//!
//! Decodes the three-segment `header.payload.signature` format the reference
//! provider emits. Note the alphabet split: header and payload are base64
//! with the *standard* alphabet and no padding, while the signature segment
//! (handled in [`verify`]) uses the URL-safe alphabet. Both must be decoded
//! exactly as issued to stay bit-compatible with live tokens; do not
//! normalize to a single alphabet.

use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub mod jwk;
#[cfg(test)]
pub(crate) mod test_fixtures;
pub mod verify;

/// JWT header
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Header {
    /// Token type, nominally `JWT`
    #[serde(default)]
    pub typ: String,
    /// Signing algorithm; only `RS256` is accepted downstream
    #[serde(default)]
    pub alg: String,
}

/// JWT claims. Missing numeric claims default to zero, i.e. an absent `exp`
/// reads as already expired and an absent `iat` as issued at the epoch.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payload {
    /// Issuer
    #[serde(default)]
    pub iss: String,
    /// Subject
    #[serde(default)]
    pub sub: String,
    /// Audience
    #[serde(default)]
    pub aud: String,
    /// Expiry, seconds since epoch
    #[serde(default)]
    pub exp: u64,
    /// Issued-at, seconds since epoch
    #[serde(default)]
    pub iat: u64,
    /// Per-attempt nonce echoed back by the provider
    #[serde(default)]
    pub nonce: String,

    /// Custom claim: roles granted to the subject
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A decoded token. Immutable; lives only for the duration of one
/// verification.
#[derive(Debug, Clone)]
pub struct Jwt {
    /// Decoded header
    pub header: Header,
    /// Decoded claims
    pub payload: Payload,
}

impl Jwt {
    /// Decode a compact token's header and payload. The signature segment is
    /// left untouched here; see [`verify::verify`].
    ///
    /// # Errors
    ///
    /// [`Error::InvalidJwtFormat`] when the token is not exactly three
    /// segments, a segment is not valid base64, or a segment is not the
    /// expected JSON.
    pub fn decode(token: &str) -> Result<Self> {
        let (header_b64, payload_b64, _) = split(token)?;

        let header_bytes = STANDARD_NO_PAD
            .decode(header_b64)
            .map_err(|_| Error::InvalidJwtFormat)?;
        let payload_bytes = STANDARD_NO_PAD
            .decode(payload_b64)
            .map_err(|_| Error::InvalidJwtFormat)?;

        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| Error::InvalidJwtFormat)?;
        let payload: Payload =
            serde_json::from_slice(&payload_bytes).map_err(|_| Error::InvalidJwtFormat)?;

        Ok(Self { header, payload })
    }
}

/// Split a compact token into its three segments
pub(crate) fn split(token: &str) -> Result<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => Ok((h, p, s)),
        _ => Err(Error::InvalidJwtFormat),
    }
}
