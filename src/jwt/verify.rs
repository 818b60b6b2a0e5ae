//! RS256 signature verification.
//!
//! The signature covers the ASCII bytes `header_b64 + "." + payload_b64`,
//! the segments as they appear on the wire, not the parsed structures. The
//! signature segment itself is URL-safe base64 without padding (unlike the
//! standard-alphabet header/payload segments).

use jsonwebtoken::Algorithm;

use super::{Jwt, jwk::JwkKey, split};
use crate::{Error, Result};

/// Algorithm accepted for ID tokens
pub const ACCEPTED_ALG: &str = "RS256";

/// Verify a compact token's RS256 signature against a published key.
///
/// The algorithm check happens before any key material is touched: a token
/// declaring anything but RS256 is rejected without attempting signature
/// verification.
///
/// # Errors
///
/// - [`Error::InvalidJwtFormat`] when the token does not decode
/// - [`Error::UnsupportedAlgorithm`] when `alg` is not `RS256`
/// - [`Error::JwkKeyDecode`] when the key material is unusable
/// - [`Error::InvalidSignature`] when the signature does not match
pub fn verify(token: &str, key: &JwkKey) -> Result<()> {
    let decoded = Jwt::decode(token)?;

    if decoded.header.alg != ACCEPTED_ALG {
        return Err(Error::UnsupportedAlgorithm(decoded.header.alg));
    }

    let decoding_key = super::jwk::decoding_key(key)?;

    let (header_b64, payload_b64, signature_b64) = split(token)?;
    let signing_input = format!("{header_b64}.{payload_b64}");

    let valid = jsonwebtoken::crypto::verify(
        signature_b64,
        signing_input.as_bytes(),
        &decoding_key,
        Algorithm::RS256,
    )
    .map_err(|_| Error::InvalidSignature)?;

    if valid { Ok(()) } else { Err(Error::InvalidSignature) }
}
