//! JSON Web Key material.
//!
//! The provider publishes its RSA public key as a JWKS whose `n`/`e` members
//! are URL-safe base64 (no padding) big-endian unsigned integers. Only the
//! single-key case is supported; enforcing that is the claim-validation
//! layer's job so it can reject the whole key set, not one key.

use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A published key set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// Keys in publication order
    #[serde(default)]
    pub keys: Vec<JwkKey>,
}

/// One published key. Unknown members are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkKey {
    /// Modulus, URL-safe base64, big-endian
    #[serde(default)]
    pub n: String,
    /// Key type, nominally `RSA`
    #[serde(default)]
    pub kty: String,
    /// Intended algorithm
    #[serde(default)]
    pub alg: String,
    /// Key identifier
    #[serde(default)]
    pub kid: String,
    /// Public exponent, URL-safe base64, big-endian
    #[serde(default)]
    pub e: String,
    /// Intended use, nominally `sig`
    #[serde(default, rename = "use")]
    pub key_use: String,
}

/// Build an RS256 decoding key from a JWK's modulus and exponent
///
/// # Errors
///
/// [`Error::JwkKeyDecode`] when `n` or `e` is not valid URL-safe base64 or
/// does not form a usable RSA public key.
pub fn decoding_key(key: &JwkKey) -> Result<DecodingKey> {
    DecodingKey::from_rsa_components(&key.n, &key.e).map_err(|_| Error::JwkKeyDecode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwks_parses_provider_shape() {
        let jwks: JwkSet = serde_json::from_str(
            r#"{"keys":[{"kty":"RSA","use":"sig","kid":"k1","alg":"RS256","n":"AQAB","e":"AQAB","x5c":["ignored"]}]}"#,
        )
        .unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, "k1");
        assert_eq!(jwks.keys[0].key_use, "sig");
    }

    #[test]
    fn empty_key_set_parses() {
        let jwks: JwkSet = serde_json::from_str(r#"{"keys":[]}"#).unwrap();
        assert!(jwks.keys.is_empty());
    }

    #[test]
    fn malformed_modulus_is_a_key_decode_error() {
        let key = JwkKey {
            n: "not!base64".to_string(),
            e: "AQAB".to_string(),
            ..JwkKey::default()
        };
        assert!(matches!(decoding_key(&key), Err(Error::JwkKeyDecode)));
    }

    #[test]
    fn standard_alphabet_modulus_rejected() {
        // n/e are URL-safe base64; '+' and '/' belong to the standard
        // alphabet and must not be accepted here.
        let key = JwkKey {
            n: "ab+/cd".to_string(),
            e: "AQAB".to_string(),
            ..JwkKey::default()
        };
        assert!(matches!(decoding_key(&key), Err(Error::JwkKeyDecode)));
    }
}
