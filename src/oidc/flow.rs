//! The Authorization Code flow.
//!
//! One authentication attempt walks redirect → callback → code exchange →
//! claim validation. The per-attempt `state` and `nonce` live in the
//! key-value store under the session key with a 10-minute TTL; `state` is
//! the CSRF binding between redirect and callback, `nonce` the binding
//! between the attempt and the ID token it produces.
//!
//! The nonce is consumed (read, then deleted) on the first callback that
//! reaches it. The pair is not atomic (the store contract is single-key
//! only), so two callbacks racing on one session can both observe the nonce
//! before either delete lands. Accepted, documented gap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngExt;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::Url;

use super::Discovery;
use crate::jwt::{Jwt, Payload, verify};
use crate::store::{self, KeyValueStore, keys};
use crate::{Error, Result};

/// Token endpoint response; everything but `id_token` is ignored
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: String,
}

/// OIDC client driving the Authorization Code flow against one provider
pub struct OidcClient {
    http: reqwest::Client,
    discovery: Arc<Discovery>,
    store: Arc<dyn KeyValueStore>,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OidcClient {
    /// Create a client for the discovered provider
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        discovery: Arc<Discovery>,
        store: Arc<dyn KeyValueStore>,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Self {
        Self {
            http,
            discovery,
            store,
            client_id,
            client_secret,
            redirect_uri,
        }
    }

    /// Start an authentication attempt for `session`.
    ///
    /// Generates fresh independent `state` and `nonce` values, persists them
    /// under the session (600 s), and returns the provider authorization URL
    /// together with the state. The caller saves the originally requested
    /// URL under `REDIRECT:<state>` so the callback can route back.
    pub async fn begin_authentication(&self, session: &str) -> Result<(String, String)> {
        let state = random_token();
        let nonce = random_token();

        let mut auth_url = Url::parse(&self.discovery.metadata.authorization_endpoint)
            .map_err(|e| Error::Discovery(format!("invalid authorization endpoint: {e}")))?;
        auth_url
            .query_pairs_mut()
            .append_pair("scope", "openid")
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("state", &state)
            .append_pair("nonce", &nonce);

        self.store
            .set(&keys::state(session), &state, store::STATE_TTL)
            .await?;
        self.store
            .set(&keys::nonce(session), &nonce, store::NONCE_TTL)
            .await?;

        debug!(session = %session, "authentication attempt started");

        Ok((auth_url.into(), state))
    }

    /// Validate a provider callback for `session` and exchange its code for
    /// verified ID-token claims.
    ///
    /// # Errors
    ///
    /// - [`Error::Provider`] when the provider reported an error outright
    /// - [`Error::MissingCode`] / [`Error::MissingState`] on an incomplete
    ///   callback
    /// - [`Error::StateMismatch`] when the callback state is absent from the
    ///   store or differs from the supplied one (CSRF defense)
    /// - [`Error::MissingNonce`] when no nonce survives for the session
    /// - [`Error::TokenEndpointResponse`] when the code exchange yields no
    ///   plausible `id_token`
    /// - [`Error::InvalidIdToken`] for any claim or signature failure
    ///   (detail is logged, never surfaced)
    pub async fn handle_callback(
        &self,
        session: &str,
        query: &HashMap<String, String>,
    ) -> Result<Payload> {
        if let Some(provider_error) = query.get("error") {
            return Err(Error::Provider(provider_error.clone()));
        }

        let code = query.get("code").ok_or(Error::MissingCode)?;
        let state = query.get("state").ok_or(Error::MissingState)?;

        let saved_state = self
            .store
            .get(&keys::state(session))
            .await?
            .ok_or(Error::StateMismatch)?;
        if !constant_time_eq(&saved_state, state) {
            warn!(session = %session, "callback state does not match stored state");
            return Err(Error::StateMismatch);
        }

        let nonce = self
            .store
            .get(&keys::nonce(session))
            .await?
            .ok_or(Error::MissingNonce)?;
        // Single use: drop the nonce right after the read, whatever happens
        // next. A concurrent callback may still have read it first (no
        // atomic consume in the store contract).
        if let Err(e) = self.store.del(&keys::nonce(session)).await {
            warn!(session = %session, error = %e, "failed to delete nonce");
        }

        let id_token = self.token_request(code).await?;

        self.validate_id_token(&id_token, &nonce).map_err(|e| {
            warn!(session = %session, family = e.family(), error = %e, "id_token rejected");
            Error::InvalidIdToken
        })
    }

    /// Validate an ID token against the discovered provider and this
    /// attempt's nonce, returning its claims.
    ///
    /// # Errors
    ///
    /// Signature errors per [`verify::verify`]; claim errors
    /// ([`Error::SingleKeyRequired`], [`Error::InvalidIssuer`],
    /// [`Error::InvalidAudience`], [`Error::InvalidNonce`],
    /// [`Error::ExpiredToken`], [`Error::InvalidIssuedAt`]) in that order.
    pub fn validate_id_token(&self, id_token: &str, nonce: &str) -> Result<Payload> {
        let jwks = &self.discovery.jwks;
        if jwks.keys.len() != 1 {
            return Err(Error::SingleKeyRequired(jwks.keys.len()));
        }

        verify::verify(id_token, &jwks.keys[0])?;

        let payload = Jwt::decode(id_token)?.payload;

        if payload.iss != self.discovery.metadata.issuer {
            return Err(Error::InvalidIssuer);
        }
        if payload.aud != self.client_id {
            return Err(Error::InvalidAudience);
        }
        if !constant_time_eq(&payload.nonce, nonce) {
            return Err(Error::InvalidNonce);
        }

        check_timestamps(unix_now(), payload.exp, payload.iat)?;

        Ok(payload)
    }

    /// Exchange an authorization code at the token endpoint
    async fn token_request(&self, code: &str) -> Result<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&self.discovery.metadata.token_endpoint)
            .form(&params)
            .send()
            .await?;

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|_| Error::TokenEndpointResponse)?;

        // An id_token this short cannot be three JWT segments; treat the
        // response as malformed rather than letting it fail deeper down.
        if token_response.id_token.len() <= 5 {
            return Err(Error::TokenEndpointResponse);
        }

        Ok(token_response.id_token)
    }
}

/// 16 random bytes as URL-safe unpadded base64
fn random_token() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Constant-time string equality (length leaks, contents do not)
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Reject tokens outside their validity window. `now > exp` is expired:
/// a token checked exactly at `exp` is still good, one second later is not.
fn check_timestamps(now: u64, exp: u64, iat: u64) -> Result<()> {
    if now > exp {
        return Err(Error::ExpiredToken);
    }
    if now < iat {
        return Err(Error::InvalidIssuedAt);
    }
    Ok(())
}

/// Seconds since the Unix epoch
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::jwk::{JwkKey, JwkSet};
    use crate::jwt::test_fixtures as fx;
    use crate::oidc::discovery::ProviderMetadata;
    use crate::store::MemoryStore;

    fn fixture_jwks() -> JwkSet {
        JwkSet {
            keys: vec![JwkKey {
                n: fx::JWK_N.to_string(),
                e: fx::JWK_E.to_string(),
                kty: "RSA".to_string(),
                alg: "RS256".to_string(),
                kid: "k1".to_string(),
                key_use: "sig".to_string(),
            }],
        }
    }

    fn discovery_with(jwks: JwkSet) -> Arc<Discovery> {
        Arc::new(Discovery {
            metadata: ProviderMetadata {
                issuer: fx::ISSUER.to_string(),
                authorization_endpoint: format!("{}/authorize", fx::ISSUER),
                token_endpoint: format!("{}/token", fx::ISSUER),
                jwks_uri: format!("{}/jwks", fx::ISSUER),
            },
            jwks,
        })
    }

    fn client(store: Arc<MemoryStore>) -> OidcClient {
        OidcClient::new(
            reqwest::Client::new(),
            discovery_with(fixture_jwks()),
            store,
            fx::CLIENT_ID.to_string(),
            "test-secret".to_string(),
            "https://gate.example.com/__idproxy/callback".to_string(),
        )
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    // ── begin_authentication ──────────────────────────────────────────

    #[tokio::test]
    async fn begin_authentication_builds_url_and_persists_state() {
        let store = Arc::new(MemoryStore::new());
        let oidc = client(Arc::clone(&store));

        let (redirect_url, state) = oidc.begin_authentication("sess-1").await.unwrap();

        let url = Url::parse(&redirect_url).unwrap();
        assert_eq!(url.path(), "/authorize");
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["scope"], "openid");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], fx::CLIENT_ID);
        assert_eq!(
            params["redirect_uri"],
            "https://gate.example.com/__idproxy/callback"
        );
        assert_eq!(params["state"], state);

        // state and nonce are persisted under the session, and differ
        let saved_state = store.get(&keys::state("sess-1")).await.unwrap().unwrap();
        let saved_nonce = store.get(&keys::nonce("sess-1")).await.unwrap().unwrap();
        assert_eq!(saved_state, state);
        assert_eq!(params["nonce"], saved_nonce);
        assert_ne!(saved_state, saved_nonce);
    }

    #[tokio::test]
    async fn consecutive_attempts_use_fresh_state() {
        let store = Arc::new(MemoryStore::new());
        let oidc = client(store);

        let (_, s1) = oidc.begin_authentication("sess-1").await.unwrap();
        let (_, s2) = oidc.begin_authentication("sess-1").await.unwrap();
        assert_ne!(s1, s2);
    }

    // ── handle_callback short-circuits (no token endpoint involved) ───

    #[tokio::test]
    async fn callback_surfaces_provider_error_first() {
        let store = Arc::new(MemoryStore::new());
        let oidc = client(store);

        let err = oidc
            .handle_callback("sess-1", &query(&[("error", "access_denied")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(msg) if msg == "access_denied"));
    }

    #[tokio::test]
    async fn callback_requires_code_then_state() {
        let store = Arc::new(MemoryStore::new());
        let oidc = client(store);

        let err = oidc
            .handle_callback("sess-1", &query(&[("state", "s")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCode));

        let err = oidc
            .handle_callback("sess-1", &query(&[("code", "c")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingState));
    }

    #[tokio::test]
    async fn callback_without_stored_state_is_a_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let oidc = client(store);

        let err = oidc
            .handle_callback("sess-1", &query(&[("code", "c"), ("state", "s")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
    }

    #[tokio::test]
    async fn callback_with_wrong_state_is_a_mismatch() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&keys::state("sess-1"), "expected", store::STATE_TTL)
            .await
            .unwrap();
        let oidc = client(store);

        let err = oidc
            .handle_callback("sess-1", &query(&[("code", "c"), ("state", "forged")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
    }

    #[tokio::test]
    async fn callback_without_nonce_fails() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(&keys::state("sess-1"), "s", store::STATE_TTL)
            .await
            .unwrap();
        let oidc = client(store);

        let err = oidc
            .handle_callback("sess-1", &query(&[("code", "c"), ("state", "s")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingNonce));
    }

    // ── validate_id_token ─────────────────────────────────────────────

    #[tokio::test]
    async fn valid_token_yields_claims() {
        let oidc = client(Arc::new(MemoryStore::new()));
        let payload = oidc
            .validate_id_token(fx::TOKEN_VALID, fx::NONCE)
            .unwrap();
        assert_eq!(payload.sub, "user-1");
        assert_eq!(payload.roles, vec!["admin"]);
    }

    #[tokio::test]
    async fn token_without_roles_claim_yields_no_roles() {
        let oidc = client(Arc::new(MemoryStore::new()));
        let payload = oidc
            .validate_id_token(fx::TOKEN_NO_ROLES, fx::NONCE)
            .unwrap();
        assert!(payload.roles.is_empty());
    }

    #[tokio::test]
    async fn empty_jwks_rejected() {
        let oidc = OidcClient::new(
            reqwest::Client::new(),
            discovery_with(JwkSet::default()),
            Arc::new(MemoryStore::new()),
            fx::CLIENT_ID.to_string(),
            "test-secret".to_string(),
            String::new(),
        );
        assert!(matches!(
            oidc.validate_id_token(fx::TOKEN_VALID, fx::NONCE),
            Err(Error::SingleKeyRequired(0))
        ));
    }

    #[tokio::test]
    async fn multi_key_jwks_rejected() {
        let mut jwks = fixture_jwks();
        jwks.keys.push(jwks.keys[0].clone());
        let oidc = OidcClient::new(
            reqwest::Client::new(),
            discovery_with(jwks),
            Arc::new(MemoryStore::new()),
            fx::CLIENT_ID.to_string(),
            "test-secret".to_string(),
            String::new(),
        );
        assert!(matches!(
            oidc.validate_id_token(fx::TOKEN_VALID, fx::NONCE),
            Err(Error::SingleKeyRequired(2))
        ));
    }

    #[tokio::test]
    async fn wrong_issuer_rejected() {
        let oidc = client(Arc::new(MemoryStore::new()));
        assert!(matches!(
            oidc.validate_id_token(fx::TOKEN_WRONG_ISS, fx::NONCE),
            Err(Error::InvalidIssuer)
        ));
    }

    #[tokio::test]
    async fn wrong_audience_rejected() {
        let oidc = client(Arc::new(MemoryStore::new()));
        assert!(matches!(
            oidc.validate_id_token(fx::TOKEN_WRONG_AUD, fx::NONCE),
            Err(Error::InvalidAudience)
        ));
    }

    #[tokio::test]
    async fn nonce_mismatch_rejected_despite_valid_signature() {
        let oidc = client(Arc::new(MemoryStore::new()));
        assert!(matches!(
            oidc.validate_id_token(fx::TOKEN_WRONG_NONCE, fx::NONCE),
            Err(Error::InvalidNonce)
        ));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let oidc = client(Arc::new(MemoryStore::new()));
        assert!(matches!(
            oidc.validate_id_token(fx::TOKEN_EXPIRED, fx::NONCE),
            Err(Error::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn future_iat_rejected() {
        let oidc = client(Arc::new(MemoryStore::new()));
        assert!(matches!(
            oidc.validate_id_token(fx::TOKEN_FUTURE_IAT, fx::NONCE),
            Err(Error::InvalidIssuedAt)
        ));
    }

    // ── timestamp window ──────────────────────────────────────────────

    #[test]
    fn expiry_boundary_is_exclusive() {
        // valid exactly at exp, expired one second later
        assert!(check_timestamps(100, 100, 0).is_ok());
        assert!(matches!(
            check_timestamps(101, 100, 0),
            Err(Error::ExpiredToken)
        ));
    }

    #[test]
    fn iat_boundary_is_inclusive() {
        // valid exactly at iat, invalid one second earlier
        assert!(check_timestamps(50, 100, 50).is_ok());
        assert!(matches!(
            check_timestamps(49, 100, 50),
            Err(Error::InvalidIssuedAt)
        ));
    }

    #[test]
    fn missing_exp_reads_as_expired() {
        // decode defaults a missing exp to 0, which fails closed
        assert!(matches!(
            check_timestamps(unix_now(), 0, 0),
            Err(Error::ExpiredToken)
        ));
    }

    // ── helpers ───────────────────────────────────────────────────────

    #[test]
    fn random_tokens_are_unique_and_url_safe() {
        let a = random_token();
        assert_eq!(a.len(), 22);
        assert_ne!(a, random_token());
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
