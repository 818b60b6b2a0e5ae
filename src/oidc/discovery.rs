//! OIDC provider discovery.
//!
//! The provider metadata document and its JWKS are fetched exactly once at
//! startup and cached for the process lifetime; key rotation is out of
//! scope. A provider that cannot be discovered is a fatal startup error,
//! not a degraded mode.

use serde::Deserialize;
use tracing::info;

use crate::jwt::jwk::JwkSet;
use crate::{Error, Result};

/// Provider metadata, the subset of `/.well-known/openid-configuration`
/// the gateway needs
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    /// Issuer URL; ID-token `iss` claims must match it exactly
    #[serde(default)]
    pub issuer: String,
    /// Where unauthenticated users are redirected
    #[serde(default)]
    pub authorization_endpoint: String,
    /// Where authorization codes are exchanged
    #[serde(default)]
    pub token_endpoint: String,
    /// Where the signing keys are published
    #[serde(default)]
    pub jwks_uri: String,
}

/// Discovered provider state, immutable for the process lifetime
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Provider metadata
    pub metadata: ProviderMetadata,
    /// The provider's published signing keys
    pub jwks: JwkSet,
}

impl Discovery {
    /// Fetch the metadata document and JWKS from `issuer`.
    ///
    /// # Errors
    ///
    /// [`Error::Discovery`] when either document cannot be fetched or is
    /// missing a required endpoint. Callers treat this as fatal.
    pub async fn fetch(http: &reqwest::Client, issuer: &str) -> Result<Self> {
        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );

        let response = http
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("failed to fetch provider metadata: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Discovery(format!(
                "provider metadata request failed with status {}",
                response.status()
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("failed to parse provider metadata: {e}")))?;

        for (field, value) in [
            ("issuer", &metadata.issuer),
            ("authorization_endpoint", &metadata.authorization_endpoint),
            ("token_endpoint", &metadata.token_endpoint),
            ("jwks_uri", &metadata.jwks_uri),
        ] {
            if value.is_empty() {
                return Err(Error::Discovery(format!(
                    "provider metadata missing {field}"
                )));
            }
        }

        let jwks: JwkSet = http
            .get(&metadata.jwks_uri)
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("failed to fetch JWKS: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Discovery(format!("failed to parse JWKS: {e}")))?;

        info!(issuer = %metadata.issuer, keys = jwks.keys.len(), "Provider discovered");

        Ok(Self { metadata, jwks })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn metadata_body(server_uri: &str) -> serde_json::Value {
        serde_json::json!({
            "issuer": server_uri,
            "authorization_endpoint": format!("{server_uri}/authorize"),
            "token_endpoint": format!("{server_uri}/token"),
            "jwks_uri": format!("{server_uri}/jwks"),
            "response_types_supported": ["code"],
        })
    }

    #[tokio::test]
    async fn fetch_caches_metadata_and_jwks() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(&uri)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{"kty": "RSA", "use": "sig", "kid": "k1", "n": "AQAB", "e": "AQAB"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let discovery = Discovery::fetch(&http, &uri).await.unwrap();

        assert_eq!(discovery.metadata.issuer, uri);
        assert_eq!(discovery.metadata.token_endpoint, format!("{uri}/token"));
        assert_eq!(discovery.jwks.keys.len(), 1);
    }

    #[tokio::test]
    async fn trailing_slash_issuer_normalized() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(metadata_body(&uri)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"keys": []})),
            )
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let with_slash = format!("{uri}/");
        assert!(Discovery::fetch(&http, &with_slash).await.is_ok());
    }

    #[tokio::test]
    async fn missing_endpoint_is_fatal() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": uri,
                "authorization_endpoint": format!("{uri}/authorize"),
                // token_endpoint absent
                "jwks_uri": format!("{uri}/jwks"),
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = Discovery::fetch(&http, &uri).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
        assert!(err.to_string().contains("token_endpoint"));
    }

    #[tokio::test]
    async fn provider_5xx_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = Discovery::fetch(&http, &server.uri()).await.unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }
}
