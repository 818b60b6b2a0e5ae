//! Configuration management

use std::{env, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// OIDC provider and client configuration
    pub oidc: OidcConfig,
    /// Site policy document location
    pub policy: PolicyConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Externally visible base URL of the gateway, used to build the
    /// OIDC redirect URI
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Callback URL registered with the provider
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/__idproxy/callback", self.public_url.trim_end_matches('/'))
    }
}

/// OIDC provider and client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OidcConfig {
    /// Issuer URL; discovery is fetched from
    /// `<issuer>/.well-known/openid-configuration` at startup
    pub issuer: String,

    /// Client identifier registered with the provider. Also the value the
    /// `aud` claim of incoming ID tokens must carry.
    pub client_id: String,

    /// Client secret (supports `env:VAR_NAME`)
    pub client_secret: String,
}

impl OidcConfig {
    /// Resolve the client secret (expand env vars)
    #[must_use]
    pub fn resolve_client_secret(&self) -> String {
        if let Some(var_name) = self.client_secret.strip_prefix("env:") {
            env::var(var_name).unwrap_or_else(|_| self.client_secret.clone())
        } else {
            self.client_secret.clone()
        }
    }
}

/// Site policy document location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Path to the sites YAML document. The file is digested byte-for-byte,
    /// so it is read raw rather than through the config merge.
    pub file: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            file: "sites.yaml".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or leaves a required field empty.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (IDGATE_ prefix)
        figment = figment.merge(Env::prefixed("IDGATE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the gateway cannot start with. There is no
    /// partial-policy mode; a bad config aborts startup.
    fn validate(&self) -> Result<()> {
        if self.oidc.issuer.is_empty() {
            return Err(Error::Config("oidc.issuer must be set".to_string()));
        }
        if self.oidc.client_id.is_empty() {
            return Err(Error::Config("oidc.client_id must be set".to_string()));
        }
        if self.oidc.client_secret.is_empty() {
            return Err(Error::Config("oidc.client_secret must be set".to_string()));
        }
        Ok(())
    }
}
