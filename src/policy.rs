//! Site policy engine: who may reach which backend.
//!
//! The policy is a YAML document listing sites in significant order: the
//! first site whose host and path prefix match a URL wins. A site's identity
//! is its position in that order, stable for the process lifetime, so an
//! access map is just a list of indices.
//!
//! The raw document text is digested with SHA-256 into the policy version.
//! Session keys are derived from that digest (see [`crate::session`]), so
//! editing the document, even whitespace, silently invalidates every
//! cached access map. That is the cache-busting mechanism, not an accident.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{Error, Result};

/// One reverse-proxy target and the roles allowed to reach it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Host the site is served under (compared against the request host,
    /// including an explicit port when present)
    pub host: String,

    /// Path prefix owned by this site
    pub path_prefix: String,

    /// Roles allowed to reach this site
    #[serde(default)]
    pub roles: Vec<String>,

    /// Backend base URL requests are forwarded to
    pub backend: String,

    /// Rewrite the forwarded Host header to the backend's host
    #[serde(default)]
    pub disguise_host_header: bool,
}

/// Top-level shape of the sites document
#[derive(Debug, Deserialize)]
struct SiteDocument {
    #[serde(default)]
    sites: Vec<Site>,
}

/// Immutable site list plus the digest of the document it was loaded from.
/// Safe to share across requests without locking.
#[derive(Debug)]
pub struct PolicyEngine {
    sites: Vec<Site>,
    version: String,
}

impl PolicyEngine {
    /// Parse a raw sites document. The digest covers `raw` byte-for-byte,
    /// not a re-serialization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the document is not valid YAML of the
    /// expected shape. Fatal at startup; there is no partial-policy mode.
    pub fn from_document(raw: &str) -> Result<Self> {
        let doc: SiteDocument = serde_yaml::from_str(raw)
            .map_err(|e| Error::Config(format!("invalid sites document: {e}")))?;

        let version = hex::encode(Sha256::digest(raw.as_bytes()));

        Ok(Self {
            sites: doc.sites,
            version,
        })
    }

    /// Load the sites document from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read sites document {}: {e}", path.display()))
        })?;
        Self::from_document(&raw)
    }

    /// SHA-256 hex digest of the raw document, stable for process lifetime
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Number of configured sites
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// True when no sites are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Site by index
    #[must_use]
    pub fn site(&self, index: usize) -> Option<&Site> {
        self.sites.get(index)
    }

    /// First site in declaration order whose host equals the URL's host and
    /// whose path prefix prefixes the URL's path. Declaration order is
    /// significant: with overlapping prefixes the earlier site wins.
    #[must_use]
    pub fn find_site(&self, url: &Url) -> Option<(usize, &Site)> {
        let host = host_with_port(url)?;

        self.sites
            .iter()
            .enumerate()
            .find(|(_, site)| site.host == host && url.path().starts_with(&site.path_prefix))
    }

    /// Site indices reachable with the supplied roles, in declaration order.
    /// A site whose role set contains several of the supplied roles is
    /// appended once per matching role; the duplicates are a documented
    /// artifact of the union-by-role computation and are preserved (the map
    /// is only ever membership-tested).
    #[must_use]
    pub fn accessible_sites(&self, roles: &[String]) -> Vec<usize> {
        let mut indices = Vec::new();

        for (i, site) in self.sites.iter().enumerate() {
            for role in roles {
                if site.roles.iter().any(|r| r == role) {
                    indices.push(i);
                }
            }
        }

        indices
    }

    /// Access map for the supplied roles, serialized as a compact JSON
    /// integer list
    #[must_use]
    pub fn access_map(&self, roles: &[String]) -> String {
        // Vec<usize> to JSON cannot fail
        serde_json::to_string(&self.accessible_sites(roles)).unwrap_or_else(|_| "[]".to_string())
    }

    /// Whether the access map permits the URL. False (never a panic) when
    /// no site matches or the map does not parse.
    #[must_use]
    pub fn can_access(&self, url: &Url, access_map: &str) -> bool {
        let Some((index, _)) = self.find_site(url) else {
            tracing::debug!(url = %url, "no site matches the requested URL");
            return false;
        };

        let Ok(map) = serde_json::from_str::<Vec<usize>>(access_map) else {
            tracing::warn!("access map failed to parse");
            return false;
        };

        map.contains(&index)
    }

    /// Backend base URL for the site matching the URL
    #[must_use]
    pub fn backend_for(&self, url: &Url) -> Option<&str> {
        self.find_site(url).map(|(_, site)| site.backend.as_str())
    }
}

/// Request host as matched against site configuration: the URL host, plus
/// `:port` when the URL carries an explicit non-default port.
fn host_with_port(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}
