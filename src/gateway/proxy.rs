//! Backend forwarding.
//!
//! Rebuilds the inbound request against the matched site's backend base URL
//! and streams the backend's response straight back. Hop-by-hop headers are
//! stripped in both directions; the Host header is preserved unless the site
//! asks for it to be disguised as the backend's own host.

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, header};
use bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::policy::PolicyEngine;
use crate::{Error, Result};

/// Headers that belong to one hop, never forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forward a request to the backend of the site matching `url`.
///
/// # Errors
///
/// [`Error::SiteNotFound`] when no site matches (the caller has normally
/// already authorized the URL), [`Error::Config`] when the configured
/// backend URL does not parse, [`Error::Http`] for transport failures.
pub async fn forward(
    http: &reqwest::Client,
    policy: &PolicyEngine,
    url: &Url,
    req: Request<Body>,
) -> Result<Response<Body>> {
    let (index, site) = policy.find_site(url).ok_or(Error::SiteNotFound)?;
    let target = build_target(&site.backend, url)?;

    debug!(site = index, target = %target, "forwarding");

    let method = req.method().clone();
    let original_host = req.headers().get(header::HOST).cloned();
    let mut headers = req.headers().clone();
    strip_hop_by_hop(&mut headers);

    if site.disguise_host_header {
        // Let the client fill Host in from the target URL
        headers.remove(header::HOST);
    } else if let Some(host) = original_host {
        headers.insert(header::HOST, host);
    }

    let body: Bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    let backend_response = http
        .request(method, target)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = backend_response.status();
    let mut response_headers = backend_response.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let mut response = Response::new(Body::from_stream(backend_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;

    Ok(response)
}

/// Backend base URL + original path and query
fn build_target(backend: &str, url: &Url) -> Result<Url> {
    let mut target = Url::parse(backend)
        .map_err(|e| Error::Config(format!("invalid backend URL {backend}: {e}")))?;
    target.set_path(url.path());
    target.set_query(url.query());
    Ok(target)
}

/// Remove hop-by-hop headers in place
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
