//! Per-request glue: cookie → session → access decision.
//!
//! Every path the gateway does not own lands in [`dispatch`]: requests with
//! a live access map are forwarded, everything else is bounced into the
//! authorization flow. [`callback`] finishes that flow and routes the user
//! back to wherever they were originally headed.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};
use url::Url;

use super::{AppState, proxy};
use crate::store::{self, KeyValueStore, keys};
use crate::{Error, Result, session};

/// Catch-all request handler: authorize and forward, or start the flow
pub async fn dispatch(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    let Some(url) = request_url(&req) else {
        warn!("request without a usable Host header");
        return error_response(400);
    };

    let Some(cookie) = cookie_value(req.headers()) else {
        // First contact: mint a cookie and send the browser to the provider.
        let cookie = session::new_cookie_value();
        let session = session::derive(&cookie, state.policy.version());
        return redirect_to_provider(&state, &session, &url, Some(&cookie)).await;
    };

    let session = session::derive(&cookie, state.policy.version());

    let access_map = match state.store.get(&keys::access(&session)).await {
        Ok(map) => map,
        Err(e) => {
            error!(session = %session, error = %e, "store lookup failed");
            return error_response(502);
        }
    };

    let Some(access_map) = access_map else {
        // Cookie without a cached access map: not authenticated under the
        // current policy version (possibly a stale pre-policy-change map
        // key). Re-authenticate.
        return redirect_to_provider(&state, &session, &url, None).await;
    };

    if !state.policy.can_access(&url, &access_map) {
        info!(session = %session, url = %url, "access denied");
        return error_response(Error::AccessDenied.status());
    }

    match proxy::forward(&state.http, &state.policy, &url, req).await {
        Ok(response) => response,
        Err(e) => {
            error!(session = %session, url = %url, family = e.family(), error = %e, "forwarding failed");
            error_response(e.status())
        }
    }
}

/// `GET /__idproxy/callback`: finish an authentication attempt
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let Some(cookie) = cookie_value(&headers) else {
        warn!("callback without a session cookie");
        return error_response(400);
    };

    let session = session::derive(&cookie, state.policy.version());

    match finish_authentication(&state, &session, &params).await {
        Ok(original_url) => {
            info!(session = %session, "authentication complete");
            redirect(&original_url)
        }
        Err(e) => {
            warn!(session = %session, family = e.family(), error = %e, "callback rejected");
            error_response(e.status())
        }
    }
}

/// Validate the callback, cache the access map, and recover the original
/// URL saved when the flow began.
async fn finish_authentication(
    state: &AppState,
    session: &str,
    params: &HashMap<String, String>,
) -> Result<String> {
    let payload = state.oidc.handle_callback(session, params).await?;

    let access_map = state.policy.access_map(&payload.roles);
    state
        .store
        .set(&keys::access(session), &access_map, store::ACCESS_TTL)
        .await?;
    info!(session = %session, access_map = %access_map, "access map cached");

    // handle_callback already required the state parameter
    let auth_state = params.get("state").ok_or(Error::MissingState)?;
    state
        .store
        .get(&keys::redirect(auth_state))
        .await?
        .ok_or(Error::MissingOriginalUrl)
}

/// Start an authentication attempt and 302 the browser to the provider,
/// setting the session cookie when one was just minted
async fn redirect_to_provider(
    state: &AppState,
    session: &str,
    original_url: &Url,
    new_cookie: Option<&str>,
) -> Response {
    let (provider_url, auth_state) = match state.oidc.begin_authentication(session).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(session = %session, family = e.family(), error = %e, "cannot start authentication");
            return error_response(502);
        }
    };

    if let Err(e) = state
        .store
        .set(
            &keys::redirect(&auth_state),
            original_url.as_str(),
            store::REDIRECT_TTL,
        )
        .await
    {
        error!(session = %session, error = %e, "cannot save original URL");
        return error_response(502);
    }

    let mut response = redirect(&provider_url);
    if let Some(cookie) = new_cookie {
        if let Ok(value) = HeaderValue::from_str(&session::set_cookie_header(cookie)) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

/// `302 Found` with a Location header
fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => error_response(502),
    }
}

/// Generic client-facing responses; detail stays in the log
fn error_response(status: u16) -> Response {
    let (status, body) = match status {
        400 => (StatusCode::BAD_REQUEST, "bad request"),
        401 => (StatusCode::UNAUTHORIZED, "authentication failed"),
        403 => (StatusCode::FORBIDDEN, "forbidden"),
        _ => (StatusCode::BAD_GATEWAY, "bad gateway"),
    };
    (status, body).into_response()
}

/// Reconstruct the URL the client asked for from Host + path. Scheme comes
/// from `X-Forwarded-Proto` when a TLS terminator set it, defaulting to
/// https (the cookie is Secure-only anyway).
fn request_url(req: &Request<Body>) -> Option<Url> {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())?;

    let scheme = req
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");

    let path_and_query = req
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str());

    Url::parse(&format!("{scheme}://{host}{path_and_query}")).ok()
}

/// Extract the gateway cookie from a Cookie header
fn cookie_value(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;

    raw.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == session::COOKIE_NAME).then(|| value.to_string())
    })
}
