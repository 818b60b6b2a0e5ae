//! The gateway itself: router, shared state, and the serve loop.
//!
//! Two surfaces: the fixed callback route the provider redirects back to,
//! and a fallback that owns every other path, either authorize-and-forward
//! or bounce to the provider.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::oidc::{Discovery, OidcClient};
use crate::policy::PolicyEngine;
use crate::store::KeyValueStore;
use crate::{Error, Result};

pub mod handler;
pub mod proxy;

/// Path the provider redirects back to after authentication
pub const CALLBACK_PATH: &str = "/__idproxy/callback";

/// Shared per-process state, immutable after startup
pub struct AppState {
    /// Site policy
    pub policy: Arc<PolicyEngine>,
    /// OIDC client for the discovered provider
    pub oidc: OidcClient,
    /// Cross-request state
    pub store: Arc<dyn KeyValueStore>,
    /// Shared outbound HTTP client (backend forwarding)
    pub http: reqwest::Client,
}

/// The assembled gateway
pub struct Gateway {
    config: Config,
    state: Arc<AppState>,
}

impl Gateway {
    /// Wire up the gateway from its startup-time pieces
    #[must_use]
    pub fn new(
        config: Config,
        policy: Arc<PolicyEngine>,
        discovery: Arc<Discovery>,
        store: Arc<dyn KeyValueStore>,
        http: reqwest::Client,
    ) -> Self {
        let oidc = OidcClient::new(
            http.clone(),
            discovery,
            Arc::clone(&store),
            config.oidc.client_id.clone(),
            config.oidc.resolve_client_secret(),
            config.server.redirect_uri(),
        );

        let state = Arc::new(AppState {
            policy,
            oidc,
            store,
            http,
        });

        Self { config, state }
    }

    /// Build the router
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Bind and serve until shutdown
    pub async fn serve(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;

        info!(
            host = %self.config.server.host,
            port = %self.config.server.port,
            sites = self.state.policy.len(),
            policy_version = %self.state.policy.version(),
            "Listening"
        );

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(Error::Io)?;

        Ok(())
    }
}

/// Router: the callback route plus a catch-all that authorizes and proxies
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handler::callback))
        .fallback(handler::dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
