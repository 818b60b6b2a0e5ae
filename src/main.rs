//! idgate: identity-aware reverse proxy.
//!
//! Startup is fail-fast: an unreadable config, an unparsable sites document,
//! or an undiscoverable provider aborts the process. There is no
//! partial-policy mode.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::error;

use idgate::{
    Result, cli::Cli, config::Config, gateway::Gateway, oidc::Discovery, policy::PolicyEngine,
    setup_tracing, store::MemoryStore,
};

/// Timeout for every outbound call (discovery, token exchange, forwarding)
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(family = e.family(), "startup failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    // CLI flags override the config file
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let sites_path = cli
        .sites
        .as_deref()
        .unwrap_or_else(|| Path::new(&config.policy.file))
        .to_path_buf();
    let policy = Arc::new(PolicyEngine::from_file(&sites_path)?);

    let http = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(idgate::Error::Http)?;

    let discovery = Arc::new(Discovery::fetch(&http, &config.oidc.issuer).await?);

    let store = Arc::new(MemoryStore::new());

    Gateway::new(config, policy, discovery, store, http)
        .serve()
        .await
}
