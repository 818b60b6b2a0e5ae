//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Identity-aware reverse proxy - OIDC login wall with per-site role policy
#[derive(Parser, Debug)]
#[command(name = "idgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "IDGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the sites policy document (overrides the config file)
    #[arg(short, long, env = "IDGATE_SITES")]
    pub sites: Option<PathBuf>,

    /// Host to bind to (overrides the config file)
    #[arg(long, env = "IDGATE_HOST")]
    pub host: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "IDGATE_PORT")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "IDGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "IDGATE_LOG_FORMAT")]
    pub log_format: Option<String>,
}
