//! Error types for idgate

use std::io;

use thiserror::Error;

/// Result type alias for idgate
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// JWT is not three base64 segments of valid JSON
    #[error("invalid JWT format")]
    InvalidJwtFormat,

    /// Token is signed with anything but RS256
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// JWK modulus/exponent could not be turned into an RSA public key
    #[error("failed to decode JWK signing key")]
    JwkKeyDecode,

    /// RS256 signature does not match the signing input
    #[error("invalid signature")]
    InvalidSignature,

    /// The provider's JWKS must contain exactly one key
    #[error("JWKS must contain exactly one key, got {0}")]
    SingleKeyRequired(usize),

    /// `iss` claim does not match the discovered issuer
    #[error("invalid issuer")]
    InvalidIssuer,

    /// `aud` claim does not match the configured client id
    #[error("invalid audience")]
    InvalidAudience,

    /// `nonce` claim does not match the nonce stored for this attempt
    #[error("invalid nonce")]
    InvalidNonce,

    /// `exp` claim is in the past
    #[error("expired token")]
    ExpiredToken,

    /// `iat` claim is in the future
    #[error("token issued in the future")]
    InvalidIssuedAt,

    /// The provider reported an error on the callback
    #[error("provider error: {0}")]
    Provider(String),

    /// Callback carried no `code` parameter
    #[error("missing code")]
    MissingCode,

    /// Callback carried no `state` parameter
    #[error("missing state")]
    MissingState,

    /// Callback `state` does not match the state stored for this session
    #[error("state mismatch")]
    StateMismatch,

    /// No nonce stored for this session (expired or never issued)
    #[error("nonce not found for session")]
    MissingNonce,

    /// Token endpoint returned no plausible `id_token`
    #[error("invalid token endpoint response")]
    TokenEndpointResponse,

    /// ID-token validation failed (detail goes to the log only)
    #[error("id_token validation failed")]
    InvalidIdToken,

    /// No original URL saved for this state (stale or forged callback)
    #[error("no saved URL for state")]
    MissingOriginalUrl,

    /// No configured site matches the requested URL
    #[error("no site matches the requested URL")]
    SiteNotFound,

    /// The session's access map does not cover the requested site
    #[error("access denied")]
    AccessDenied,

    /// Configuration error (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider discovery error (fatal at startup)
    #[error("discovery error: {0}")]
    Discovery(String),

    /// Key-value store error
    #[error("store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Error family, used for logging and for picking the client-facing
    /// response. Cryptographic and claim failures are indistinguishable to
    /// the client.
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::InvalidJwtFormat => "format",
            Self::UnsupportedAlgorithm(_) | Self::JwkKeyDecode | Self::InvalidSignature => {
                "crypto"
            }
            Self::SingleKeyRequired(_)
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::InvalidNonce
            | Self::ExpiredToken
            | Self::InvalidIssuedAt => "claim",
            Self::Provider(_)
            | Self::MissingCode
            | Self::MissingState
            | Self::StateMismatch
            | Self::MissingNonce
            | Self::TokenEndpointResponse
            | Self::InvalidIdToken
            | Self::MissingOriginalUrl => "flow",
            Self::SiteNotFound | Self::AccessDenied => "policy",
            Self::Config(_) | Self::Discovery(_) => "config",
            Self::Store(_) | Self::Io(_) | Self::Json(_) | Self::Http(_) => "internal",
        }
    }

    /// HTTP status surfaced to the client. Detail never leaves the log:
    /// crypto/claim failures collapse into a generic authentication failure,
    /// policy failures into a generic 403, flow failures into a generic 400.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self.family() {
            "format" | "crypto" | "claim" => 401,
            "policy" => 403,
            "flow" => 400,
            _ => 502,
        }
    }
}
