//! OpenID Connect: provider discovery and the Authorization Code flow.

pub mod discovery;
pub mod flow;

pub use discovery::Discovery;
pub use flow::OidcClient;
