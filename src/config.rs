//! Configuration for the tree sync client.
//!
//! # Example
//!
//! ```
//! use tree_sync::ClientConfig;
//!
//! // Minimal config (uses defaults)
//! let config = ClientConfig::default();
//! assert_eq!(config.endpoint().unwrap(), "ws://localhost:8080/ws");
//!
//! // Full config
//! let config = ClientConfig {
//!     host: "broker.example.com".into(),
//!     port: 443,
//!     secure: true,
//!     ..Default::default()
//! };
//! assert_eq!(config.endpoint().unwrap(), "wss://broker.example.com:443/ws");
//! ```

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid host '{0}': must be non-empty and contain no '/', ':' or whitespace")]
    InvalidHost(String),
    #[error("invalid endpoint path '{0}': must start with '/'")]
    InvalidPath(String),
}

/// Configuration for a tree sync session.
///
/// All fields have sensible defaults. At minimum you should configure
/// `host` and `port` to point at the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Server host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Use `wss://` instead of `ws://`. Set this when the embedding context
    /// is itself served over a secure transport.
    #[serde(default)]
    pub secure: bool,

    /// Endpoint path on the server (default: "/ws")
    #[serde(default = "default_path")]
    pub path: String,

    /// Ask the server to suppress duplicate notifications for unchanged
    /// values on every subscription.
    #[serde(default = "default_unique")]
    pub unique: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_path() -> String {
    "/ws".to_string()
}
fn default_unique() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            path: default_path(),
            unique: default_unique(),
        }
    }
}

impl ClientConfig {
    /// Build the WebSocket endpoint URL.
    ///
    /// The scheme is the secure variant iff [`ClientConfig::secure`] is set.
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        if self.host.is_empty()
            || self
                .host
                .contains(|c: char| c == '/' || c == ':' || c.is_whitespace())
        {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        if !self.path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.path.clone()));
        }
        let scheme = if self.secure { "wss" } else { "ws" };
        Ok(format!("{}://{}:{}{}", scheme, self.host, self.port, self.path))
    }
}
