//! HTTP Server Configuration
//!
//! Bind address for the status, read, and ingest API.

use std::net::SocketAddr;

use crate::error::{EngineError, Result};

/// HTTP server configuration
///
/// ## Environment Variables
///
/// - `HTTP_HOST`: Server bind address (default: 127.0.0.1)
/// - `HTTP_PORT`: Server port (default: 8080)
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Server bind address
    pub addr: SocketAddr,
}

impl HttpConfig {
    /// Load HTTP configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HTTP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("HTTP_PORT").unwrap_or_else(|_| "8080".to_string());
        Self::from_parts(&host, &port)
    }

    pub fn from_parts(host: &str, port: &str) -> Result<Self> {
        let port: u16 = port
            .parse()
            .map_err(|e| EngineError::Config(format!("HTTP_PORT={:?}: {}", port, e)))?;

        let addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| EngineError::Config(format!("HTTP_HOST={:?}: {}", host, e)))?;

        Ok(Self { addr })
    }

    /// Replace the port, keeping the host
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }
}
