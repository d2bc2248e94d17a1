//! External transports
//!
//! - HTTP: status, read, and quote ingest API (feature `http_status`)

#[cfg(feature = "http_status")]
pub mod http;
