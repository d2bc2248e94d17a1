//! Configuration Management
//!
//! Environment-driven settings for the engine and its HTTP surface.

pub mod engine;

#[cfg(feature = "http_status")]
pub mod http;

// Re-export
pub use engine::EngineConfig;

#[cfg(feature = "http_status")]
pub use http::HttpConfig;
