// Library exports for orderflow-engine

pub mod config; // Configuration management
pub mod error;
pub mod orderflow; // Analytics core: metrics, patterns, behaviors, levels, cycle
pub mod service; // Per-ticker worker supervisor
pub mod storage; // Quote and analytics persistence

pub mod transport; // HTTP status / ingest API
