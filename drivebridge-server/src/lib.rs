//! Drivebridge Server Library
//!
//! The backend exchange endpoint: trades a host identity assertion for a
//! resource token through the on-behalf-of flow. Exposed as a library for
//! testing and for embedding the router in another service.

pub mod api;
pub mod config;

pub use api::{ApiError, ApiState, ServerHandle, router, start_server};
pub use config::{ServerConfig, load_config};
