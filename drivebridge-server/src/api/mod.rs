//! HTTP API of the exchange endpoint.
//!
//! - `POST /token` - on-behalf-of exchange of a host identity assertion
//! - `GET /health` - liveness check

pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::{ApiError, ApiState};
pub use server::{ServerHandle, router, start_server};
pub use types::*;
