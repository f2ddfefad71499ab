//! # Drivebridge Core
//!
//! Token acquisition for a cloud-drive viewer that runs either embedded in a
//! host application or on its own.
//!
//! This crate provides:
//! - An explicit [`AuthSession`] holding configuration, the token cache and
//!   the redirect store
//! - The acquisition strategy set behind traits (host bridge, backend
//!   exchange, silent, popup, redirect) with HTTP and OAuth implementations
//! - The [`AcquisitionEngine`], a deterministic decision tree over those
//!   strategies
//! - A resource client for the drive API and a thin presentation adapter
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use drivebridge_core::{AuthConfig, DriveViewer, ViewState, strategy::print_opener};
//!
//! async fn show() -> Result<(), drivebridge_core::DrivebridgeError> {
//!     let viewer = DriveViewer::from_config(AuthConfig::load()?, print_opener())?;
//!     if let ViewState::Ready(entries) = viewer.load().await {
//!         for entry in entries {
//!             println!("{}", entry.name);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod redirect;
pub mod resource;
pub mod secret;
pub mod session;
pub mod strategy;
pub mod token;
pub mod viewer;

#[cfg(feature = "oauth")]
pub mod oauth;

// Re-export commonly used types at crate root
pub use model::{
    AccountId,
    AcquisitionAttempt,
    AttemptOutcome,
    Environment,
    StrategyKind,
};

pub use token::{
    AccessToken,
    CachedAccount,
    FailureReason,
    TokenGrant,
};

pub use cache::{
    CacheEntry,
    CacheError,
    MemoryTokenCache,
    TokenCache,
};

pub use redirect::{
    FileRedirectStore,
    MemoryRedirectStore,
    PendingRedirect,
    RedirectResponse,
    RedirectStore,
};

pub use config::{AuthConfig, ConfigError};
pub use engine::{AcquisitionEngine, Resolution};
pub use error::DrivebridgeError;
pub use resource::{ByteStream, DriveEntry, DriveResource, GraphDriveClient, ResourceError, TargetFormat};
pub use secret::Secret;
pub use session::AuthSession;
pub use strategy::{RedirectTicket, StrategySet};
pub use viewer::{DriveViewer, ViewError, ViewState};
