//! Top-level error type for drivebridge.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::redirect::{RedirectParseError, RedirectStoreError};
use crate::resource::ResourceError;
use crate::token::FailureReason;
use crate::viewer::ViewError;

/// Top-level error type encompassing all drivebridge errors.
#[derive(Debug, Error)]
pub enum DrivebridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A strategy could not be constructed or token acquisition failed.
    #[error("acquisition error: {0}")]
    Acquisition(#[from] FailureReason),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("redirect store error: {0}")]
    RedirectStore(#[from] RedirectStoreError),

    #[error("invalid redirect response: {0}")]
    RedirectParse(#[from] RedirectParseError),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    View(#[from] ViewError),
}
