//! Token cache abstraction.
//!
//! This module provides:
//! - [`CacheEntry`] - The single account/token pair a session remembers
//! - [`TokenCache`] - Trait for cache backends
//! - [`MemoryTokenCache`] - Session-lifetime implementation
//!
//! The cache is written only after a strategy succeeds and read at the start
//! of a resolution cycle. A failed cycle leaves it untouched.

use async_trait::async_trait;
use thiserror::Error;

use crate::token::{AccessToken, CachedAccount, TokenGrant};

mod memory;

pub use memory::MemoryTokenCache;

/// Error type for token cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not serve the request.
    #[error("cache backend error: {message}")]
    Backend { message: String },
}

/// The account/token pair held by the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Account used for silent acquisition, if one is known.
    pub account: Option<CachedAccount>,

    /// The most recently acquired token.
    pub token: AccessToken,
}

/// Abstraction over token cache backends.
///
/// Implementations hold at most one entry.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// The cached account, if any.
    async fn account(&self) -> Result<Option<CachedAccount>, CacheError>;

    /// The full cached entry, if any.
    async fn entry(&self) -> Result<Option<CacheEntry>, CacheError>;

    /// Record a successful acquisition.
    ///
    /// The token always replaces the previous one. The account is replaced
    /// only when the grant carries one; otherwise the previously cached
    /// account is kept.
    async fn save(&self, grant: &TokenGrant) -> Result<(), CacheError>;

    /// Forget everything.
    async fn clear(&self) -> Result<(), CacheError>;
}
