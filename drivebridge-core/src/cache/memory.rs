//! In-memory token cache implementation.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CacheEntry, CacheError, TokenCache};
use crate::token::{CachedAccount, TokenGrant};

/// Session-lifetime token cache.
///
/// Nothing is persisted; the entry disappears when the process exits.
#[derive(Default)]
pub struct MemoryTokenCache {
    entry: RwLock<Option<CacheEntry>>,
    account: RwLock<Option<CachedAccount>>,
}

impl MemoryTokenCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache that already knows an account (no token yet).
    pub fn with_account(account: CachedAccount) -> Self {
        Self {
            entry: RwLock::new(None),
            account: RwLock::new(Some(account)),
        }
    }
}

impl std::fmt::Debug for MemoryTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTokenCache")
            .field("has_token", &self.entry.read().is_some())
            .field("account", &self.account.read().as_ref().map(|a| a.id.clone()))
            .finish()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn account(&self) -> Result<Option<CachedAccount>, CacheError> {
        Ok(self.account.read().clone())
    }

    async fn entry(&self) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entry.read().clone())
    }

    async fn save(&self, grant: &TokenGrant) -> Result<(), CacheError> {
        let mut account = self.account.write();
        if let Some(new_account) = &grant.account {
            *account = Some(new_account.clone());
        }

        *self.entry.write() = Some(CacheEntry {
            account: account.clone(),
            token: grant.token.clone(),
        });
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        *self.account.write() = None;
        *self.entry.write() = None;
        Ok(())
    }
}
