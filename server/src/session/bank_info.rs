//! Bank info cache
//!
//! The bank table is refetched on every request unless a TTL is configured.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::client::{BankClient, BankError, BankInfoList};

struct CachedBankInfo {
    list: Arc<BankInfoList>,
    cached_at: Instant,
}

/// Optional TTL cache in front of `BankClient::get_bank_info_list`
pub struct BankInfoCache {
    ttl: Option<Duration>,
    cached: RwLock<Option<CachedBankInfo>>,
}

impl BankInfoCache {
    /// `None` (or a zero TTL) disables caching
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl: ttl.filter(|t| !t.is_zero()),
            cached: RwLock::new(None),
        }
    }

    /// Cached table if still fresh
    pub async fn get(&self) -> Option<Arc<BankInfoList>> {
        let ttl = self.ttl?;
        let cached = self.cached.read().await;
        match *cached {
            Some(ref entry) if entry.cached_at.elapsed() < ttl => Some(Arc::clone(&entry.list)),
            _ => None,
        }
    }

    /// Return the cached table or fetch it with `client`.
    ///
    /// Callers must already hold exclusive access to `client`.
    pub async fn get_or_fetch(
        &self,
        client: &mut dyn BankClient,
    ) -> Result<Arc<BankInfoList>, BankError> {
        if let Some(list) = self.get().await {
            debug!("Bank info served from cache");
            return Ok(list);
        }

        let list = Arc::new(client.get_bank_info_list().await?);
        if self.ttl.is_some() {
            let mut cached = self.cached.write().await;
            *cached = Some(CachedBankInfo {
                list: Arc::clone(&list),
                cached_at: Instant::now(),
            });
        }
        Ok(list)
    }
}
