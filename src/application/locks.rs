use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::WalletId;

use super::AppError;

/// Per-wallet mutual exclusion. Guards are held from validation through the
/// cache update of every wallet a transaction touches.
pub struct WalletLocks {
    locks: DashMap<WalletId, Arc<Mutex<()>>>,
    timeout: Duration,
}

/// Guards for a set of wallets, released together on drop.
pub struct WalletGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl WalletLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    fn lock_for(&self, wallet_id: WalletId) -> Arc<Mutex<()>> {
        // Clone out of the map so no shard guard is held across an await
        self.locks
            .entry(wallet_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the locks of all given wallets in ascending id order.
    /// Duplicates are ignored. Fails with `Timeout` if the full set cannot
    /// be acquired in time.
    pub async fn acquire(&self, wallet_ids: &[WalletId]) -> Result<WalletGuards, AppError> {
        let mut ids = wallet_ids.to_vec();
        ids.sort();
        ids.dedup();

        let acquire_all = async {
            let mut guards = Vec::with_capacity(ids.len());
            for id in &ids {
                guards.push(self.lock_for(*id).lock_owned().await);
            }
            guards
        };

        match tokio::time::timeout(self.timeout, acquire_all).await {
            Ok(guards) => Ok(WalletGuards { _guards: guards }),
            Err(_) => {
                tracing::warn!(wallets = ?ids, "timed out acquiring wallet locks");
                Err(AppError::Timeout)
            }
        }
    }

    pub async fn acquire_one(&self, wallet_id: WalletId) -> Result<WalletGuards, AppError> {
        self.acquire(&[wallet_id]).await
    }
}
