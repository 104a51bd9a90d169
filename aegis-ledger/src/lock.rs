//! Anchor Lock
//!
//! Create-if-absent lock key serializing anchor iterations across
//! firewall instances. Held for at most the TTL; a crashed holder is
//! replaced when the key expires, so no fencing beyond the TTL is needed
//! (the processed markers make a double drain harmless).

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::keys::ANCHOR_LOCK_KEY;
use crate::kv::{KvStore, StoreResult};

/// Lock TTL; also the hard budget for one anchor iteration.
pub const LOCK_TTL: Duration = Duration::from_secs(120);

/// Distributed anchor lock over the shared store.
pub struct AnchorLock<S: KvStore + ?Sized> {
    store: Arc<S>,
    holder: String,
}

impl<S: KvStore + ?Sized> Clone for AnchorLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            holder: self.holder.clone(),
        }
    }
}

impl<S: KvStore + ?Sized> AnchorLock<S> {
    /// `holder` tags the lock value for diagnostics (instance id, "admin").
    pub fn new(store: Arc<S>, holder: impl Into<String>) -> Self {
        Self {
            store,
            holder: holder.into(),
        }
    }

    /// Try to take the lock. Returns false when another holder has it.
    pub async fn acquire(&self) -> StoreResult<bool> {
        let taken = self
            .store
            .set_nx(ANCHOR_LOCK_KEY, &self.holder, Some(LOCK_TTL))
            .await?;
        if taken {
            debug!(holder = %self.holder, "anchor lock acquired");
        }
        Ok(taken)
    }

    /// Whether any holder currently has the lock.
    pub async fn is_held(&self) -> StoreResult<bool> {
        self.store.exists(ANCHOR_LOCK_KEY).await
    }

    /// Release the lock if we hold it. A different holder's lock is left
    /// alone so an expired-and-reacquired lock is never clobbered.
    pub async fn release(&self) -> StoreResult<()> {
        if let Some(current) = self.store.get(ANCHOR_LOCK_KEY).await? {
            if current == self.holder {
                self.store.delete(ANCHOR_LOCK_KEY).await?;
                debug!(holder = %self.holder, "anchor lock released");
            }
        }
        Ok(())
    }
}
