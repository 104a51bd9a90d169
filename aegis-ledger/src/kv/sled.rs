//! Sled store implementation
//!
//! Embedded persistent backing for single-host deployments. Scalars and
//! lists live in separate trees; expiry is encoded as a millisecond
//! timestamp prefix on the scalar value and checked lazily on read, so a
//! restart never resurrects a spent TTL.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use aegis_core::day::now_millis;

use super::{KvStore, StoreError, StoreResult};

const SCALARS_TREE: &str = "scalars";
const LISTS_TREE: &str = "lists";

/// Sled-backed key/value store.
#[derive(Debug, Clone)]
pub struct SledKv {
    db: sled::Db,
    scalars: sled::Tree,
    lists: sled::Tree,
}

impl SledKv {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Backend(format!("failed to open sled db: {e}")))?;
        let scalars = db
            .open_tree(SCALARS_TREE)
            .map_err(|e| StoreError::Backend(format!("failed to open scalars tree: {e}")))?;
        let lists = db
            .open_tree(LISTS_TREE)
            .map_err(|e| StoreError::Backend(format!("failed to open lists tree: {e}")))?;
        Ok(Self { db, scalars, lists })
    }

    /// Flush to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db
            .flush()
            .map_err(|e| StoreError::Backend(format!("failed to flush db: {e}")))?;
        Ok(())
    }

    fn encode(value: &str, ttl: Option<Duration>) -> Vec<u8> {
        let expires_at = ttl
            .map(|d| now_millis().saturating_add(d.as_millis() as u64))
            .unwrap_or(0);
        let mut bytes = expires_at.to_be_bytes().to_vec();
        bytes.extend_from_slice(value.as_bytes());
        bytes
    }

    fn decode_live(raw: &[u8]) -> StoreResult<Option<String>> {
        if raw.len() < 8 {
            return Err(StoreError::Codec("scalar value shorter than header".into()));
        }
        let mut header = [0u8; 8];
        header.copy_from_slice(&raw[..8]);
        let expires_at = u64::from_be_bytes(header);
        if expires_at != 0 && expires_at <= now_millis() {
            return Ok(None);
        }
        String::from_utf8(raw[8..].to_vec())
            .map(Some)
            .map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn decode_list(raw: Option<sled::IVec>) -> StoreResult<Vec<String>> {
        match raw {
            Some(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn encode_list(list: &[String]) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(list).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn backend(e: sled::Error) -> StoreError {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl KvStore for SledKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match self.scalars.get(key).map_err(Self::backend)? {
            Some(raw) => Self::decode_live(&raw),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.scalars
            .insert(key, Self::encode(value, ttl))
            .map_err(Self::backend)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        let raw = self.scalars.get(key).map_err(Self::backend)?;
        let live = match &raw {
            Some(bytes) => Self::decode_live(bytes)?.is_some(),
            None => false,
        };
        if live {
            return Ok(false);
        }
        // Swap from the exact stale bytes so a concurrent writer wins the
        // race instead of being overwritten.
        let outcome = self
            .scalars
            .compare_and_swap(key, raw, Some(Self::encode(value, ttl)))
            .map_err(Self::backend)?;
        Ok(outcome.is_ok())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let raw = self.scalars.get(key).map_err(Self::backend)?;
        let current = match &raw {
            Some(bytes) => Self::decode_live(bytes)?,
            None => None,
        };
        if current.as_deref() != expected {
            return Ok(false);
        }
        let outcome = self
            .scalars
            .compare_and_swap(key, raw, Some(Self::encode(new, ttl)))
            .map_err(Self::backend)?;
        Ok(outcome.is_ok())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.scalars.remove(key).map_err(Self::backend)?;
        self.lists.remove(key).map_err(Self::backend)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<()> {
        loop {
            let raw = self.lists.get(key).map_err(Self::backend)?;
            let mut list = Self::decode_list(raw.clone())?;
            list.insert(0, value.to_string());
            let encoded = Self::encode_list(&list)?;
            let outcome = self
                .lists
                .compare_and_swap(key, raw, Some(encoded))
                .map_err(Self::backend)?;
            if outcome.is_ok() {
                return Ok(());
            }
        }
    }

    async fn pop_back(&self, key: &str) -> StoreResult<Option<String>> {
        loop {
            let raw = self.lists.get(key).map_err(Self::backend)?;
            let mut list = Self::decode_list(raw.clone())?;
            let Some(popped) = list.pop() else {
                return Ok(None);
            };
            let replacement = if list.is_empty() {
                None
            } else {
                Some(Self::encode_list(&list)?)
            };
            let outcome = self
                .lists
                .compare_and_swap(key, raw, replacement)
                .map_err(Self::backend)?;
            if outcome.is_ok() {
                return Ok(Some(popped));
            }
        }
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        let raw = self.lists.get(key).map_err(Self::backend)?;
        Ok(Self::decode_list(raw)?.len())
    }

    async fn list_all(&self, key: &str) -> StoreResult<Vec<String>> {
        let raw = self.lists.get(key).map_err(Self::backend)?;
        Self::decode_list(raw)
    }

    async fn scan_lists(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.lists.scan_prefix(prefix) {
            let (key, _) = item.map_err(Self::backend)?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Codec(e.to_string()))?;
            keys.push(key);
        }
        Ok(keys)
    }
}
