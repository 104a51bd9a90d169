//! In-memory store implementation
//!
//! Backing for tests and development. A single `RwLock` over the keyspace
//! makes `compare_and_swap` trivially atomic; expiry is checked lazily on
//! every read path.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{KvStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Slot {
    Scalar(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key/value store.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry. Test helper.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    fn live_scalar(entries: &HashMap<String, Entry>, key: &str, now: Instant) -> Option<String> {
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.slot {
                Slot::Scalar(v) => Some(v.clone()),
                Slot::List(_) => None,
            },
            _ => None,
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(Self::live_scalar(&entries, key, Instant::now()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Scalar(value.to_string()),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let occupied = entries
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false);
        if occupied {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Scalar(value.to_string()),
                expires_at: ttl.map(|d| now + d),
            },
        );
        Ok(true)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let current = Self::live_scalar(&entries, key, now);
        if current.as_deref() != expected {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Scalar(new.to_string()),
                expires_at: ttl.map(|d| now + d),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .map(|e| !e.is_expired(Instant::now()))
            .unwrap_or(false))
    }

    async fn push_front(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut entry.slot {
            Slot::List(list) => {
                list.push_front(value.to_string());
                Ok(())
            }
            Slot::Scalar(_) => Err(StoreError::Backend(format!(
                "push_front on scalar key {key}"
            ))),
        }
    }

    async fn pop_back(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.write().await;
        let (popped, drained) = match entries.get_mut(key) {
            None => return Ok(None),
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => {
                let popped = list.pop_back();
                (popped, list.is_empty())
            }
            Some(Entry {
                slot: Slot::Scalar(_),
                ..
            }) => {
                return Err(StoreError::Backend(format!("pop_back on scalar key {key}")))
            }
        };
        if drained {
            entries.remove(key);
        }
        Ok(popped)
    }

    async fn list_len(&self, key: &str) -> StoreResult<usize> {
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => list.len(),
            _ => 0,
        })
    }

    async fn list_all(&self, key: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            Some(Entry {
                slot: Slot::List(list),
                ..
            }) => list.iter().cloned().collect(),
            _ => Vec::new(),
        })
    }

    async fn scan_lists(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| {
                key.starts_with(prefix) && matches!(entry.slot, Slot::List(_))
            })
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scalar_roundtrip() {
        let kv = MemoryKv::new();
        kv.set("k", "v", None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), Some("v".to_string()));
        kv.delete("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let kv = MemoryKv::new();
        kv.set("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(kv.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(kv.get("k").await.unwrap(), None);
        assert!(!kv.exists("k").await.unwrap());

        // An expired key is free for set_nx again
        assert!(kv.set_nx("k", "v2", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_nx() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("lock", "a", None).await.unwrap());
        assert!(!kv.set_nx("lock", "b", None).await.unwrap());
        assert_eq!(kv.get("lock").await.unwrap(), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let kv = MemoryKv::new();

        // Create from absent
        assert!(kv.compare_and_swap("k", None, "1", None).await.unwrap());
        // Stale expectation fails
        assert!(!kv.compare_and_swap("k", None, "2", None).await.unwrap());
        assert!(!kv
            .compare_and_swap("k", Some("0"), "2", None)
            .await
            .unwrap());
        // Matching expectation commits
        assert!(kv
            .compare_and_swap("k", Some("1"), "2", None)
            .await
            .unwrap());
        assert_eq!(kv.get("k").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_list_fifo_order() {
        let kv = MemoryKv::new();
        kv.push_front("q", "first").await.unwrap();
        kv.push_front("q", "second").await.unwrap();
        kv.push_front("q", "third").await.unwrap();

        assert_eq!(kv.list_len("q").await.unwrap(), 3);
        assert_eq!(kv.pop_back("q").await.unwrap(), Some("first".to_string()));
        assert_eq!(kv.pop_back("q").await.unwrap(), Some("second".to_string()));
        assert_eq!(kv.pop_back("q").await.unwrap(), Some("third".to_string()));
        assert_eq!(kv.pop_back("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_lists_excludes_scalars() {
        let kv = MemoryKv::new();
        kv.push_front("pending:{a}", "r1").await.unwrap();
        kv.push_front("pending:{b}", "r2").await.unwrap();
        kv.set("pending:{a}:processed:0xab", "1", None)
            .await
            .unwrap();
        kv.push_front("failed:{a}", "r3").await.unwrap();

        let keys = kv.scan_lists("pending:").await.unwrap();
        assert_eq!(keys, vec!["pending:{a}", "pending:{b}"]);
    }
}
