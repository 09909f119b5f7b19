//! The key-value store abstraction each manager persists through, and a
//! default in-memory implementation backed by [`moka`], grounded in
//! `MokaManager` (`examples/06chaynes-http-cache/http-cache/src/managers/moka.rs`).
//!
//! Unlike that manager, entries here need a *per-key* TTL chosen at
//! insert time (a `max-age=1` entry and a redirect memoized for ten years
//! must coexist in the same store), so the moka cache is built with a custom
//! [`moka::Expiry`] rather than a single cache-wide `time_to_live`.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use moka::{future::Cache, Expiry};

use crate::Result;

/// Minimal get/set-with-TTL/delete/clear surface consumed by the managers.
/// Implementations need only provide per-key atomicity; there is
/// no single-flight/coalescing requirement.
#[async_trait]
pub trait KeyValueStore: std::fmt::Debug + Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Clone)]
struct PerEntryExpiry;

impl Expiry<String, (Vec<u8>, Duration)> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &(Vec<u8>, Duration),
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.1)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &(Vec<u8>, Duration),
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.1)
    }
}

/// Default in-memory [`KeyValueStore`], suitable for a process-wide default
/// and for tests. Each entry carries its own TTL: cache entries use
/// `max-age` seconds, redirect records use a ~10-year TTL, in the same
/// store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    cache: Arc<Cache<String, (Vec<u8>, Duration)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let cache = Cache::builder().expire_after(PerEntryExpiry).build();
        Self { cache: Arc::new(cache) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).await.map(|(bytes, _)| bytes))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_owned(), (value, ttl)).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

/// A [`KeyValueStore`] whose TTL expiry is checked against an injected
/// [`Clock`](crate::clock::Clock) instead of real wall-clock time — the
/// store used by tests that advance time manually.
/// Gated behind `test-util` so production builds never pull it in.
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::{Duration, SystemTime},
    };

    use async_trait::async_trait;

    use crate::clock::Clock;
    use crate::Result;

    use super::KeyValueStore;

    struct Entry {
        value: Vec<u8>,
        expires_at: SystemTime,
    }

    /// In-memory store with clock-driven expiry, for deterministic tests.
    #[derive(Clone)]
    pub struct TestStore {
        clock: Arc<dyn Clock>,
        entries: Arc<Mutex<HashMap<String, Entry>>>,
    }

    impl std::fmt::Debug for TestStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TestStore").finish_non_exhaustive()
        }
    }

    impl TestStore {
        pub fn new(clock: Arc<dyn Clock>) -> Self {
            Self { clock, entries: Arc::new(Mutex::new(HashMap::new())) }
        }
    }

    #[async_trait]
    impl KeyValueStore for TestStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            let now = self.clock.now();
            let mut entries = self.entries.lock().unwrap();
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
                Some(_) => {
                    entries.remove(key);
                    Ok(None)
                }
                None => Ok(None),
            }
        }

        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
            let expires_at = self.clock.now() + ttl;
            self.entries.lock().unwrap().insert(key.to_owned(), Entry { value, expires_at });
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            self.entries.lock().unwrap().clear();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), Duration::from_secs(60)).await.unwrap();
        store.set("b", b"2".to_vec(), Duration::from_secs(60)).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), None);
    }
}
