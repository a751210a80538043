//! LRU write-through cache in front of a durable session store.
//!
//! The cache is updated before the durable write is awaited, so the live
//! process always sees its latest state even if the write fails. A crash
//! between the two loses at most that one snapshot.

use async_trait::async_trait;
use lru::LruCache;
use mnemos_core::error::PersistenceError;
use mnemos_core::persistence::{SessionStore, validate_session_id};
use mnemos_core::session::{Session, SessionSummary};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct CachedSessionStore {
    inner: Arc<dyn SessionStore>,
    cache: Mutex<LruCache<String, Session>>,
}

impl CachedSessionStore {
    /// Wrap `inner` with an LRU of `capacity` sessions (at least one).
    pub fn new(inner: Arc<dyn SessionStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_cached(&self, session_id: &str) -> bool {
        self.cache.lock().await.contains(session_id)
    }
}

#[async_trait]
impl SessionStore for CachedSessionStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
        validate_session_id(&session.id)?;
        self.cache
            .lock()
            .await
            .put(session.id.clone(), session.clone());

        if let Err(e) = self.inner.save(session).await {
            warn!(session_id = %session.id, error = %e, "Durable session write failed, cache still holds the snapshot");
            return Err(e);
        }
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Session>, PersistenceError> {
        if let Some(session) = self.cache.lock().await.get(session_id) {
            return Ok(Some(session.clone()));
        }

        let loaded = self.inner.load(session_id).await?;
        if let Some(session) = &loaded {
            debug!(session_id, "Session loaded from durable store");
            self.cache
                .lock()
                .await
                .put(session_id.to_string(), session.clone());
        }
        Ok(loaded)
    }

    /// Durable listing merged with cached sessions whose write may not have landed.
    async fn list(&self) -> Result<Vec<SessionSummary>, PersistenceError> {
        let mut summaries = self.inner.list().await?;
        let cache = self.cache.lock().await;
        for (id, session) in cache.iter() {
            match summaries.iter_mut().find(|s| &s.session_id == id) {
                Some(existing) => existing.timestamp = existing.timestamp.max(session.updated_at),
                None => summaries.push(SessionSummary {
                    session_id: id.clone(),
                    timestamp: session.updated_at,
                }),
            }
        }
        drop(cache);
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    async fn delete(&self, session_id: &str) -> Result<bool, PersistenceError> {
        let was_cached = self.cache.lock().await.pop(session_id).is_some();
        let was_stored = self.inner.delete(session_id).await?;
        Ok(was_cached || was_stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemorySessionStore;
    use chrono::{Duration, Utc};
    use mnemos_core::store::StoreLimits;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Durable store whose writes always fail.
    #[derive(Default)]
    struct BrokenStore {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn save(&self, _: &Session) -> Result<(), PersistenceError> {
            Err(PersistenceError::Storage("disk full".into()))
        }

        async fn load(&self, _: &str) -> Result<Option<Session>, PersistenceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn list(&self) -> Result<Vec<SessionSummary>, PersistenceError> {
            Ok(Vec::new())
        }

        async fn delete(&self, _: &str) -> Result<bool, PersistenceError> {
            Ok(false)
        }
    }

    fn session(id: &str) -> Session {
        Session::new(id, StoreLimits::default())
    }

    #[tokio::test]
    async fn failed_write_still_updates_cache() {
        let inner = Arc::new(BrokenStore::default());
        let store = CachedSessionStore::new(inner.clone(), 4);

        assert!(store.save(&session("s1")).await.is_err());
        assert!(store.is_cached("s1").await);
        assert_eq!(store.load("s1").await.unwrap().unwrap().id, "s1");
        assert_eq!(inner.loads.load(Ordering::SeqCst), 0);

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, "s1");
    }

    #[tokio::test]
    async fn cache_misses_fall_through_and_populate() {
        let inner = Arc::new(InMemorySessionStore::new());
        inner.save(&session("s1")).await.unwrap();
        let store = CachedSessionStore::new(inner, 4);

        assert!(!store.is_cached("s1").await);
        assert!(store.load("s1").await.unwrap().is_some());
        assert!(store.is_cached("s1").await);
        assert!(store.load("missing").await.unwrap().is_none());
        assert!(!store.is_cached("missing").await);
    }

    #[tokio::test]
    async fn least_recently_used_session_is_evicted() {
        let inner = Arc::new(InMemorySessionStore::new());
        let store = CachedSessionStore::new(inner, 2);
        store.save(&session("a")).await.unwrap();
        store.save(&session("b")).await.unwrap();
        store.load("a").await.unwrap();
        store.save(&session("c")).await.unwrap();

        assert_eq!(store.cached_len().await, 2);
        assert!(store.is_cached("a").await);
        assert!(!store.is_cached("b").await);
        // Still durable
        assert!(store.load("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_prefers_fresher_cached_timestamp() {
        let inner = Arc::new(InMemorySessionStore::new());
        let mut stale = session("s1");
        stale.updated_at = Utc::now() - Duration::days(1);
        inner.save(&stale).await.unwrap();
        inner.save(&session("s2")).await.unwrap();

        let store = CachedSessionStore::new(inner, 4);
        let mut fresh = stale.clone();
        fresh.updated_at = Utc::now() + Duration::hours(1);
        store.cache.lock().await.put("s1".into(), fresh.clone());

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, "s1");
        assert_eq!(listed[0].timestamp, fresh.updated_at);
    }

    #[tokio::test]
    async fn delete_clears_both_layers() {
        let inner = Arc::new(InMemorySessionStore::new());
        let store = CachedSessionStore::new(inner.clone(), 4);
        store.save(&session("s1")).await.unwrap();

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.is_cached("s1").await);
        assert!(inner.load("s1").await.unwrap().is_none());
        assert!(!store.delete("s1").await.unwrap());
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let store = CachedSessionStore::new(Arc::new(InMemorySessionStore::new()), 0);
        assert_eq!(store.cache.try_lock().unwrap().cap().get(), 1);
    }
}
