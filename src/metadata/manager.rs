//! In-memory cache of active per-user metadata, backed by the store.
//!
//! Operations for the same `user_id` execute as a strict sequence behind a
//! per-key async mutex; operations for distinct keys never block each
//! other. The guard is released on every exit path (error, timeout,
//! cancellation), so a failed request can never wedge a user's key.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::metadata::store::MetadataStore;
use crate::metadata::{merge, MetadataUpdate, UserMetadata};

/// Cache of live metadata records. One live record per `user_id`; the cache
/// is the source of truth between persists.
pub struct MetadataManager {
    store: Arc<dyn MetadataStore>,
    cache: DashMap<String, UserMetadata>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MetadataManager {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Load the record while the caller holds the per-user lock: cache
    /// first, then the store, then a default with a fresh session id.
    async fn load_locked(&self, user_id: &str) -> Result<UserMetadata, StoreError> {
        if let Some(cached) = self.cache.get(user_id) {
            return Ok(cached.clone());
        }
        if let Some(stored) = self.store.find_by_user_id(user_id).await? {
            self.cache.insert(user_id.to_string(), stored.clone());
            return Ok(stored);
        }
        let fresh = UserMetadata::new(user_id);
        self.cache.insert(user_id.to_string(), fresh.clone());
        Ok(fresh)
    }

    /// Return the live metadata for `user_id`, creating a default record on
    /// a store miss. Fails only on store connectivity errors.
    pub async fn get_metadata(&self, user_id: &str) -> Result<UserMetadata, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        self.load_locked(user_id).await
    }

    /// Merge a partial update into the record and persist the result.
    ///
    /// The cache is updated before the persist so subsequent reads observe
    /// the new state immediately; if the upsert fails the cached record
    /// remains authoritative until the store recovers and the error is
    /// surfaced to the caller as retryable.
    pub async fn merge_metadata(
        &self,
        user_id: &str,
        update: &MetadataUpdate,
    ) -> Result<UserMetadata, StoreError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let current = self.load_locked(user_id).await?;
        let merged = merge(&current, update, Utc::now());
        self.cache.insert(user_id.to_string(), merged.clone());
        self.store.upsert(&merged).await?;

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::store::InMemoryMetadataStore;
    use async_trait::async_trait;
    use futures::future::join_all;

    fn manager() -> MetadataManager {
        MetadataManager::new(Arc::new(InMemoryMetadataStore::new()))
    }

    fn trigger_update(trigger: &str) -> MetadataUpdate {
        MetadataUpdate {
            stress_triggers: Some(vec![trigger.to_string()]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_metadata_defaults_on_miss() {
        let manager = manager();
        let record = manager.get_metadata("new-user").await.unwrap();
        assert_eq!(record.user_id, "new-user");
        assert!(!record.session_id.is_empty());
        assert!(record.stress_triggers.is_empty());
        assert!(record.preferred_tools.is_empty());
    }

    #[tokio::test]
    async fn test_get_metadata_is_stable_across_calls() {
        let manager = manager();
        let first = manager.get_metadata("u1").await.unwrap();
        let second = manager.get_metadata("u1").await.unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn test_get_metadata_loads_persisted_record() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let mut persisted = UserMetadata::new("u1");
        persisted.preferred_tools.insert("journaling".to_string());
        store.upsert(&persisted).await.unwrap();

        let manager = MetadataManager::new(store);
        let loaded = manager.get_metadata("u1").await.unwrap();
        assert_eq!(loaded, persisted);
    }

    #[tokio::test]
    async fn test_merge_persists_and_updates_cache() {
        let store = Arc::new(InMemoryMetadataStore::new());
        let manager = MetadataManager::new(store.clone());

        let merged = manager
            .merge_metadata("u1", &trigger_update("perfectionism"))
            .await
            .unwrap();
        assert!(merged.stress_triggers.contains("perfectionism"));

        // Persisted record and cached record converge.
        let persisted = store.find_by_user_id("u1").await.unwrap().unwrap();
        let cached = manager.get_metadata("u1").await.unwrap();
        assert_eq!(persisted, cached);
    }

    #[tokio::test]
    async fn test_concurrent_merges_same_user_lose_nothing() {
        let manager = Arc::new(manager());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .merge_metadata("u1", &trigger_update(&format!("trigger-{i}")))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for joined in join_all(tasks).await {
            joined.unwrap();
        }

        let record = manager.get_metadata("u1").await.unwrap();
        assert_eq!(record.stress_triggers.len(), 16);
        for i in 0..16 {
            assert!(record.stress_triggers.contains(&format!("trigger-{i}")));
        }
    }

    #[tokio::test]
    async fn test_concurrent_merges_distinct_users() {
        let manager = Arc::new(manager());

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    let user = format!("user-{i}");
                    manager
                        .merge_metadata(&user, &trigger_update("deadlines"))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for joined in join_all(tasks).await {
            joined.unwrap();
        }

        for i in 0..8 {
            let record = manager.get_metadata(&format!("user-{i}")).await.unwrap();
            assert!(record.stress_triggers.contains("deadlines"));
        }
    }

    /// Store that fails every upsert, for exercising the retryable path.
    struct DownStore;

    #[async_trait]
    impl MetadataStore for DownStore {
        async fn find_by_user_id(
            &self,
            _user_id: &str,
        ) -> Result<Option<UserMetadata>, StoreError> {
            Ok(None)
        }

        async fn upsert(&self, _metadata: &UserMetadata) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_merge_surfaces_store_failure_but_cache_stays_authoritative() {
        let manager = MetadataManager::new(Arc::new(DownStore));

        let result = manager
            .merge_metadata("u1", &trigger_update("perfectionism"))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        // The merged state is still visible to readers.
        let cached = manager.get_metadata("u1").await.unwrap();
        assert!(cached.stress_triggers.contains("perfectionism"));
    }
}
