use crate::domain::ports::Storage;
use crate::utils::error::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use std::collections::HashSet;
use tokio::sync::Mutex;

/// Remembers which webhook deliveries were already applied.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn seen(&self, key: &str) -> Result<bool>;
    async fn record(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryIdempotencyStore {
    keys: Mutex<HashSet<String>>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.keys.lock().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn seen(&self, key: &str) -> Result<bool> {
        Ok(self.keys.lock().await.contains(key))
    }

    async fn record(&self, key: &str) -> Result<()> {
        self.keys.lock().await.insert(key.to_string());
        Ok(())
    }
}

/// One marker file per key under `idempotency/`, so keys survive across
/// Lambda invocations.
pub struct StorageIdempotencyStore<S: Storage> {
    storage: S,
}

impl<S: Storage> StorageIdempotencyStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// URL-safe base64 keeps the name flat and one-to-one with the key.
    pub fn marker_path(key: &str) -> String {
        format!("idempotency/{}", general_purpose::URL_SAFE_NO_PAD.encode(key))
    }
}

#[async_trait]
impl<S: Storage> IdempotencyStore for StorageIdempotencyStore<S> {
    async fn seen(&self, key: &str) -> Result<bool> {
        // 讀不到就當作沒處理過
        Ok(self.storage.read_file(&Self::marker_path(key)).await.is_ok())
    }

    async fn record(&self, key: &str) -> Result<()> {
        let stamp = Utc::now().to_rfc3339();
        self.storage
            .write_file(&Self::marker_path(key), stamp.as_bytes())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryIdempotencyStore::new();
        assert!(!store.seen("p1:2025-10-01").await.unwrap());

        store.record("p1:2025-10-01").await.unwrap();
        assert!(store.seen("p1:2025-10-01").await.unwrap());
        assert!(!store.seen("p1:2025-10-02").await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_storage_store_survives_new_instance() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().to_str().unwrap().to_string();
        let key = "gid://shopify/Product/42:2025-10-24T10:00:00Z";

        let store = StorageIdempotencyStore::new(LocalStorage::new(base.clone()));
        assert!(!store.seen(key).await.unwrap());
        store.record(key).await.unwrap();

        let reopened = StorageIdempotencyStore::new(LocalStorage::new(base));
        assert!(reopened.seen(key).await.unwrap());
    }

    #[test]
    fn test_marker_path_is_flat() {
        let path = StorageIdempotencyStore::<LocalStorage>::marker_path(
            "gid://shopify/Product/42:2025-10-24T10:00:00Z",
        );
        assert_eq!(path, "idempotency/Z2lkOi8vc2hvcGlmeS9Qcm9kdWN0LzQyOjIwMjUtMTAtMjRUMTA6MDA6MDBa");
    }

    #[tokio::test]
    async fn test_similar_keys_do_not_share_a_marker() {
        let temp_dir = TempDir::new().unwrap();
        let store =
            StorageIdempotencyStore::new(LocalStorage::new(temp_dir.path().to_str().unwrap().to_string()));
        let recorded = "gid://shopify/Product/42:2025-10-24T10:00:00Z";
        let lookalike = "gid_//shopify/Product/42_2025-10-24T10:00:00Z";

        assert_ne!(
            StorageIdempotencyStore::<LocalStorage>::marker_path(recorded),
            StorageIdempotencyStore::<LocalStorage>::marker_path(lookalike)
        );
        store.record(recorded).await.unwrap();
        assert!(store.seen(recorded).await.unwrap());
        assert!(!store.seen(lookalike).await.unwrap());
    }
}
