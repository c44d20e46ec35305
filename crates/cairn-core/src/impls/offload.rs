//! OffloadedStore - AsyncArtifactStore の実装
//!
//! ブロッキングな ArtifactStore の呼び出しを `spawn_blocking` で
//! tokio の blocking pool に逃がします。

use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::ArtifactStore;
use crate::domain::{ArtifactId, StoreError};
use crate::ports::AsyncArtifactStore;

/// OffloadedStore は ArtifactStore を async から使うためのラッパー
///
/// # 使用例
/// ```ignore
/// let store = OffloadedStore::new(Arc::new(ArtifactStore::open("file:///var/artifacts")?));
/// store.put("run-1/model.bin", bytes).await?;
/// ```
#[derive(Clone)]
pub struct OffloadedStore {
    inner: Arc<ArtifactStore>,
}

impl OffloadedStore {
    pub fn new(inner: Arc<ArtifactStore>) -> Self {
        Self { inner }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&ArtifactStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| StoreError::io("offload", "blocking task", io::Error::other(e)))?
    }
}

#[async_trait]
impl AsyncArtifactStore for OffloadedStore {
    async fn put(&self, id: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let id = id.to_string();
        self.run(move |store| store.put(&id, &data)).await
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let id = id.to_string();
        self.run(move |store| store.get(&id)).await
    }

    async fn has(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.run(move |store| store.has(&id)).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.run(move |store| store.delete(&id)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactId>, StoreError> {
        let prefix = prefix.to_string();
        self.run(move |store| store.list(&prefix)?.collect()).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.run(|store| store.close()).await
    }
}
