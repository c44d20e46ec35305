//! InMemoryDriver - `memory://` スキームのドライバー（開発用・テスト用）
//!
//! # 実装詳細
//! - BTreeMap<ArtifactId, Arc<[u8]>> を RwLock で保護
//! - write は値の差し替えだけなので常にアトミック
//! - list は呼び出し時点のスナップショット（辞書順）

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{ArtifactId, ArtifactPrefix, MemoryConfig, StoreError};
use crate::ports::{ArtifactIter, StorageDriver};

pub struct InMemoryDriver {
    label: String,
    blobs: RwLock<BTreeMap<ArtifactId, Arc<[u8]>>>,
}

impl InMemoryDriver {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            label: config.label.clone(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl StorageDriver for InMemoryDriver {
    fn describe(&self) -> String {
        format!("memory://{}", self.label)
    }

    fn read(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .get(id)
            .map(|blob| blob.to_vec())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn write(&self, id: &ArtifactId, data: &[u8]) -> Result<(), StoreError> {
        let blob: Arc<[u8]> = Arc::from(data);
        self.blobs.write().insert(id.clone(), blob);
        debug!(artifact = %id, bytes = data.len(), "stored artifact in memory");
        Ok(())
    }

    fn exists(&self, id: &ArtifactId) -> bool {
        self.blobs.read().contains_key(id)
    }

    fn delete(&self, id: &ArtifactId) -> Result<(), StoreError> {
        self.blobs.write().remove(id);
        Ok(())
    }

    fn list(&self, prefix: &ArtifactPrefix) -> Result<ArtifactIter, StoreError> {
        let snapshot: Vec<ArtifactId> = self
            .blobs
            .read()
            .keys()
            .filter(|id| prefix.matches(id))
            .cloned()
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn close(&self) -> Result<(), StoreError> {
        self.blobs.write().clear();
        Ok(())
    }
}
