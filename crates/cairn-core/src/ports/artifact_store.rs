//! ArtifactStore port - サーバーが使う非同期インターフェース
//!
//! ドライバーの I/O はブロッキングなので、サーバーのリクエスト処理スレッドを
//! 止めないように、実装側（`impls::OffloadedStore`）で blocking pool に逃がします。

use async_trait::async_trait;

use crate::domain::{ArtifactId, StoreError};

/// AsyncArtifactStore はサーバーから見た Artifact Store
///
/// 意味論は `app::ArtifactStore` と同じです（put の直列化、アトミック性、Closed 状態）。
#[async_trait]
pub trait AsyncArtifactStore: Send + Sync {
    async fn put(&self, id: &str, data: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Vec<u8>, StoreError>;

    async fn has(&self, id: &str) -> Result<bool, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    /// プレフィックスに一致する識別子をすべて集めて返す
    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactId>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}
