//! StorageDriver port - スキームごとのストレージ実装
//!
//! # 実装
//! - **FilesystemDriver**: `file://`（impls/fs.rs）
//! - **InMemoryDriver**: `memory://`（impls/memory.rs）
//!
//! すべてのメソッドはブロッキングです。async コンテキストからは
//! `impls::OffloadedStore` 経由で呼び出してください。

use crate::domain::{ArtifactId, ArtifactPrefix, StoreError};

/// list が返す遅延シーケンス
pub type ArtifactIter = Box<dyn Iterator<Item = Result<ArtifactId, StoreError>> + Send>;

/// StorageDriver は 1 つのスキームのストレージ操作を実装
///
/// # 不変条件
/// - `write` は並行する reader に対してアトミック（旧内容か新内容のどちらかのみ見える）
/// - `exists` は正しい識別子に対して失敗しない
/// - `delete` は冪等
/// - `list` は有限で、ストレージ状態が変わらなければ順序も変わらない
/// - 識別子がストレージの外を指す場合は `InvalidIdentifier`
pub trait StorageDriver: Send + Sync {
    /// ログ用の説明（例: `file:///var/artifacts`）
    fn describe(&self) -> String;

    fn read(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError>;

    fn write(&self, id: &ArtifactId, data: &[u8]) -> Result<(), StoreError>;

    fn exists(&self, id: &ArtifactId) -> bool;

    fn delete(&self, id: &ArtifactId) -> Result<(), StoreError>;

    fn list(&self, prefix: &ArtifactPrefix) -> Result<ArtifactIter, StoreError>;

    /// 保持しているリソースを解放（デフォルトは何もしない）
    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
