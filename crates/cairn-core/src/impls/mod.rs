//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **FilesystemDriver**: `file://`（本番用）
//! - **InMemoryDriver**: `memory://`（開発用・テスト用）
//! - **OffloadedStore**: AsyncArtifactStore（blocking pool へのオフロード）
//!
//! 新しいスキームを追加するときは `DriverConfig` に variant を足し、
//! `open_driver` でドライバーを構築します。

pub mod fs;
pub mod memory;
pub mod offload;

use std::sync::Arc;

use crate::domain::{DriverConfig, StoreError};
use crate::ports::StorageDriver;

pub use self::fs::FilesystemDriver;
pub use self::memory::InMemoryDriver;
pub use self::offload::OffloadedStore;

/// 設定からドライバーを構築（初期化時に 1 回だけ呼ばれる）
pub fn open_driver(config: &DriverConfig) -> Result<Arc<dyn StorageDriver>, StoreError> {
    let driver: Arc<dyn StorageDriver> = match config {
        DriverConfig::Filesystem(fs) => Arc::new(FilesystemDriver::open(fs)?),
        DriverConfig::Memory(memory) => Arc::new(InMemoryDriver::new(memory)),
    };
    Ok(driver)
}
