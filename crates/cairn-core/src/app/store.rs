//! ArtifactStore - サーバーが使うファサード
//!
//! # 責務
//! - URI からドライバーを選び、初期化時に 1 回だけ構築する（Fail-fast）
//! - 識別子を正規化してからドライバーへ委譲する（ドライバー側でも再検証される）
//! - 同じ識別子への書き込みを直列化する
//! - ライフサイクル: `Ready → Closed`。Closed 後の呼び出しはすべて `StoreError::Closed`
//!
//! すべての操作はブロッキングです。async から使う場合は `impls::OffloadedStore` を使ってください。

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use super::config::StoreConfig;
use super::locks::WriteLocks;
use crate::domain::{resolve, ArtifactId, ArtifactPrefix, DriverConfig, StoreError};
use crate::impls::open_driver;
use crate::ports::{ArtifactIter, StorageDriver};

/// ストアの状態
///
/// `Uninitialized` はコンストラクタが返るまでの状態なので外からは見えない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Ready,
    Closed,
}

/// `update` のクロージャが返す操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// 何もしない
    Keep,
    /// 内容を丸ごと置き換える
    Write(Vec<u8>),
    /// 削除する
    Delete,
}

pub struct ArtifactStore {
    label: String,
    /// None = Closed
    driver: RwLock<Option<Arc<dyn StorageDriver>>>,
    locks: WriteLocks,
}

impl ArtifactStore {
    /// backend-store URI からストアを構築
    ///
    /// # Errors
    /// - `InvalidUri` / `UnsupportedScheme`: URI の誤り（何も作られない）
    /// - `BackendInit`: storage root が存在せず作成もできない
    pub fn open(uri: &str) -> Result<Self, StoreError> {
        let (scheme, config) = resolve(uri)?;
        debug!(%scheme, uri, "resolved backend store URI");
        Self::with_driver_config(&config)
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(&config.backend_store_uri)
    }

    pub fn with_driver_config(config: &DriverConfig) -> Result<Self, StoreError> {
        debug!(scheme = %config.scheme(), "opening storage driver");
        Ok(Self::with_driver(open_driver(config)?))
    }

    /// 構築済みのドライバーから作成（独自ドライバーを差し込む場合）
    pub fn with_driver(driver: Arc<dyn StorageDriver>) -> Self {
        let label = driver.describe();
        info!(backend = %label, "artifact store ready");
        Self {
            label,
            driver: RwLock::new(Some(driver)),
            locks: WriteLocks::new(),
        }
    }

    pub fn describe(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> StoreState {
        if self.driver.read().is_some() {
            StoreState::Ready
        } else {
            StoreState::Closed
        }
    }

    /// 読み取りガードを保持している間は close されない
    fn ready(&self) -> Result<ActiveDriver<'_>, StoreError> {
        let guard = self.driver.read();
        let driver = guard.as_ref().cloned().ok_or(StoreError::Closed)?;
        Ok(ActiveDriver {
            _guard: guard,
            driver,
        })
    }

    pub fn put(&self, id: &str, data: &[u8]) -> Result<(), StoreError> {
        let driver = self.ready()?;
        let id = ArtifactId::parse(id)?;
        self.locks.with(&id, || driver.get().write(&id, data))?;
        debug!(artifact = %id, bytes = data.len(), "put");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Vec<u8>, StoreError> {
        let driver = self.ready()?;
        let id = ArtifactId::parse(id)?;
        driver.get().read(&id)
    }

    pub fn has(&self, id: &str) -> Result<bool, StoreError> {
        let driver = self.ready()?;
        let id = ArtifactId::parse(id)?;
        Ok(driver.get().exists(&id))
    }

    /// 存在しない識別子の削除も成功する
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let driver = self.ready()?;
        let id = ArtifactId::parse(id)?;
        self.locks.with(&id, || driver.get().delete(&id))?;
        debug!(artifact = %id, "delete");
        Ok(())
    }

    /// プレフィックスに一致する識別子の遅延シーケンス
    ///
    /// 順序はドライバー依存（同じ状態なら毎回同じ）。辞書順は保証しない。
    pub fn list(&self, prefix: &str) -> Result<ArtifactIter, StoreError> {
        let driver = self.ready()?;
        let prefix = ArtifactPrefix::parse(prefix)?;
        driver.get().list(&prefix)
    }

    /// 書き込みロックを保持したまま read-modify-write を行う
    ///
    /// `f` は現在の内容（なければ None）を受け取り、行う操作と戻り値を返す。
    /// 同じ識別子への put / delete / update とは直列化される。
    pub fn update<T, E, F>(&self, id: &str, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(Option<Vec<u8>>) -> Result<(Update, T), E>,
    {
        let driver = self.ready()?;
        let id = ArtifactId::parse(id)?;
        let driver = driver.get();

        self.locks.with(&id, || {
            let current = match driver.read(&id) {
                Ok(bytes) => Some(bytes),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            };
            let (update, value) = f(current)?;
            match update {
                Update::Keep => {}
                Update::Write(bytes) => driver.write(&id, &bytes)?,
                Update::Delete => driver.delete(&id)?,
            }
            Ok(value)
        })
    }

    /// ストアを閉じる（進行中の操作の完了を待つ）
    ///
    /// 2 回目以降の呼び出しも `StoreError::Closed` になる。
    pub fn close(&self) -> Result<(), StoreError> {
        let driver = self.driver.write().take().ok_or(StoreError::Closed)?;
        driver.close()?;
        info!(backend = %self.label, "artifact store closed");
        Ok(())
    }
}

struct ActiveDriver<'a> {
    _guard: RwLockReadGuard<'a, Option<Arc<dyn StorageDriver>>>,
    driver: Arc<dyn StorageDriver>,
}

impl ActiveDriver<'_> {
    fn get(&self) -> &dyn StorageDriver {
        self.driver.as_ref()
    }
}
