//! cairn-core
//!
//! Pluggable artifact storage: URI でバックエンドを選び、
//! 不透明なバイト列を識別子で保存・取得します。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, uri, result, errors）
//! - **ports**: 抽象化レイヤー（StorageDriver, AsyncArtifactStore, Clock）
//! - **impls**: 実装（FilesystemDriver, InMemoryDriver, OffloadedStore）
//! - **app**: アプリケーション層（ArtifactStore, ResultStore, WriteLocks）
//!
//! ```no_run
//! use cairn_core::ArtifactStore;
//!
//! # fn main() -> Result<(), cairn_core::StoreError> {
//! let store = ArtifactStore::open("file:///var/lib/cairn")?;
//! store.put("models/m0/weights.bin", b"...")?;
//! let bytes = store.get("models/m0/weights.bin")?;
//! # let _ = bytes;
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod ports;
pub mod impls;
pub mod app;

pub use crate::app::{ArtifactStore, ResultStore, StoreConfig, StoreState};
pub use crate::domain::{ArtifactId, ErrorKind, ResultError, StoreError};
pub use crate::impls::OffloadedStore;
pub use crate::ports::AsyncArtifactStore;
