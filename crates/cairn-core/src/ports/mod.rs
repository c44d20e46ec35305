//! Ports - 抽象化レイヤー
//!
//! 各 trait はストレージ媒体（ローカル FS、将来の object storage など）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod artifact_store;
pub mod clock;
pub mod driver;

pub use self::artifact_store::AsyncArtifactStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::driver::{ArtifactIter, StorageDriver};
