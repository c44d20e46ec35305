//! App - アプリケーション層
//!
//! ports と impls を組み合わせて、利用者向けのストア API を提供します。
//!
//! # 主要コンポーネント
//! - **ArtifactStore**: URI で選ばれたドライバーへのファサード（ライフサイクル管理）
//! - **WriteLocks**: 識別子ごとの書き込み直列化
//! - **ResultStore**: バージョン付き result ドキュメント
//! - **StoreConfig**: 設定値

pub mod config;
pub mod locks;
pub mod results;
pub mod store;

// 主要な型を再エクスポート
pub use self::config::StoreConfig;
pub use self::locks::WriteLocks;
pub use self::results::ResultStore;
pub use self::store::{ArtifactStore, StoreState, Update};
