//! StoreConfig - Artifact Store の構築に使う設定値
//!
//! プロセス全体のシングルトンは持たず、この値をコンストラクタに渡します。

use serde::Deserialize;

/// バックエンドの設定
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// 例: `file:///var/lib/cairn/artifacts`
    pub backend_store_uri: String,
}

impl StoreConfig {
    pub fn new(backend_store_uri: impl Into<String>) -> Self {
        Self {
            backend_store_uri: backend_store_uri.into(),
        }
    }
}
