//! Result documents - バージョン付きの結果データ
//!
//! 1 つの result は 1 つの JSON ドキュメントとして保存されます:
//!
//! ```text
//! <model>/<version>/<result>.json
//!
//! {
//!     "identifier": "r0",
//!     "tag": "t0",
//!     "versions": {
//!         "0": { "written_at": "...", "data": { ... } },
//!         "1": { ... }
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::errors::StoreError;
use super::ids::ArtifactId;

/// result ドキュメントのファイル拡張子
pub const RESULT_EXTENSION: &str = ".json";

/// model / model version / result を特定するキー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub model: String,
    pub version: String,
    pub result: String,
}

impl ResultKey {
    pub fn new(model: &str, version: &str, result: &str) -> Result<Self, StoreError> {
        Ok(Self {
            model: single_segment(model)?.to_string(),
            version: single_segment(version)?.to_string(),
            result: single_segment(result)?.to_string(),
        })
    }

    /// ドキュメントの保存先
    pub fn artifact_id(&self) -> Result<ArtifactId, StoreError> {
        ArtifactId::parse(&format!(
            "{}/{}/{}{}",
            self.model, self.version, self.result, RESULT_EXTENSION
        ))
    }

    /// `<model>/<version>/` 配下のドキュメント ID から ResultKey を復元
    pub fn from_artifact_id(id: &ArtifactId) -> Option<Self> {
        let mut segments = id.segments();
        let model = segments.next()?;
        let version = segments.next()?;
        let file = segments.next()?;
        if segments.next().is_some() {
            return None;
        }
        let result = file.strip_suffix(RESULT_EXTENSION)?;
        if result.is_empty() {
            return None;
        }
        Some(Self {
            model: model.to_string(),
            version: version.to_string(),
            result: result.to_string(),
        })
    }
}

/// model / version / result の各名前は単一セグメントでなければならない
pub fn single_segment(name: &str) -> Result<&str, StoreError> {
    if name.contains('/') {
        return Err(StoreError::invalid_id(name, "name must be a single path segment"));
    }
    let id = ArtifactId::parse(name)?;
    if id.as_str() != name {
        return Err(StoreError::invalid_id(name, "name is not in normal form"));
    }
    Ok(name)
}

/// 1 バージョン分のデータ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultVersion {
    pub written_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// 保存される result ドキュメント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub identifier: String,
    /// 空文字列はタグなし
    #[serde(default)]
    pub tag: String,
    pub versions: BTreeMap<u64, ResultVersion>,
}

impl ResultDocument {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            tag: String::new(),
            versions: BTreeMap::new(),
        }
    }

    pub fn latest_version(&self) -> Option<u64> {
        self.versions.keys().next_back().copied()
    }

    /// 新しいバージョンを追加して、その番号を返す（新規は 0、以降は max + 1）
    pub fn append(&mut self, version: ResultVersion, tag: Option<&str>) -> u64 {
        let next = self.latest_version().map_or(0, |v| v + 1);
        self.versions.insert(next, version);
        self.tag = tag.unwrap_or_default().to_string();
        next
    }

    pub fn tag(&self) -> Option<&str> {
        (!self.tag.is_empty()).then_some(self.tag.as_str())
    }

    /// 指定バージョン（None なら最新）を ResultRecord として取り出す
    pub fn record(&self, key: &ResultKey, version: Option<u64>) -> Option<ResultRecord> {
        let version = match version {
            Some(v) => v,
            None => self.latest_version()?,
        };
        let entry = self.versions.get(&version)?;
        Some(ResultRecord {
            model: key.model.clone(),
            model_version: key.version.clone(),
            identifier: self.identifier.clone(),
            tag: self.tag().map(str::to_string),
            version,
            written_at: entry.written_at,
            data: entry.data.clone(),
        })
    }
}

/// 読み出し結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub model: String,
    pub model_version: String,
    pub identifier: String,
    pub tag: Option<String>,
    pub version: u64,
    pub written_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// model とその version 一覧
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelMetadata {
    pub identifier: String,
    /// ソート済み
    pub versions: Vec<String>,
}
