//! ResultStore - バージョン付き結果の読み書き
//!
//! ArtifactStore の上に、model / model version ごとの result ドキュメントを
//! 管理する層です（ドキュメント形式は `domain::result` を参照）。
//!
//! # 書き込みポリシー
//! - write_result は常に新しいバージョンを追加（上書きしない）
//! - 追加は `ArtifactStore::update` の中で行うので、同じ result への
//!   並行書き込みでもバージョン番号は重複しない

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use super::store::{ArtifactStore, Update};
use crate::domain::result::single_segment;
use crate::domain::{
    ArtifactId, ModelMetadata, ResultDocument, ResultError, ResultKey, ResultRecord,
    ResultVersion, StoreError,
};
use crate::ports::{Clock, SystemClock};

pub struct ResultStore<C = SystemClock> {
    store: Arc<ArtifactStore>,
    clock: C,
}

impl ResultStore<SystemClock> {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<C: Clock> ResultStore<C> {
    pub fn with_clock(store: Arc<ArtifactStore>, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn artifacts(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// result に新しいバージョンを追加し、そのバージョン番号を返す
    ///
    /// タグはドキュメント単位で、最後の書き込みのものに置き換わる（None は空タグ）。
    pub fn write_result(
        &self,
        model: &str,
        version: &str,
        result: &str,
        data: serde_json::Value,
        tag: Option<&str>,
    ) -> Result<u64, ResultError> {
        let key = ResultKey::new(model, version, result)?;
        let id = key.artifact_id()?;
        let entry = ResultVersion {
            written_at: self.clock.now(),
            data,
        };

        let written = self.store.update(id.as_str(), |current| -> Result<_, ResultError> {
            let mut doc = match current {
                Some(bytes) => decode(&id, &bytes)?,
                None => ResultDocument::new(&key.result),
            };
            let written = doc.append(entry, tag);
            Ok((Update::Write(encode(&id, &doc)?), written))
        })?;

        debug!(result = %id, version = written, "wrote result version");
        Ok(written)
    }

    /// 1 つの result を読む（`result_version` が None なら最新）
    pub fn read_result(
        &self,
        model: &str,
        version: &str,
        result: &str,
        result_version: Option<u64>,
    ) -> Result<ResultRecord, ResultError> {
        let key = ResultKey::new(model, version, result)?;
        let id = key.artifact_id()?;
        let doc = decode(&id, &self.store.get(id.as_str())?)?;

        match result_version {
            Some(v) => doc
                .record(&key, Some(v))
                .ok_or_else(|| ResultError::VersionNotFound {
                    result: id.to_string(),
                    version: v,
                }),
            None => doc
                .record(&key, None)
                .ok_or_else(|| StoreError::NotFound(id.to_string()).into()),
        }
    }

    /// model version 配下の全 result の最新バージョン（タグで絞り込み可）
    pub fn read_results(
        &self,
        model: &str,
        version: &str,
        tag: Option<&str>,
    ) -> Result<Vec<ResultRecord>, ResultError> {
        let mut records = Vec::new();
        for (key, id) in self.result_ids(model, version)? {
            // list と get の間に削除されたものは飛ばす
            let bytes = match self.store.get(id.as_str()) {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            let doc = decode(&id, &bytes)?;
            if tag.is_some() && doc.tag() != tag {
                continue;
            }
            if let Some(record) = doc.record(&key, None) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// 1 つのバージョンを削除（最後のバージョンならドキュメントごと削除）
    pub fn delete_result_version(
        &self,
        model: &str,
        version: &str,
        result: &str,
        result_version: u64,
    ) -> Result<(), ResultError> {
        let key = ResultKey::new(model, version, result)?;
        let id = key.artifact_id()?;

        self.store.update(id.as_str(), |current| -> Result<_, ResultError> {
            let Some(bytes) = current else {
                return Err(StoreError::NotFound(id.to_string()).into());
            };
            let mut doc = decode(&id, &bytes)?;
            if doc.versions.remove(&result_version).is_none() {
                return Err(ResultError::VersionNotFound {
                    result: id.to_string(),
                    version: result_version,
                });
            }
            if doc.versions.is_empty() {
                Ok((Update::Delete, ()))
            } else {
                Ok((Update::Write(encode(&id, &doc)?), ()))
            }
        })
    }

    /// result を全バージョンごと削除（存在しなくても成功）
    pub fn delete_result(&self, model: &str, version: &str, result: &str) -> Result<(), ResultError> {
        let key = ResultKey::new(model, version, result)?;
        self.store.delete(key.artifact_id()?.as_str())?;
        Ok(())
    }

    /// model version 配下の result を削除し、削除した数を返す
    ///
    /// `tag` を指定した場合はそのタグを持つ result だけを削除する。
    pub fn delete_results(
        &self,
        model: &str,
        version: &str,
        tag: Option<&str>,
    ) -> Result<usize, ResultError> {
        let mut deleted = 0;
        for (_, id) in self.result_ids(model, version)? {
            let removed = self.store.update(id.as_str(), |current| -> Result<_, ResultError> {
                let Some(bytes) = current else {
                    return Ok((Update::Keep, false));
                };
                if let Some(tag) = tag
                    && decode(&id, &bytes)?.tag() != Some(tag)
                {
                    return Ok((Update::Keep, false));
                }
                Ok((Update::Delete, true))
            })?;
            if removed {
                deleted += 1;
            }
        }
        debug!(model, version, deleted, "deleted results");
        Ok(deleted)
    }

    /// result を持つ model とその version の一覧（どちらも名前順）
    pub fn models(&self) -> Result<Vec<ModelMetadata>, ResultError> {
        let mut models: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for id in self.store.list("")? {
            if let Some(key) = ResultKey::from_artifact_id(&id?) {
                models.entry(key.model).or_default().insert(key.version);
            }
        }
        Ok(models
            .into_iter()
            .map(|(identifier, versions)| ModelMetadata {
                identifier,
                versions: versions.into_iter().collect(),
            })
            .collect())
    }

    /// model version 配下の result ドキュメント（list 時点のスナップショット）
    fn result_ids(
        &self,
        model: &str,
        version: &str,
    ) -> Result<Vec<(ResultKey, ArtifactId)>, ResultError> {
        let prefix = format!("{}/{}/", single_segment(model)?, single_segment(version)?);
        let mut ids = Vec::new();
        for id in self.store.list(&prefix)? {
            let id = id?;
            if let Some(key) = ResultKey::from_artifact_id(&id) {
                ids.push((key, id));
            }
        }
        Ok(ids)
    }
}

fn decode(id: &ArtifactId, bytes: &[u8]) -> Result<ResultDocument, ResultError> {
    serde_json::from_slice(bytes).map_err(|source| ResultError::Corrupt {
        id: id.to_string(),
        source,
    })
}

fn encode(id: &ArtifactId, doc: &ResultDocument) -> Result<Vec<u8>, ResultError> {
    serde_json::to_vec(doc).map_err(|source| ResultError::Corrupt {
        id: id.to_string(),
        source,
    })
}
