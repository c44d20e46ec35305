//! Artifact identifiers (sanitized logical names).
//!
//! # ArtifactId
//! 呼び出し側が選ぶ論理名（例: `"run-id/file.bin"`）を正規化したものです。
//! `ArtifactId` が存在すること自体が「storage root の外へ出ない」ことの証明になります。
//!
//! ## 正規化ルール
//! - 区切りは `/` のみ。空セグメントと `.` は取り除く（`a//./b` → `a/b`）
//! - `..` セグメント、先頭 `/`（絶対パス）、NUL、`\` は拒否
//! - 正規化後に空なら拒否
//! - 先頭セグメントが予約プレフィックス `.cairn` で始まるものは拒否（ドライバーの作業領域）

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::StoreError;

/// ドライバーが storage root 直下で内部用に使う名前のプレフィックス
pub const RESERVED_PREFIX: &str = ".cairn";

/// 正規化済みの Artifact 識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    /// 文字列を検証・正規化して ArtifactId を作成
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments = split_segments(raw)?;
        if segments.is_empty() {
            return Err(StoreError::invalid_id(raw, "identifier is empty"));
        }
        if segments[0].starts_with(RESERVED_PREFIX) {
            return Err(StoreError::invalid_id(raw, "identifier uses a reserved name"));
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `/` で区切られたセグメント
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ArtifactId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ArtifactId> for String {
    fn from(id: ArtifactId) -> Self {
        id.0
    }
}

/// list 用のプレフィックス
///
/// 識別子とは違い、空文字列（全件）や末尾 `/` を許可します。
/// 最後のセグメントは部分一致（`"run"` は `"run-1/a"` と `"runner.bin"` に一致）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPrefix {
    normalized: String,
    dir_segments: Vec<String>,
}

impl ArtifactPrefix {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let segments = split_segments(raw)?;
        let directory_like = raw.ends_with('/') || raw.ends_with("/.");

        let mut normalized = segments.join("/");
        let dir_segments: Vec<String> = if directory_like {
            if !normalized.is_empty() {
                normalized.push('/');
            }
            segments.iter().map(|s| s.to_string()).collect()
        } else {
            let complete = segments.len().saturating_sub(1);
            segments[..complete].iter().map(|s| s.to_string()).collect()
        };

        Ok(Self {
            normalized,
            dir_segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// プレフィックスのうち完全なディレクトリ部分（走査の起点）
    pub fn dir_segments(&self) -> &[String] {
        &self.dir_segments
    }

    pub fn matches(&self, id: &ArtifactId) -> bool {
        id.as_str().starts_with(&self.normalized)
    }
}

fn split_segments(raw: &str) -> Result<Vec<&str>, StoreError> {
    if raw.contains('\0') {
        return Err(StoreError::invalid_id(raw, "identifier contains NUL"));
    }
    if raw.contains('\\') {
        return Err(StoreError::invalid_id(raw, "identifier contains a backslash"));
    }
    if raw.starts_with('/') {
        return Err(StoreError::invalid_id(raw, "absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(StoreError::invalid_id(raw, "parent-directory traversal"));
            }
            s => segments.push(s),
        }
    }
    Ok(segments)
}
