//! Errors - ストレージ層のエラー型と分類
//!
//! すべての操作は `StoreError` を返します。
//! サーバー側は `kind()` を見てレスポンスコードへ変換します。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// ErrorKind はエラーの運用分類
///
/// - Permanent: 呼び出し側の誤用（リトライ無意味）
/// - Transient: 一時的な I/O エラー（呼び出し側がバックオフ付きでリトライ可能）
/// - Infrastructure: 起動時のバックエンド障害
/// - NotFound: 正常系の結果（障害ではない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permanent,
    Transient,
    Infrastructure,
    NotFound,
}

/// StoreError は Artifact Store / Storage Driver のエラー
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid backend store URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("unsupported backend store scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to initialize backend at {}: {reason}", root.display())]
    BackendInit {
        root: PathBuf,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("invalid artifact identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: &'static str },

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("storage I/O failed during {op} of '{target}': {source}")]
    StorageIo {
        op: &'static str,
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("artifact store is closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn invalid_uri(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_id(id: &str, reason: &'static str) -> Self {
        Self::InvalidIdentifier {
            id: id.to_string(),
            reason,
        }
    }

    pub(crate) fn io(op: &'static str, target: impl Into<String>, source: io::Error) -> Self {
        Self::StorageIo {
            op,
            target: target.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUri { .. }
            | Self::UnsupportedScheme(_)
            | Self::InvalidIdentifier { .. }
            | Self::Closed => ErrorKind::Permanent,
            Self::BackendInit { .. } => ErrorKind::Infrastructure,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::StorageIo { .. } => ErrorKind::Transient,
        }
    }

    /// リトライしてよいのは I/O エラーのみ（コア自身はリトライしない）
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// ResultError は Result Store（バージョン付き結果）のエラー
#[derive(Debug, Error)]
pub enum ResultError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("result '{result}' has no version {version}")]
    VersionNotFound { result: String, version: u64 },

    #[error("result document '{id}' is corrupt: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ResultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(e) => e.kind(),
            Self::VersionNotFound { .. } => ErrorKind::NotFound,
            Self::Corrupt { .. } => ErrorKind::Infrastructure,
        }
    }
}
