//! Backend-store URI resolution.
//!
//! `resolve(uri)` は純粋なパースのみを行い、ドライバーの構築は
//! `ArtifactStore::open` 側で行います（ここでは副作用なし）。
//!
//! # 対応スキーム
//! - `file:///abs/dir[?create=true|false&fsync=true|false]`
//! - `memory://label`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use super::errors::StoreError;

/// 登録済みのスキーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    File,
    Memory,
}

impl Scheme {
    pub const ALL: [Scheme; 2] = [Scheme::File, Scheme::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::File => "file",
            Scheme::Memory => "memory",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scheme::ALL
            .into_iter()
            .find(|scheme| scheme.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StoreError::UnsupportedScheme(s.to_string()))
    }
}

/// Local filesystem driver の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsConfig {
    /// storage root（絶対パス）
    pub root: PathBuf,
    /// root が存在しない場合に作成するか
    pub create: bool,
    /// rename 前に fsync するか
    pub fsync: bool,
}

impl FsConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            create: true,
            fsync: true,
        }
    }
}

/// In-memory driver の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// ログ用のラベル
    pub label: String,
}

/// スキームごとのドライバー設定（tagged variants）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverConfig {
    Filesystem(FsConfig),
    Memory(MemoryConfig),
}

impl DriverConfig {
    pub fn scheme(&self) -> Scheme {
        match self {
            DriverConfig::Filesystem(_) => Scheme::File,
            DriverConfig::Memory(_) => Scheme::Memory,
        }
    }
}

/// backend-store URI をスキームとドライバー設定に分解
pub fn resolve(uri: &str) -> Result<(Scheme, DriverConfig), StoreError> {
    let url = Url::parse(uri).map_err(|e| StoreError::invalid_uri(uri, e.to_string()))?;
    let scheme: Scheme = url.scheme().parse()?;

    let config = match scheme {
        Scheme::File => DriverConfig::Filesystem(fs_config(uri, &url)?),
        Scheme::Memory => DriverConfig::Memory(memory_config(uri, &url)?),
    };
    Ok((scheme, config))
}

fn fs_config(uri: &str, url: &Url) -> Result<FsConfig, StoreError> {
    if let Some(host) = url.host_str()
        && !host.is_empty()
        && host != "localhost"
    {
        return Err(StoreError::invalid_uri(
            uri,
            format!("file URIs must not name a remote host (got '{host}')"),
        ));
    }

    let root = url
        .to_file_path()
        .map_err(|_| StoreError::invalid_uri(uri, "path is not an absolute filesystem path"))?;

    let mut config = FsConfig::new(root);
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "create" => config.create = parse_flag(uri, &key, &value)?,
            "fsync" => config.fsync = parse_flag(uri, &key, &value)?,
            other => {
                return Err(StoreError::invalid_uri(
                    uri,
                    format!("unrecognized option '{other}'"),
                ));
            }
        }
    }
    Ok(config)
}

fn memory_config(uri: &str, url: &Url) -> Result<MemoryConfig, StoreError> {
    if url.query().is_some() {
        return Err(StoreError::invalid_uri(uri, "memory URIs take no options"));
    }
    let mut label = url.host_str().unwrap_or_default().to_string();
    label.push_str(url.path().trim_end_matches('/'));
    Ok(MemoryConfig { label })
}

fn parse_flag(uri: &str, key: &str, value: &str) -> Result<bool, StoreError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(StoreError::invalid_uri(
            uri,
            format!("option '{key}' expects true or false, got '{value}'"),
        )),
    }
}
