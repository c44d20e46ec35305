//! FilesystemDriver - `file://` スキームのドライバー
//!
//! ディレクトリ構成:
//!
//! ```text
//! root/
//!   .cairn-staging/      書き込み途中の一時ファイル（list には出ない）
//!   run-id/
//!     file.bin           識別子 "run-id/file.bin"
//! ```
//!
//! # アトミック書き込み
//! 1. staging に一時ファイルを作って全バイトを書く（必要なら fsync）
//! 2. 最終パスへ rename（同一ファイルシステム内なのでアトミック）
//! 3. 失敗したら一時ファイルは drop で削除される
//!
//! 別プロセスが同じ root を使う場合も、この rename だけが torn write を防ぎます。

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::Builder;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::domain::{ArtifactId, ArtifactPrefix, FsConfig, StoreError};
use crate::ports::{ArtifactIter, StorageDriver};

/// 一時ファイル置き場（`RESERVED_PREFIX` で始まるので識別子とは衝突しない）
pub const STAGING_DIR: &str = ".cairn-staging";

/// 親ディレクトリの作り直しを試みる上限
const PARENT_RETRIES: usize = 16;

pub struct FilesystemDriver {
    root: PathBuf,
    staging: PathBuf,
    fsync: bool,
}

impl FilesystemDriver {
    /// storage root を検証（必要なら作成）してドライバーを作る
    pub fn open(config: &FsConfig) -> Result<Self, StoreError> {
        let init_error = |reason: &str, source: Option<io::Error>| StoreError::BackendInit {
            root: config.root.clone(),
            reason: reason.to_string(),
            source,
        };

        match fs::metadata(&config.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(init_error("storage root is not a directory", None)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !config.create {
                    return Err(init_error("storage root does not exist", Some(e)));
                }
                fs::create_dir_all(&config.root)
                    .map_err(|e| init_error("cannot create storage root", Some(e)))?;
                info!(root = %config.root.display(), "created storage root");
            }
            Err(e) => return Err(init_error("cannot access storage root", Some(e))),
        }

        let root = fs::canonicalize(&config.root)
            .map_err(|e| init_error("cannot resolve storage root", Some(e)))?;
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging)
            .map_err(|e| init_error("cannot create staging directory", Some(e)))?;

        Ok(Self {
            root,
            staging,
            fsync: config.fsync,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 識別子を root 配下の物理パスへ変換
    ///
    /// ArtifactId はすでに正規化済みですが、ここでも各セグメントが
    /// 通常のパス要素であることを確認します。
    fn path_for(&self, id: &ArtifactId) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in id.segments() {
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(part)), None) => path.push(part),
                _ => {
                    return Err(StoreError::invalid_id(
                        id.as_str(),
                        "identifier resolves outside the storage root",
                    ));
                }
            }
        }
        if path == self.root || !path.starts_with(&self.root) {
            return Err(StoreError::invalid_id(
                id.as_str(),
                "identifier resolves outside the storage root",
            ));
        }
        Ok(path)
    }

    /// delete 後に空になった親ディレクトリを root の手前まで削除
    fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            // 空でなければ失敗するので、そこで止める
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

/// root からの相対パスを ArtifactId に戻す（予約名や非 UTF-8 は None）
fn relative_id(root: &Path, path: &Path) -> Option<ArtifactId> {
    let relative = path.strip_prefix(root).ok()?;
    let mut segments = Vec::new();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            return None;
        };
        match part.to_str() {
            Some(s) => segments.push(s),
            None => {
                warn!(path = %path.display(), "skipping non UTF-8 file name");
                return None;
            }
        }
    }
    ArtifactId::parse(&segments.join("/")).ok()
}

/// create_dir_all と persist の間に親が消された（または作り直し中だった）
fn is_pruned_parent(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::AlreadyExists
    )
}

/// rename をディレクトリエントリごと永続化する（失敗は書き込み自体を失敗にしない）
fn sync_dir(path: &Path) {
    if let Err(e) = File::open(path).and_then(|dir| dir.sync_all()) {
        warn!(dir = %path.display(), error = %e, "directory fsync failed");
    }
}

impl StorageDriver for FilesystemDriver {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn read(&self, id: &ArtifactId) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(id)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound
                        | io::ErrorKind::IsADirectory
                        | io::ErrorKind::NotADirectory
                ) =>
            {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(StoreError::io("read", id.as_str(), e)),
        }
    }

    fn write(&self, id: &ArtifactId, data: &[u8]) -> Result<(), StoreError> {
        let dest = self.path_for(id)?;
        let io_error = |e: io::Error| StoreError::io("write", id.as_str(), e);

        let mut staged = Builder::new()
            .prefix(".put-")
            .suffix(".tmp")
            .tempfile_in(&self.staging)
            .map_err(io_error)?;
        staged.write_all(data).map_err(io_error)?;
        if self.fsync {
            staged.as_file().sync_all().map_err(io_error)?;
        }

        // 親ディレクトリは別の識別子の delete に刈り取られることがあるので作り直す
        let mut attempt = 1;
        loop {
            let created = match dest.parent() {
                Some(parent) => fs::create_dir_all(parent),
                None => Ok(()),
            };
            if let Err(e) = created {
                if is_pruned_parent(&e) && attempt < PARENT_RETRIES {
                    attempt += 1;
                    continue;
                }
                return Err(io_error(e));
            }
            match staged.persist(&dest) {
                Ok(_) => break,
                Err(e) if is_pruned_parent(&e.error) && attempt < PARENT_RETRIES => {
                    attempt += 1;
                    staged = e.file;
                }
                Err(e) => return Err(io_error(e.error)),
            }
        }
        if attempt > 1 {
            debug!(artifact = %id, attempt, "recreated pruned parent directory");
        }

        if self.fsync
            && let Some(parent) = dest.parent()
        {
            sync_dir(parent);
        }
        debug!(artifact = %id, bytes = data.len(), "wrote artifact file");
        Ok(())
    }

    fn exists(&self, id: &ArtifactId) -> bool {
        self.path_for(id).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete(&self, id: &ArtifactId) -> Result<(), StoreError> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_parents(&path);
                debug!(artifact = %id, "removed artifact file");
                Ok(())
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(())
            }
            // ディレクトリは artifact ではない
            Err(_) if path.is_dir() => Ok(()),
            Err(e) => Err(StoreError::io("delete", id.as_str(), e)),
        }
    }

    fn list(&self, prefix: &ArtifactPrefix) -> Result<ArtifactIter, StoreError> {
        let mut start = self.root.clone();
        start.extend(prefix.dir_segments());
        if !start.is_dir() {
            return Ok(Box::new(std::iter::empty()));
        }

        let staging = self.staging.clone();
        let walker = WalkDir::new(&start)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| entry.path() != staging);

        let root = self.root.clone();
        let prefix = prefix.clone();
        let iter = walker.filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => relative_id(&root, entry.path())
                .filter(|id| prefix.matches(id))
                .map(Ok),
            Ok(_) => None,
            Err(e) => Some(Err(StoreError::io("list", prefix.as_str(), e.into()))),
        });
        Ok(Box::new(iter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn driver() -> (TempDir, FilesystemDriver) {
        let dir = TempDir::new().unwrap();
        let driver = FilesystemDriver::open(&FsConfig::new(dir.path())).unwrap();
        (dir, driver)
    }

    fn id(raw: &str) -> ArtifactId {
        ArtifactId::parse(raw).unwrap()
    }

    fn listed(driver: &FilesystemDriver, prefix: &str) -> Vec<String> {
        driver
            .list(&ArtifactPrefix::parse(prefix).unwrap())
            .unwrap()
            .map(|r| r.unwrap().to_string())
            .collect()
    }

    fn staged_files(driver: &FilesystemDriver) -> usize {
        fs::read_dir(&driver.staging).unwrap().count()
    }

    #[test]
    fn open_creates_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested/store");
        let driver = FilesystemDriver::open(&FsConfig::new(&root)).unwrap();
        assert!(root.is_dir());
        assert!(driver.root().join(STAGING_DIR).is_dir());
    }

    #[test]
    fn open_without_create_requires_existing_root() {
        let dir = TempDir::new().unwrap();
        let mut config = FsConfig::new(dir.path().join("missing"));
        config.create = false;
        let err = FilesystemDriver::open(&config).err().unwrap();
        assert!(matches!(err, StoreError::BackendInit { .. }), "{err}");
        assert!(!dir.path().join("missing").exists());
    }

    #[test]
    fn open_rejects_file_as_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = FilesystemDriver::open(&FsConfig::new(&file)).err().unwrap();
        assert!(matches!(err, StoreError::BackendInit { .. }), "{err}");
    }

    #[test]
    fn write_then_read_returns_same_bytes() {
        let (_dir, driver) = driver();
        driver.write(&id("a/b.bin"), &[1, 2, 3]).unwrap();
        assert_eq!(driver.read(&id("a/b.bin")).unwrap(), vec![1, 2, 3]);
        assert!(driver.root().join("a").join("b.bin").is_file());

        driver.write(&id("a/b.bin"), b"replaced").unwrap();
        assert_eq!(driver.read(&id("a/b.bin")).unwrap(), b"replaced");
        assert_eq!(staged_files(&driver), 0);
    }

    #[test]
    fn empty_payload_is_a_valid_artifact() {
        let (_dir, driver) = driver();
        driver.write(&id("empty"), &[]).unwrap();
        assert!(driver.exists(&id("empty")));
        assert!(driver.read(&id("empty")).unwrap().is_empty());
    }

    #[test]
    fn missing_and_directory_ids_are_not_found() {
        let (_dir, driver) = driver();
        driver.write(&id("a/b.bin"), b"x").unwrap();

        for raw in ["nope", "a", "a/b.bin/c"] {
            let err = driver.read(&id(raw)).unwrap_err();
            assert!(err.is_not_found(), "{raw}: {err}");
            assert!(!driver.exists(&id(raw)), "{raw}");
        }
    }

    #[test]
    fn failed_write_leaves_no_staged_file() {
        let (_dir, driver) = driver();
        driver.write(&id("a"), b"file").unwrap();

        // "a" はファイルなので "a/b" の親ディレクトリを作れない
        let err = driver.write(&id("a/b"), b"data").unwrap_err();
        assert!(matches!(err, StoreError::StorageIo { op: "write", .. }), "{err}");
        assert_eq!(staged_files(&driver), 0);
        assert_eq!(driver.read(&id("a")).unwrap(), b"file");
    }

    #[test]
    fn delete_is_idempotent_and_prunes_empty_directories() {
        let (_dir, driver) = driver();
        driver.write(&id("a/b/c.bin"), b"x").unwrap();
        driver.write(&id("a/keep.bin"), b"y").unwrap();

        driver.delete(&id("a/b/c.bin")).unwrap();
        driver.delete(&id("a/b/c.bin")).unwrap();
        assert!(!driver.root().join("a/b").exists());
        assert!(driver.root().join("a").is_dir());

        driver.delete(&id("a/keep.bin")).unwrap();
        assert!(!driver.root().join("a").exists());
        assert!(driver.root().is_dir());
        assert!(driver.root().join(STAGING_DIR).is_dir());

        // ディレクトリや存在しないパスの削除もエラーにならない
        driver.write(&id("d/e"), b"z").unwrap();
        driver.delete(&id("d")).unwrap();
        driver.delete(&id("x/y/z")).unwrap();
        assert!(driver.exists(&id("d/e")));
    }

    #[test]
    fn sibling_writes_survive_concurrent_pruning() {
        let (_dir, driver) = driver();
        let failures = AtomicUsize::new(0);

        // 同じディレクトリ内の別の識別子を put / delete し続け、
        // delete による親ディレクトリの刈り取りと put を競合させる
        std::thread::scope(|s| {
            for t in 0..8 {
                let driver = &driver;
                let failures = &failures;
                s.spawn(move || {
                    let sibling = id(&format!("d/e/f/x{t}"));
                    for _ in 0..300 {
                        if let Err(e) = driver.write(&sibling, b"payload") {
                            eprintln!("{e}");
                            failures.fetch_add(1, Ordering::SeqCst);
                        }
                        driver.delete(&sibling).unwrap();
                    }
                });
            }
        });

        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert_eq!(staged_files(&driver), 0);
    }

    #[test]
    fn pruned_parent_errors_are_retryable_kinds() {
        assert!(is_pruned_parent(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(is_pruned_parent(&io::Error::from(io::ErrorKind::AlreadyExists)));
        assert!(!is_pruned_parent(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn directory_fsync_failure_does_not_panic() {
        let dir = TempDir::new().unwrap();
        // 開けないディレクトリは warn に記録されるだけ
        sync_dir(&dir.path().join("missing"));
        sync_dir(dir.path());
    }

    #[test]
    fn list_filters_by_prefix_and_hides_staging() {
        let (_dir, driver) = driver();
        for raw in ["a/b.bin", "a/c/d.bin", "ab.bin", "b/x.bin"] {
            driver.write(&id(raw), b"x").unwrap();
        }
        fs::write(driver.staging.join(".put-leftover.tmp"), b"partial").unwrap();

        let mut all = listed(&driver, "");
        all.sort();
        assert_eq!(all, vec!["a/b.bin", "a/c/d.bin", "ab.bin", "b/x.bin"]);

        let mut under_a = listed(&driver, "a/");
        under_a.sort();
        assert_eq!(under_a, vec!["a/b.bin", "a/c/d.bin"]);

        let mut starts_with_a = listed(&driver, "a");
        starts_with_a.sort();
        assert_eq!(starts_with_a, vec!["a/b.bin", "a/c/d.bin", "ab.bin"]);

        assert_eq!(listed(&driver, "a/c"), vec!["a/c/d.bin"]);
        assert!(listed(&driver, "zzz/").is_empty());
        assert!(listed(&driver, STAGING_DIR).is_empty());
    }

    #[test]
    fn list_order_is_stable() {
        let (_dir, driver) = driver();
        for raw in ["z", "m/1", "a", "m/0", "b/c/d"] {
            driver.write(&id(raw), b"x").unwrap();
        }
        let first = listed(&driver, "");
        let second = listed(&driver, "");
        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
    }

    #[test]
    fn list_is_lazy_over_a_missing_directory() {
        let (_dir, driver) = driver();
        driver.write(&id("file"), b"x").unwrap();
        // プレフィックスのディレクトリ部分がファイルでも空になる
        assert!(listed(&driver, "file/").is_empty());
    }

    #[test]
    fn describe_names_the_root() {
        let (_dir, driver) = driver();
        assert!(driver.describe().starts_with("file://"));
    }
}
