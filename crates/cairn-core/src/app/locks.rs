//! WriteLocks - 識別子ごとの書き込みロック
//!
//! 同じ識別子への put / delete / update は直列化し、
//! 異なる識別子への書き込みは互いに待たない。
//! 使われていないエントリはテーブルから取り除くので、テーブルは
//! 「いま書き込み中の識別子」の数だけしか大きくならない。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::ArtifactId;

#[derive(Default)]
pub struct WriteLocks {
    table: Mutex<HashMap<ArtifactId, Arc<Mutex<()>>>>,
}

impl WriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// `id` のロックを保持したまま `f` を実行
    pub fn with<T>(&self, id: &ArtifactId, f: impl FnOnce() -> T) -> T {
        // `f` が panic してもエントリは片付ける
        let release = Release {
            locks: self,
            id,
            slot: self.table.lock().entry(id.clone()).or_default().clone(),
        };

        let _guard = release.slot.lock();
        f()
    }

    /// 現在テーブルにある識別子の数
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

/// スロットを手放し、待っている人がいなければテーブルから外す
struct Release<'a> {
    locks: &'a WriteLocks,
    id: &'a ArtifactId,
    slot: Arc<Mutex<()>>,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut table = self.locks.table.lock();
        // テーブル側とこのガードの 2 つだけなら、待っている人はいない
        if Arc::strong_count(&self.slot) == 2 {
            table.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn same_id_is_serialized() {
        let locks = WriteLocks::new();
        let id = ArtifactId::parse("a").unwrap();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    locks.with(&id, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn different_ids_do_not_block_each_other() {
        let locks = WriteLocks::new();
        let a = ArtifactId::parse("a").unwrap();
        let b = ArtifactId::parse("b").unwrap();

        // a のロック中に b を取れなければデッドロックする
        let value = locks.with(&a, || locks.with(&b, || 42));
        assert_eq!(value, 42);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn panicking_writer_releases_its_entry() {
        let locks = WriteLocks::new();
        let id = ArtifactId::parse("boom").unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            locks.with(&id, || panic!("writer failed"))
        }));
        assert!(outcome.is_err());
        assert!(locks.is_empty());

        // 同じ識別子はその後も使える
        assert_eq!(locks.with(&id, || 7), 7);
        assert!(locks.is_empty());
    }
}
