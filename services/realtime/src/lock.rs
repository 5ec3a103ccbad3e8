//! Per-key lock manager serializing read-modify-write cycles.
//!
//! The map grows lazily and lock instances are reused for equal keys, so
//! any two operations presenting the same key are mutually exclusive while
//! unequal keys never contend. Guards release on drop, including on the
//! error path of the protected operation.
//!
//! Entries are never evicted. The key space here is the security universe
//! plus security+year pairs, both bounded in practice; an unbounded key
//! space would need reference-counted eviction.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct LockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive scope for `key`. Held across `.await` points for the whole
    /// read-modify-write-recompute-persist span.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn equal_keys_are_mutually_exclusive() {
        let locks = Arc::new(LockManager::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("VCB").await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unequal_keys_do_not_contend() {
        let locks = LockManager::new();
        let _a = locks.acquire("VCB").await;
        // Completes immediately despite the held guard on the other key.
        let _b = locks.acquire("ACB").await;
    }

    #[tokio::test]
    async fn locks_are_reused_per_key() {
        let locks = LockManager::new();
        drop(locks.acquire("VCB").await);
        drop(locks.acquire("VCB").await);
        drop(locks.acquire("VCB2023").await);
        assert_eq!(locks.tracked_keys(), 2);
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let locks = LockManager::new();
        {
            let _guard = locks.acquire("VCB").await;
        }
        // Re-acquisition succeeds once the scope above ends.
        let _guard = locks.acquire("VCB").await;
    }
}
