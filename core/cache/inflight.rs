use crate::fingerprint::ActionKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Makes sure at most one execution per `ActionKey` is in progress at any time.
///
/// A worker holds the guard for a key from cache lookup until the result is stored, so a second
/// worker with the same key waits for the first and then finds its result in the cache.
///
/// A key is forgotten again once its last guard is dropped and nobody is waiting on it.
///
#[derive(Debug, Default)]
pub struct InflightExecutions {
    locks: Arc<DashMap<ActionKey, Arc<Mutex<()>>>>,
}

impl InflightExecutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &ActionKey) -> InflightGuard {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        InflightGuard {
            guard: Some(lock.lock_owned().await),
            key: key.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Number of keys that are locked or waited on right now.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[derive(Debug)]
pub struct InflightGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: ActionKey,
    locks: Arc<DashMap<ActionKey, Arc<Mutex<()>>>>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        // Release the lock before counting, the guard keeps its own reference to it.
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_keys_run_one_at_a_time() {
        let inflight = std::sync::Arc::new(InflightExecutions::new());
        let running = std::sync::Arc::new(AtomicUsize::new(0));
        let max_running = std::sync::Arc::new(AtomicUsize::new(0));
        let key = ActionKey::from_hex("abcd");

        let mut handles = vec![];
        for _ in 0..4 {
            let inflight = inflight.clone();
            let running = running.clone();
            let max_running = max_running.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let _guard = inflight.acquire(&key).await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn keys_are_forgotten_once_released() {
        let inflight = InflightExecutions::new();
        let a = inflight.acquire(&ActionKey::from_hex("aa")).await;
        let b = inflight.acquire(&ActionKey::from_hex("bb")).await;
        assert_eq!(inflight.len(), 2);

        drop(a);
        assert_eq!(inflight.len(), 1);
        drop(b);
        assert!(inflight.is_empty());

        let _again = inflight.acquire(&ActionKey::from_hex("aa")).await;
        assert_eq!(inflight.len(), 1);
    }

    #[tokio::test]
    async fn keys_with_waiters_are_kept() {
        let inflight = std::sync::Arc::new(InflightExecutions::new());
        let key = ActionKey::from_hex("abcd");
        let first = inflight.acquire(&key).await;

        let waiter = {
            let inflight = inflight.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = inflight.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(inflight.len(), 1);
        waiter.await.unwrap();
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_wait_on_each_other() {
        let inflight = InflightExecutions::new();
        let _a = inflight.acquire(&ActionKey::from_hex("aa")).await;
        let b = tokio::time::timeout(
            Duration::from_secs(1),
            inflight.acquire(&ActionKey::from_hex("bb")),
        )
        .await;
        assert!(b.is_ok());
    }
}
