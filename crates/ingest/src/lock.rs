use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

type VersionMutex = Arc<tokio::sync::Mutex<()>>;

/// Held for the whole ingest of one document version.
///
/// Releasing the last guard or waiter of a version removes its entry from the table.
pub struct VersionGuard {
    doc_version_id: String,
    waited_ms: u64,
    lock: VersionMutex,
    guard: Option<OwnedMutexGuard<()>>,
    locks: VersionLocks,
}

impl VersionGuard {
    #[must_use]
    pub fn doc_version_id(&self) -> &str {
        &self.doc_version_id
    }

    /// Time spent waiting for another ingest of the same version.
    #[must_use]
    pub fn waited_ms(&self) -> u64 {
        self.waited_ms
    }
}

impl Drop for VersionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.table();
        let idle = map
            .get(&self.doc_version_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.lock))
            // One reference in the table and one here: nobody else is waiting.
            && Arc::strong_count(&self.lock) == 2;
        if idle {
            map.remove(&self.doc_version_id);
        }
    }
}

/// In-process single-writer lock keyed by `doc_version_id`.
///
/// Different versions never block each other. The table only holds versions with an
/// ingest running or waiting.
#[derive(Debug, Default, Clone)]
pub struct VersionLocks {
    inner: Arc<Mutex<HashMap<String, VersionMutex>>>,
}

impl VersionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions currently locked or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, VersionMutex>> {
        match self.inner.lock() {
            Ok(map) => map,
            // The map only holds Arcs; a panic while holding it cannot corrupt entries.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn entry(&self, doc_version_id: &str) -> VersionMutex {
        self.table()
            .entry(doc_version_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn held(
        &self,
        doc_version_id: &str,
        lock: VersionMutex,
        guard: OwnedMutexGuard<()>,
        waited_ms: u64,
    ) -> VersionGuard {
        VersionGuard {
            doc_version_id: doc_version_id.to_string(),
            waited_ms,
            lock,
            guard: Some(guard),
            locks: self.clone(),
        }
    }

    pub async fn acquire(&self, doc_version_id: &str) -> VersionGuard {
        let lock = self.entry(doc_version_id);
        let start = Instant::now();
        let guard = lock.clone().lock_owned().await;
        let waited = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        if waited > 0 {
            log::debug!("waited {waited}ms for version lock {doc_version_id}");
        }
        self.held(doc_version_id, lock, guard, waited)
    }

    /// `None` when another ingest of the same version is running.
    #[must_use]
    pub fn try_acquire(&self, doc_version_id: &str) -> Option<VersionGuard> {
        let lock = self.entry(doc_version_id);
        let guard = lock.clone().try_lock_owned().ok()?;
        Some(self.held(doc_version_id, lock, guard, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn same_version_is_exclusive() {
        let locks = VersionLocks::new();
        let held = locks.acquire("P:v1").await;
        assert_eq!(held.doc_version_id(), "P:v1");
        assert!(locks.try_acquire("P:v1").is_none());
        assert!(locks.try_acquire("P:v2").is_some());
        drop(held);
        assert!(locks.try_acquire("P:v1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_resume_after_release() {
        let locks = VersionLocks::new();
        let held = locks.acquire("P:v1").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire("P:v1").await;
                (guard.doc_version_id().to_string(), guard.waited_ms())
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        drop(held);
        let (id, waited_ms) = waiter.await.unwrap();
        assert_eq!(id, "P:v1");
        assert!(waited_ms >= 50);
    }

    #[tokio::test]
    async fn released_versions_leave_the_table() {
        let locks = VersionLocks::new();
        for n in 0..5 {
            let guard = locks.acquire(&format!("P:v{n}")).await;
            assert_eq!(locks.len(), 1);
            drop(guard);
        }
        assert!(locks.is_empty());

        let held = locks.acquire("P:v1").await;
        assert!(locks.try_acquire("P:v1").is_none());
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_survives_while_a_waiter_is_queued() {
        let locks = VersionLocks::new();
        let held = locks.acquire("P:v1").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guard = locks.acquire("P:v1").await;
                tokio::time::sleep(Duration::from_millis(10)).await;
                drop(guard);
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        drop(held);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
