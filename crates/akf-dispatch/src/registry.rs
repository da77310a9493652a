//! Subservice registry: which capabilities are running and where.
//!
//! The record map is the only shared mutable state in the broker. It sits
//! behind a synchronous lock that is never held across an await. Launching
//! and terminating happen outside that lock, serialized per capability name
//! by an async mutex so concurrent starts of one name never double-launch
//! while different names proceed independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::launcher::Worker;

/// A running capability worker owned by the registry.
pub struct SubserviceRecord {
    name: String,
    port: u16,
    started_at: DateTime<Utc>,
    worker: Box<dyn Worker>,
}

impl SubserviceRecord {
    /// Record a freshly launched worker.
    pub fn new(name: impl Into<String>, worker: Box<dyn Worker>) -> Self {
        Self {
            name: name.into(),
            port: worker.port(),
            started_at: Utc::now(),
            worker,
        }
    }

    /// Capability name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allocated port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// When the worker was launched.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the worker is still running.
    pub fn is_alive(&mut self) -> bool {
        self.worker.is_alive()
    }

    /// Terminate the worker, consuming the record.
    pub async fn terminate(mut self) {
        if let Err(e) = self.worker.terminate().await {
            tracing::warn!(capability = %self.name, error = %e, "failed to terminate worker");
        }
    }
}

impl std::fmt::Debug for SubserviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubserviceRecord")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Outcome of looking up a running record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A live worker is listening on this port.
    Running(u16),
    /// No record exists.
    Absent,
}

/// Instance-owned table of running workers.
#[derive(Default)]
pub struct Registry {
    records: Mutex<HashMap<String, SubserviceRecord>>,
    name_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize lifecycle changes for one capability name.
    pub async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.name_locks.lock();
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Port of a live worker for `name`.
    ///
    /// A record whose worker has died is removed and reported as absent; the
    /// dead record is returned so the caller can reap it.
    pub fn lookup(&self, name: &str) -> (Lookup, Option<SubserviceRecord>) {
        let mut records = self.records.lock();
        match records.get_mut(name).map(|r| (r.is_alive(), r.port())) {
            Some((true, port)) => (Lookup::Running(port), None),
            Some((false, _)) => {
                tracing::warn!(capability = %name, "worker died, discarding stale record");
                (Lookup::Absent, records.remove(name))
            }
            None => (Lookup::Absent, None),
        }
    }

    /// Store a record, returning any record it replaced.
    pub fn insert(&self, record: SubserviceRecord) -> Option<SubserviceRecord> {
        self.records.lock().insert(record.name().to_string(), record)
    }

    /// Remove the record for `name`.
    pub fn remove(&self, name: &str) -> Option<SubserviceRecord> {
        self.records.lock().remove(name)
    }

    /// Whether a record exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.records.lock().contains_key(name)
    }

    /// Snapshot of name to port.
    pub fn snapshot(&self) -> BTreeMap<String, u16> {
        self.records
            .lock()
            .values()
            .map(|r| (r.name().to_string(), r.port()))
            .collect()
    }

    /// Take every record out of the registry.
    pub fn drain(&self) -> Vec<SubserviceRecord> {
        self.records.lock().drain().map(|(_, r)| r).collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct FakeWorker {
        port: u16,
        alive: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Worker for FakeWorker {
        fn port(&self) -> u16 {
            self.port
        }

        fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn terminate(&mut self) -> Result<()> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    fn record(name: &str, port: u16) -> (SubserviceRecord, Arc<AtomicBool>) {
        let alive = Arc::new(AtomicBool::new(true));
        let worker = FakeWorker {
            port,
            alive: Arc::clone(&alive),
        };
        (SubserviceRecord::new(name, Box::new(worker)), alive)
    }

    #[test]
    fn test_insert_lookup_snapshot() {
        let registry = Registry::new();
        let (a, _) = record("A", 1001);
        let (b, _) = record("B", 1002);
        registry.insert(a);
        registry.insert(b);

        assert_eq!(registry.lookup("A").0, Lookup::Running(1001));
        assert_eq!(registry.lookup("C").0, Lookup::Absent);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["B"], 1002);
    }

    #[test]
    fn test_dead_worker_is_discarded() {
        let registry = Registry::new();
        let (a, alive) = record("A", 1001);
        registry.insert(a);
        alive.store(false, Ordering::SeqCst);

        let (lookup, stale) = registry.lookup("A");
        assert_eq!(lookup, Lookup::Absent);
        assert_eq!(stale.map(|r| r.port()), Some(1001));
        assert!(!registry.contains("A"));
    }

    #[tokio::test]
    async fn test_drain_and_terminate() {
        let registry = Registry::new();
        let (a, alive) = record("A", 1001);
        registry.insert(a);

        for record in registry.drain() {
            record.terminate().await;
        }
        assert!(registry.is_empty());
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_name_lock_blocks_same_name_only() {
        let registry = Arc::new(Registry::new());
        let held = registry.lock_name("A").await;

        // A different name is not blocked
        let other = tokio::time::timeout(Duration::from_millis(100), registry.lock_name("B")).await;
        assert!(other.is_ok());

        // The same name waits until the first guard drops
        let same = tokio::time::timeout(Duration::from_millis(100), registry.lock_name("A")).await;
        assert!(same.is_err());

        drop(held);
        let same = tokio::time::timeout(Duration::from_millis(100), registry.lock_name("A")).await;
        assert!(same.is_ok());
    }
}
