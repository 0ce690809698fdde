//! Worker registry: one slot per [`Category`].
//!
//! The coordinator owns a single [`WorkerRegistry`] and hands a clone of the
//! handle to every connection task.  All access goes through one mutex that
//! is held only for the slot read or write, never across socket I/O.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::category::Category;

/// Where a worker accepts direct client connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The registered worker for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEntry {
    pub category: Category,
    pub endpoint: Endpoint,
    pub available: bool,
}

/// Thread-safe worker table, last registration wins.
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    inner: Arc<Mutex<[Option<WorkerEntry>; 2]>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `endpoint` as the worker for `category`, replacing any previous
    /// entry, and mark it available.  Returns the entry it replaced.
    pub fn register(&self, category: Category, endpoint: Endpoint) -> Option<WorkerEntry> {
        let entry = WorkerEntry {
            category,
            endpoint,
            available: true,
        };
        self.slots()[category.index()].replace(entry)
    }

    /// Endpoint of the available worker for `category`, if any.
    pub fn lookup(&self, category: Category) -> Option<Endpoint> {
        self.slots()[category.index()]
            .as_ref()
            .filter(|entry| entry.available)
            .map(|entry| entry.endpoint.clone())
    }

    /// Mark the `category` slot unavailable, but only while it still holds
    /// `endpoint`.  Returns whether anything changed.
    pub fn clear_if(&self, category: Category, endpoint: &Endpoint) -> bool {
        let mut slots = self.slots();
        match slots[category.index()].as_mut() {
            Some(entry) if entry.available && entry.endpoint == *endpoint => {
                entry.available = false;
                true
            }
            _ => false,
        }
    }

    /// Copy of every slot, in [`Category::ALL`] order.
    pub fn snapshot(&self) -> Vec<Option<WorkerEntry>> {
        self.slots().to_vec()
    }

    // A panic while holding the lock cannot leave a slot half-written:
    // every mutation is a single assignment.
    fn slots(&self) -> MutexGuard<'_, [Option<WorkerEntry>; 2]> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("slots", &self.snapshot())
            .finish()
    }
}
