//! Per-diverter concurrency control.
//!
//! A physical diverter cannot honor two simultaneous directional commands.
//! Every actuation takes that diverter's exclusive (write) lock; status
//! polls take the shared (read) lock and may run concurrently. Without
//! this, a race between the main execution path and a rerouting attempt
//! could issue conflicting commands to the same actuator.
//!
//! Lock handles are created lazily with atomic get-or-insert semantics and
//! cached for the process lifetime, so there is exactly one lock identity
//! per diverter and no global lock serializing unrelated parcels.
//! `tokio::sync::RwLock` provides write-preferring FIFO acquisition, so a
//! slow reroute attempt cannot starve normal traffic.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Arena of per-diverter lock handles.
#[derive(Default)]
pub struct DiverterLockManager {
    locks: DashMap<String, Arc<DiverterLock>>,
}

impl DiverterLockManager {
    /// Creates an empty lock arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for a diverter, creating it on first use.
    ///
    /// Idempotent per ID: every caller sees the same lock instance for the
    /// life of the process.
    pub fn get_lock(&self, diverter_id: &str) -> Arc<DiverterLock> {
        self.locks
            .entry(diverter_id.to_string())
            .or_insert_with(|| Arc::new(DiverterLock::new(diverter_id)))
            .clone()
    }

    /// Number of diverters with a materialized lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns whether no locks have been materialized yet.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl fmt::Debug for DiverterLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiverterLockManager")
            .field("locks", &self.locks.len())
            .finish()
    }
}

/// Shared/exclusive lock for a single diverter.
pub struct DiverterLock {
    diverter_id: String,
    inner: Arc<RwLock<()>>,
}

impl DiverterLock {
    fn new(diverter_id: &str) -> Self {
        Self {
            diverter_id: diverter_id.to_string(),
            inner: Arc::new(RwLock::new(())),
        }
    }

    /// The diverter this lock guards.
    pub fn diverter_id(&self) -> &str {
        &self.diverter_id
    }

    /// Acquires exclusive access for an actuation command.
    ///
    /// The returned guard releases on drop, covering cancellation and
    /// panics. At most one write guard exists at a time, and never
    /// alongside read guards.
    pub async fn acquire_write(&self) -> DiverterWriteGuard {
        DiverterWriteGuard {
            diverter_id: self.diverter_id.clone(),
            _guard: Arc::clone(&self.inner).write_owned().await,
        }
    }

    /// Acquires shared access for a status poll.
    pub async fn acquire_read(&self) -> DiverterReadGuard {
        DiverterReadGuard {
            diverter_id: self.diverter_id.clone(),
            _guard: Arc::clone(&self.inner).read_owned().await,
        }
    }

    /// Tries to acquire exclusive access without waiting.
    pub fn try_acquire_write(&self) -> Option<DiverterWriteGuard> {
        let guard = Arc::clone(&self.inner).try_write_owned().ok()?;
        Some(DiverterWriteGuard {
            diverter_id: self.diverter_id.clone(),
            _guard: guard,
        })
    }
}

impl fmt::Debug for DiverterLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiverterLock")
            .field("diverter_id", &self.diverter_id)
            .finish()
    }
}

/// Exclusive guard over a diverter; released on drop.
pub struct DiverterWriteGuard {
    diverter_id: String,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl DiverterWriteGuard {
    /// The diverter this guard holds exclusively.
    pub fn diverter_id(&self) -> &str {
        &self.diverter_id
    }
}

impl fmt::Debug for DiverterWriteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiverterWriteGuard")
            .field("diverter_id", &self.diverter_id)
            .finish()
    }
}

/// Shared guard over a diverter; released on drop.
pub struct DiverterReadGuard {
    diverter_id: String,
    _guard: OwnedRwLockReadGuard<()>,
}

impl DiverterReadGuard {
    /// The diverter this guard holds shared access to.
    pub fn diverter_id(&self) -> &str {
        &self.diverter_id
    }
}
