//! A cloneable, thread-safe handle around one [`AllocEngine`].

use crate::{
    AllocEngine, BlockState, EngineConfig, EngineSnapshot, FileInfo, HistoryEntry, Inconsistency,
    Statistics,
};
use esim_error::Result;
use esim_types::InodeId;
use parking_lot::Mutex;
use std::sync::Arc;

/// Every call takes the engine lock for its whole duration, so operations
/// from different threads are serialized and never interleave.
#[derive(Debug, Clone, Default)]
pub struct SharedEngine {
    inner: Arc<Mutex<AllocEngine>>,
}

impl SharedEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::from_engine(AllocEngine::new(config))
    }

    #[must_use]
    pub fn from_engine(engine: AllocEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn create_file(&self, name: &str, size_bytes: u64) -> Result<InodeId> {
        self.inner.lock().create_file(name, size_bytes)
    }

    pub fn delete_file(&self, id: InodeId) -> Result<()> {
        self.inner.lock().delete_file(id)
    }

    pub fn delete_by_name(&self, name: &str) -> Result<InodeId> {
        self.inner.lock().delete_by_name(name)
    }

    #[must_use]
    pub fn list_files(&self) -> Vec<FileInfo> {
        self.inner.lock().list_files()
    }

    #[must_use]
    pub fn disk_fragmentation(&self) -> f64 {
        self.inner.lock().disk_fragmentation()
    }

    #[must_use]
    pub fn disk_snapshot(&self) -> Vec<BlockState> {
        self.inner.lock().disk_snapshot()
    }

    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.inner.lock().statistics()
    }

    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        self.inner.lock().snapshot()
    }

    /// Copy of the history log at the time of the call.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.lock().history().entries().to_vec()
    }

    #[must_use]
    pub fn verify(&self) -> Vec<Inconsistency> {
        self.inner.lock().verify()
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Run `f` against the engine while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&AllocEngine) -> R) -> R {
        f(&self.inner.lock())
    }
}
