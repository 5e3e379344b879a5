use std::time::Duration;

use crate::types::PageNum;

/// Size in bytes of every page, including page 0 (the file header).
pub const PAGE_SIZE: usize = 4096;

/// Size in bytes of the leading header on every page after page 0.
pub const NODE_HEADER_SIZE: usize = 128;

/// Sentinel meaning "no page"/"no parent"/"no root": the max value of the
/// page number's backing integer type.
pub const INVALID_PAGENUM: PageNum = PageNum(u64::MAX);

/// Page number of the file header page; never allocatable, never on the
/// free list, never a tree node.
pub const FILE_HEADER_PAGENUM: PageNum = PageNum(0);

/// Poll interval used by `LockManager::require_lock`'s timed condvar wait.
/// Deadlock detection runs once per expired wait, so this is also the
/// detector's base scan granularity.
pub const LOCK_WAIT: Duration = Duration::from_millis(50);

/// Runtime configuration for a `latch-db` engine instance, passed into
/// `init_db`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of frames in the buffer pool.
    pub buffer_capacity: usize,
    /// Poll interval for lock acquisition; overridable so deadlock tests
    /// don't have to wait on the production interval.
    pub lock_wait: Duration,
}

impl EngineConfig {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            lock_wait: LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(64)
    }
}
