use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::RwLock;

use crate::page::Page;

/// One slot in the buffer pool's frame array.
///
/// Pin count, dirty flag, and the page image live behind a `RwLock<Page>`
/// for the body (giving real parallel-reader admission) plus an
/// `AtomicI64` signed pin count: positive for N readers, negative for one
/// writer, used for diagnostics and eviction's pin check. The `RwLock` is
/// the actual mutual-exclusion mechanism; the pin count mirrors its state
/// rather than enforcing it independently.
pub(crate) struct Frame {
    pub(crate) body: RwLock<Page>,
    pub(crate) pin: AtomicI64,
    pub(crate) dirty: AtomicBool,
}

impl Frame {
    pub(crate) fn empty() -> Self {
        Frame {
            body: RwLock::new(Page::zeroed()),
            pin: AtomicI64::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    pub(crate) fn reset(&self, page: Page) {
        *self.body.write().unwrap() = page;
        self.pin.store(0, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub(crate) fn pin_count(&self) -> i64 {
        self.pin.load(Ordering::SeqCst)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Blocking read session: admits any number of concurrent readers,
    /// blocks while a writer holds the frame.
    pub(crate) fn start_read(&self) -> std::sync::RwLockReadGuard<'_, Page> {
        let guard = self.body.read().unwrap();
        self.pin.fetch_add(1, Ordering::SeqCst);
        guard
    }

    pub(crate) fn end_read(&self) {
        self.pin.fetch_sub(1, Ordering::SeqCst);
    }

    /// Blocking write session: exclusive with both readers and other
    /// writers.
    pub(crate) fn start_write(&self) -> std::sync::RwLockWriteGuard<'_, Page> {
        let guard = self.body.write().unwrap();
        self.pin.store(-1, Ordering::SeqCst);
        guard
    }

    pub(crate) fn end_write(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.pin.store(0, Ordering::SeqCst);
    }

    /// Non-blocking attempt to take exclusive ownership for eviction.
    /// Fails if any reader or writer currently holds the frame, even if
    /// the pin count momentarily reads zero (the count is advisory; the
    /// lock is authoritative).
    pub(crate) fn try_claim_for_eviction(
        &self,
    ) -> Option<std::sync::RwLockWriteGuard<'_, Page>> {
        self.body.try_write().ok()
    }
}
