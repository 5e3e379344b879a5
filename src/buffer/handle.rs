use std::sync::Arc;

use crate::error::{DbError, DbResult};
use crate::file::FileStore;
use crate::page::Page;
use crate::types::{FileId, PageNum};

use super::pool::BufferPool;

/// A scoped handle to one buffered page. Holding a handle pins nothing by
/// itself; pinning is scoped to the duration of a `with_read`/`with_write`
/// call.
///
/// A handle's frame index can go stale between calls (the pool may evict
/// it once pin count drops to zero), so every session starts by
/// reconfirming ownership and reloading if needed.
pub struct BufferHandle {
    pool: Arc<BufferPool>,
    file: Arc<FileStore>,
    pagenum: PageNum,
    frame_idx: usize,
}

impl BufferHandle {
    pub(crate) fn new(
        pool: Arc<BufferPool>,
        file: Arc<FileStore>,
        pagenum: PageNum,
        frame_idx: usize,
    ) -> Self {
        BufferHandle {
            pool,
            file,
            pagenum,
            frame_idx,
        }
    }

    pub fn pagenum(&self) -> PageNum {
        self.pagenum
    }

    pub fn file_id(&self) -> FileId {
        self.file.id()
    }

    pub(crate) fn frame_index(&self) -> usize {
        self.frame_idx
    }

    /// Whether `frame_idx` still backs this handle's `(file, pagenum)`.
    fn check(&self) -> bool {
        self.pool.owns(self.frame_idx, self.file.id(), self.pagenum)
    }

    /// Reconfirm this handle's (file, pagenum) still owns `frame_idx`,
    /// reloading through the pool if it was evicted in the meantime. A
    /// reload that can't find or re-establish a backing frame means the
    /// handle no longer names anything live.
    fn reload(&mut self) -> DbResult<()> {
        if self.check() {
            return Ok(());
        }
        let fresh = self
            .pool
            .buffering(&self.file, self.pagenum)
            .map_err(|_| DbError::InvalidHandle)?;
        self.frame_idx = fresh.frame_idx;
        Ok(())
    }

    /// Shared-read session: any number of readers may hold the frame at
    /// once; never marks the frame dirty, but still moves it to the MRU
    /// end of the eviction chain on completion, same as a write session.
    pub fn with_read<R>(&mut self, f: impl FnOnce(&Page) -> DbResult<R>) -> DbResult<R> {
        self.reload()?;
        let frame = self.pool.frame(self.frame_idx);
        let guard = frame.start_read();
        let result = f(&guard);
        drop(guard);
        frame.end_read();
        self.pool.touch_mru(self.frame_idx);
        result
    }

    /// Exclusive-write session: blocks out every reader and writer for
    /// the duration, marks the frame dirty, and moves it to the MRU end
    /// of the eviction chain once the callback returns.
    pub fn with_write<R>(&mut self, f: impl FnOnce(&mut Page) -> DbResult<R>) -> DbResult<R> {
        self.reload()?;
        let frame = self.pool.frame(self.frame_idx);
        let mut guard = frame.start_write();
        let result = f(&mut guard);
        drop(guard);
        frame.end_write();
        self.pool.touch_mru(self.frame_idx);
        result
    }

    #[cfg(test)]
    pub(crate) fn pin_for_test(&mut self) -> DbResult<std::sync::RwLockReadGuard<'_, Page>> {
        self.reload()?;
        Ok(self.pool.frame(self.frame_idx).start_read())
    }
}
