use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::config::FILE_HEADER_PAGENUM;
use crate::error::{DbError, DbResult};
use crate::file::FileStore;
use crate::types::{FileId, PageNum};

use super::frame::Frame;
use super::handle::BufferHandle;
use super::policy::{EvictionPolicy, Lru, UsageChain};

struct Owner {
    file: Arc<FileStore>,
    pagenum: PageNum,
}

struct PoolMeta {
    owners: Vec<Option<Owner>>,
    prev_use: Vec<isize>,
    next_use: Vec<isize>,
    lru: isize,
    mru: isize,
    num_buffer: usize,
}

/// Bounded pool of page frames shared by every open file.
///
/// The pool metadata (owner table, LRU/MRU linkage, occupancy count) lives
/// behind one mutex: every mutating pool operation, including the
/// eviction write-back, runs with that mutex held. This trades a little
/// parallelism (two unrelated misses can't load concurrently) for a
/// buffer-uniqueness guarantee with no race window at all — stricter than
/// strictly required at any single quiescent moment, but simpler to
/// reason about and test deterministically. Frame *content* access (the
/// scoped read/write sessions callers actually run their logic under)
/// does not hold this mutex — see [`BufferHandle`].
pub struct BufferPool {
    frames: Vec<Frame>,
    meta: Mutex<PoolMeta>,
    capacity: usize,
    policy: Box<dyn EvictionPolicy>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Self::with_policy(capacity, Box::new(Lru))
    }

    pub fn with_policy(capacity: usize, policy: Box<dyn EvictionPolicy>) -> Arc<Self> {
        let frames = (0..capacity).map(|_| Frame::empty()).collect();
        let meta = Mutex::new(PoolMeta {
            owners: (0..capacity).map(|_| None).collect(),
            prev_use: vec![-1; capacity],
            next_use: vec![-1; capacity],
            lru: -1,
            mru: -1,
            num_buffer: 0,
        });
        Arc::new(BufferPool {
            frames,
            meta,
            capacity,
            policy,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently owning a page; exposed for tests
    /// checking the "no lost frames" / "uniqueness" invariants.
    pub fn len(&self) -> usize {
        self.meta.lock().unwrap().num_buffer
    }

    fn find(meta: &PoolMeta, file_id: FileId, pagenum: PageNum) -> Option<usize> {
        meta.owners.iter().position(|o| {
            o.as_ref()
                .map(|o| o.file.id() == file_id && o.pagenum == pagenum)
                .unwrap_or(false)
        })
    }

    /// Whether frame `idx` still backs `(file_id, pagenum)`. Used by
    /// [`BufferHandle::check`] to tell a stale handle (its frame got
    /// evicted and reused for something else) from a live one before
    /// deciding whether a reload is needed.
    pub(crate) fn owns(&self, idx: usize, file_id: FileId, pagenum: PageNum) -> bool {
        let meta = self.meta.lock().unwrap();
        meta.owners[idx]
            .as_ref()
            .map(|o| o.file.id() == file_id && o.pagenum == pagenum)
            .unwrap_or(false)
    }

    fn unlink(meta: &mut PoolMeta, idx: usize) {
        let prev = meta.prev_use[idx];
        let next = meta.next_use[idx];
        if next == -1 {
            meta.mru = prev;
        } else {
            meta.prev_use[next as usize] = prev;
        }
        if prev == -1 {
            meta.lru = next;
        } else {
            meta.next_use[prev as usize] = next;
        }
    }

    fn append_mru(meta: &mut PoolMeta, idx: usize, unlink_first: bool) {
        if unlink_first {
            Self::unlink(meta, idx);
        }
        meta.prev_use[idx] = meta.mru;
        meta.next_use[idx] = -1;
        if meta.mru != -1 {
            meta.next_use[meta.mru as usize] = idx as isize;
        }
        meta.mru = idx as isize;
        if meta.lru == -1 {
            meta.lru = idx as isize;
        }
    }

    pub(crate) fn touch_mru(&self, idx: usize) {
        let mut meta = self.meta.lock().unwrap();
        Self::append_mru(&mut meta, idx, true);
    }

    pub(crate) fn frame(&self, idx: usize) -> &Frame {
        &self.frames[idx]
    }

    /// Write back a dirty frame and detach it from the pool, blocking
    /// until any in-flight reader/writer session on it drains. Used where
    /// the caller targets one specific, already-identified frame (a known
    /// cached page being explicitly released) and must not walk away
    /// without releasing it.
    fn release_block(&self, meta: &mut PoolMeta, idx: usize) -> DbResult<()> {
        let guard = self.frames[idx].body.write().unwrap();
        self.finish_release(meta, idx, guard)
    }

    /// Write back a dirty frame and detach it from the pool, but only if
    /// no in-flight reader/writer session currently holds it. Returns
    /// `Ok(false)` instead of blocking when the frame is busy: a
    /// `pin_count() == 0` candidate is advisory (see
    /// [`Frame::try_claim_for_eviction`]) and a fresh session may have
    /// started on it in the window between the scan and this call, so the
    /// eviction scan must be free to move on to the next candidate rather
    /// than stall behind it.
    fn try_release_for_eviction(&self, meta: &mut PoolMeta, idx: usize) -> DbResult<bool> {
        let guard = match self.frames[idx].try_claim_for_eviction() {
            Some(guard) => guard,
            None => return Ok(false),
        };
        self.finish_release(meta, idx, guard)?;
        Ok(true)
    }

    fn finish_release(
        &self,
        meta: &mut PoolMeta,
        idx: usize,
        guard: std::sync::RwLockWriteGuard<'_, crate::page::Page>,
    ) -> DbResult<()> {
        let owner = meta.owners[idx]
            .take()
            .ok_or_else(|| DbError::Invariant(format!("release_block: frame {} has no owner", idx)))?;
        Self::unlink(meta, idx);
        meta.num_buffer -= 1;

        let frame = &self.frames[idx];
        if frame.is_dirty() {
            owner.file.page_write(owner.pagenum, &guard)?;
        }
        drop(guard);
        frame.dirty.store(false, Ordering::SeqCst);
        frame.pin.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn release_owned(&self, meta: &mut PoolMeta, file_id: FileId, pagenum: PageNum) -> DbResult<()> {
        if let Some(idx) = Self::find(meta, file_id, pagenum) {
            self.release_block(meta, idx)?;
        }
        Ok(())
    }

    /// Find the first unpinned frame, evicting it, or reuse a never-used
    /// slot if the pool has not yet reached capacity.
    fn alloc(&self, meta: &mut PoolMeta) -> DbResult<usize> {
        if meta.num_buffer < self.capacity {
            if let Some(idx) = meta.owners.iter().position(|o| o.is_none()) {
                meta.num_buffer += 1;
                return Ok(idx);
            }
            return Err(DbError::Invariant(
                "alloc: num_buffer under capacity but no free slot".to_string(),
            ));
        }

        loop {
            let chain = UsageChain {
                lru: meta.lru,
                mru: meta.mru,
                next_use: &meta.next_use,
                prev_use: &meta.prev_use,
            };
            let mut candidate = self.policy.init(&chain);
            while candidate != -1 && self.frames[candidate as usize].pin_count() != 0 {
                let chain = UsageChain {
                    lru: meta.lru,
                    mru: meta.mru,
                    next_use: &meta.next_use,
                    prev_use: &meta.prev_use,
                };
                candidate = self.policy.next(&chain, candidate);
            }

            if candidate == -1 {
                warn!("buffer pool exhausted: all {} frames pinned", self.capacity);
                return Err(DbError::PoolExhausted);
            }

            let idx = candidate as usize;
            if self.try_release_for_eviction(meta, idx)? {
                meta.num_buffer += 1;
                return Ok(idx);
            }
            // Lost the race: a session started on `idx` between the scan
            // above and the claim attempt. Rescan from the top since the
            // usage chain may have changed underneath us.
        }
    }

    /// Return a handle to `pagenum` of `file`, loading it from disk on a
    /// miss.
    pub fn buffering(
        self: &Arc<Self>,
        file: &Arc<FileStore>,
        pagenum: PageNum,
    ) -> DbResult<BufferHandle> {
        let mut meta = self.meta.lock().unwrap();
        if let Some(idx) = Self::find(&meta, file.id(), pagenum) {
            return Ok(BufferHandle::new(self.clone(), file.clone(), pagenum, idx));
        }

        let idx = self.alloc(&mut meta)?;
        let page = match file.page_read(pagenum) {
            Ok(page) => page,
            Err(e) => {
                meta.owners[idx] = None;
                meta.num_buffer -= 1;
                return Err(e);
            }
        };
        self.frames[idx].reset(page);
        meta.owners[idx] = Some(Owner {
            file: file.clone(),
            pagenum,
        });
        Self::append_mru(&mut meta, idx, false);

        debug!("buffering: file={} pagenum={} frame={}", file.id(), pagenum, idx);
        Ok(BufferHandle::new(self.clone(), file.clone(), pagenum, idx))
    }

    /// Allocate a brand-new page on `file` and return a handle to it.
    pub fn new_page(self: &Arc<Self>, file: &Arc<FileStore>) -> DbResult<BufferHandle> {
        {
            let mut meta = self.meta.lock().unwrap();
            // The cached header frame would go stale once the file store
            // mutates the header under its own read-modify-write.
            self.release_owned(&mut meta, file.id(), FILE_HEADER_PAGENUM)?;
        }

        let mut meta = self.meta.lock().unwrap();
        let idx = self.alloc(&mut meta)?;

        let pagenum = match file.page_create() {
            Ok(p) => p,
            Err(e) => {
                meta.owners[idx] = None;
                meta.num_buffer -= 1;
                return Err(e);
            }
        };
        let page = match file.page_read(pagenum) {
            Ok(p) => p,
            Err(e) => {
                meta.owners[idx] = None;
                meta.num_buffer -= 1;
                return Err(e);
            }
        };
        self.frames[idx].reset(page);
        meta.owners[idx] = Some(Owner {
            file: file.clone(),
            pagenum,
        });
        Self::append_mru(&mut meta, idx, false);

        debug!("new_page: file={} pagenum={} frame={}", file.id(), pagenum, idx);
        Ok(BufferHandle::new(self.clone(), file.clone(), pagenum, idx))
    }

    /// Free `pagenum` on `file`, releasing any cached frame for it (and
    /// for the file header, whose free-list head is about to change)
    /// before delegating to the file store.
    pub fn free_page(&self, file: &Arc<FileStore>, pagenum: PageNum) -> DbResult<()> {
        let mut meta = self.meta.lock().unwrap();
        self.release_owned(&mut meta, file.id(), pagenum)?;
        self.release_owned(&mut meta, file.id(), FILE_HEADER_PAGENUM)?;
        drop(meta);
        file.page_free(pagenum)
    }

    /// Release every frame belonging to `file_id`, writing back dirty
    /// ones. Used when a file is closed.
    pub fn release_file(&self, file_id: FileId) -> DbResult<()> {
        let mut meta = self.meta.lock().unwrap();
        let idxs: Vec<usize> = meta
            .owners
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().filter(|o| o.file.id() == file_id).map(|_| i))
            .collect();
        for idx in idxs {
            self.release_block(&mut meta, idx)?;
        }
        Ok(())
    }

    /// Release every frame in the pool, writing back anything dirty.
    pub fn shutdown(&self) -> DbResult<()> {
        let mut meta = self.meta.lock().unwrap();
        for idx in 0..self.capacity {
            if meta.owners[idx].is_some() {
                self.release_block(&mut meta, idx)?;
            }
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix(&format!("latchdb-pool-{}-", name))
            .tempdir()
            .unwrap()
    }

    fn temp_path(dir: &tempfile::TempDir) -> String {
        dir.path().join("t.db").to_string_lossy().to_string()
    }

    #[test]
    fn miss_then_hit_reuses_the_same_frame() {
        let dir = temp_dir("miss-hit");
        let path = temp_path(&dir);
        let file = Arc::new(FileStore::open(&path).unwrap());
        let pool = BufferPool::new(3);

        let pagenum = file.page_create().unwrap();
        let h1 = pool.buffering(&file, pagenum).unwrap();
        let h2 = pool.buffering(&file, pagenum).unwrap();
        assert_eq!(h1.frame_index(), h2.frame_index());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn eviction_writes_back_dirty_frames() {
        let dir = temp_dir("evict");
        let path = temp_path(&dir);
        let file = Arc::new(FileStore::open(&path).unwrap());
        let pool = BufferPool::new(2);

        let p1 = file.page_create().unwrap();
        let p2 = file.page_create().unwrap();
        let p3 = file.page_create().unwrap();

        {
            let mut h1 = pool.buffering(&file, p1).unwrap();
            h1.with_write(|page| {
                page.init_node(true);
                page.node_header_mut().set_number_of_keys(7);
                Ok(())
            })
            .unwrap();
        }
        pool.buffering(&file, p2).unwrap();
        // third distinct page forces eviction of p1 (LRU) since pool
        // capacity is 2 and both p1/p2 are unpinned after their sessions
        // end.
        pool.buffering(&file, p3).unwrap();

        let on_disk = file.page_read(p1).unwrap();
        assert_eq!(on_disk.node_header().number_of_keys(), 7);
    }

    #[test]
    fn capacity_exhaustion_when_everything_pinned() {
        let dir = temp_dir("exhausted");
        let path = temp_path(&dir);
        let file = Arc::new(FileStore::open(&path).unwrap());
        let pool = BufferPool::new(1);

        let p1 = file.page_create().unwrap();
        let p2 = file.page_create().unwrap();

        let mut h1 = pool.buffering(&file, p1).unwrap();
        let _guard = h1.pin_for_test();

        let result = pool.buffering(&file, p2);
        assert!(matches!(result, Err(DbError::PoolExhausted)));
    }
}
