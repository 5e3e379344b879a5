use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use log::debug;

use crate::config::{FILE_HEADER_PAGENUM, INVALID_PAGENUM, PAGE_SIZE};
use crate::error::DbResult;
use crate::page::Page;
use crate::types::{FileId, PageNum};

use super::fileid::file_id_from_path;

/// A paged file: one header page (page 0) followed by node/free-list
/// pages. Every mutating call preserves durability ordering: the body of
/// a page is written before any header write that references it.
///
/// The inner `File` is behind a `Mutex` because the buffer pool is the
/// only caller, and it already serializes `page_create`/`page_free` on a
/// given file by releasing the cached header frame first — the mutex
/// here is belt-and-suspenders against a future caller that forgets that
/// contract, not a concurrency mechanism callers should rely on for
/// correctness.
pub struct FileStore {
    file: Mutex<std::fs::File>,
    id: FileId,
    path: String,
}

impl FileStore {
    /// Open `path` read/write, creating and zero-initializing it (a
    /// single header page with an empty free list and no root) if it does
    /// not already exist.
    pub fn open(path: &str) -> DbResult<Self> {
        let id = file_id_from_path(path);
        let existed = Path::new(path).exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let store = FileStore {
            file: Mutex::new(file),
            id,
            path: path.to_string(),
        };

        if !existed {
            store.init_header()?;
        }

        Ok(store)
    }

    fn init_header(&self) -> DbResult<()> {
        {
            let file = self.file.lock().unwrap();
            file.set_len(PAGE_SIZE as u64)?;
        }
        let mut header = Page::zeroed();
        {
            let mut view = header.file_header_mut();
            view.set_free_page_number(PageNum(0));
            view.set_root_page_number(INVALID_PAGENUM);
            view.set_number_of_pages(0);
        }
        self.page_write(FILE_HEADER_PAGENUM, &header)
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn last_pagenum(&self) -> DbResult<PageNum> {
        let file = self.file.lock().unwrap();
        let len = file.metadata()?.len();
        Ok(PageNum(len / PAGE_SIZE as u64 - 1))
    }

    pub fn page_read(&self, pagenum: PageNum) -> DbResult<Page> {
        let mut file = self.file.lock().unwrap();
        let mut bytes = [0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(pagenum.offset()))?;
        file.read_exact(&mut bytes)?;
        Ok(Page::from_bytes(bytes))
    }

    pub fn page_write(&self, pagenum: PageNum, page: &Page) -> DbResult<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(pagenum.offset()))?;
        file.write_all(page.as_bytes())?;
        Ok(())
    }

    fn read_header(&self) -> DbResult<Page> {
        self.page_read(FILE_HEADER_PAGENUM)
    }

    fn write_header(&self, header: &Page) -> DbResult<()> {
        self.page_write(FILE_HEADER_PAGENUM, header)
    }

    /// Allocate a page, extending the file first if the free list is
    /// empty. Returns the allocated page number; the caller is
    /// responsible for `Page::init_node` before first tree use.
    pub fn page_create(&self) -> DbResult<PageNum> {
        let mut header = self.read_header()?;
        let mut free = header.file_header().free_page_number();

        if free == PageNum(0) {
            let extend_by = std::cmp::max(1, header.file_header().number_of_pages());
            self.page_extend_free(extend_by)?;
            header = self.read_header()?;
            free = header.file_header().free_page_number();
        }

        let pagenum = free;
        let popped = self.page_read(pagenum)?;
        let next_free = popped.free_page().next_page_number();

        header.file_header_mut().set_free_page_number(next_free);
        self.write_header(&header)?;

        debug!("page_create: file={} pagenum={}", self.id, pagenum);
        Ok(pagenum)
    }

    /// Amortize the syscall cost of file growth: extend by `num` pages at
    /// once and chain them all onto the free list in a single header
    /// rewrite, rather than growing one page per `page_create` call.
    fn page_extend_free(&self, num: u64) -> DbResult<()> {
        let last = self.last_pagenum()?;
        {
            let file = self.file.lock().unwrap();
            let new_len = (last + 1 + num).offset();
            file.set_len(new_len)?;
        }

        let mut header = self.read_header()?;
        let mut next = header.file_header().free_page_number();

        for i in 1..=num {
            let mut page = Page::zeroed();
            page.free_page_mut().set_next_page_number(next);
            let pagenum = last + i;
            self.page_write(pagenum, &page)?;
            next = pagenum;
        }

        header.file_header_mut().set_free_page_number(last + num);
        let total = header.file_header().number_of_pages();
        header.file_header_mut().set_number_of_pages(total + num);
        self.write_header(&header)
    }

    /// Free `pagenum`, threading it onto the head of the free list.
    ///
    /// The page is written as a free-list node *before* the header is
    /// repointed at it, so a crash between the two writes leaves the
    /// header pointing at the old (still-valid) free head rather than a
    /// dangling one.
    pub fn page_free(&self, pagenum: PageNum) -> DbResult<()> {
        let mut page = self.page_read(pagenum)?;
        let mut header = self.read_header()?;

        page.free_page_mut()
            .set_next_page_number(header.file_header().free_page_number());
        self.page_write(pagenum, &page)?;

        header.file_header_mut().set_free_page_number(pagenum);
        self.write_header(&header)?;

        debug!("page_free: file={} pagenum={}", self.id, pagenum);
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        debug!("closing file store id={} path={}", self.id, self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::INVALID_PAGENUM;

    fn temp_dir(name: &str) -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix(&format!("latchdb-filestore-{}-", name))
            .tempdir()
            .unwrap()
    }

    fn temp_path(dir: &tempfile::TempDir) -> String {
        dir.path().join("t.db").to_string_lossy().to_string()
    }

    #[test]
    fn open_on_fresh_path_zero_initializes_header() {
        let dir = temp_dir("fresh");
        let path = temp_path(&dir);
        let store = FileStore::open(&path).unwrap();

        let header = store.page_read(FILE_HEADER_PAGENUM).unwrap();
        assert_eq!(header.file_header().free_page_number(), PageNum(0));
        assert_eq!(header.file_header().root_page_number(), INVALID_PAGENUM);
        assert_eq!(header.file_header().number_of_pages(), 0);
        assert_eq!(store.last_pagenum().unwrap(), PageNum(0));
    }

    #[test]
    fn page_create_extends_and_reuses_free_list() {
        let dir = temp_dir("extend");
        let path = temp_path(&dir);
        let store = FileStore::open(&path).unwrap();

        let p1 = store.page_create().unwrap();
        let p2 = store.page_create().unwrap();
        assert_ne!(p1, p2);

        // free both, then allocate twice: LIFO order (most recently freed
        // comes back first).
        store.page_free(p1).unwrap();
        store.page_free(p2).unwrap();

        let reused1 = store.page_create().unwrap();
        let reused2 = store.page_create().unwrap();
        assert_eq!(reused1, p2);
        assert_eq!(reused2, p1);
    }

    #[test]
    fn page_read_write_round_trips() {
        let dir = temp_dir("rw");
        let path = temp_path(&dir);
        let store = FileStore::open(&path).unwrap();

        let pagenum = store.page_create().unwrap();
        let mut page = Page::zeroed();
        page.init_node(true);
        page.node_header_mut().set_number_of_keys(3);
        store.page_write(pagenum, &page).unwrap();

        let read_back = store.page_read(pagenum).unwrap();
        assert!(read_back.node_header().is_leaf());
        assert_eq!(read_back.node_header().number_of_keys(), 3);
    }

    #[test]
    fn reopening_an_existing_file_preserves_its_header() {
        let dir = temp_dir("reopen");
        let path = temp_path(&dir);
        {
            let store = FileStore::open(&path).unwrap();
            let pagenum = store.page_create().unwrap();
            let mut page = Page::zeroed();
            page.init_node(false);
            store.page_write(pagenum, &page).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert!(store.last_pagenum().unwrap() >= PageNum(1));
    }
}
