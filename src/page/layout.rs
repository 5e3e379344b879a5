use crate::config::{INVALID_PAGENUM, PAGE_SIZE};
use crate::types::PageNum;

// File header (page 0) offsets.
const FH_FREE_PAGE: usize = 0;
const FH_ROOT_PAGE: usize = 8;
const FH_NUM_PAGES: usize = 16;

// Regular page (page > 0) header offsets.
const PH_PARENT_PAGE: usize = 0;
const PH_IS_LEAF: usize = 8;
const PH_NUM_KEYS: usize = 12;
const PH_SPECIAL_PAGE: usize = 120;

/// A single `PAGE_SIZE`-byte page image, serialized flat with no internal
/// padding and little-endian integers on persistence boundaries.
///
/// `Page` is a dumb byte buffer: reading or writing typed fields goes
/// through one of [`FileHeaderView`], [`NodeHeaderView`], or
/// [`FreePageView`], which borrow the same bytes under different layouts.
#[derive(Clone)]
pub struct Page(pub [u8; PAGE_SIZE]);

impl Page {
    pub fn zeroed() -> Self {
        Page([0u8; PAGE_SIZE])
    }

    pub fn from_bytes(bytes: [u8; PAGE_SIZE]) -> Self {
        Page(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.0
    }

    pub fn file_header(&self) -> FileHeaderView<'_> {
        FileHeaderView(&self.0)
    }

    pub fn file_header_mut(&mut self) -> FileHeaderViewMut<'_> {
        FileHeaderViewMut(&mut self.0)
    }

    pub fn node_header(&self) -> NodeHeaderView<'_> {
        NodeHeaderView(&self.0)
    }

    pub fn node_header_mut(&mut self) -> NodeHeaderViewMut<'_> {
        NodeHeaderViewMut(&mut self.0)
    }

    pub fn free_page(&self) -> FreePageView<'_> {
        FreePageView(&self.0)
    }

    pub fn free_page_mut(&mut self) -> FreePageViewMut<'_> {
        FreePageViewMut(&mut self.0)
    }

    /// Zero the header and mark this page as a freshly allocated leaf or
    /// internal node. Callers must invoke this before the page is handed
    /// to the B+-tree layer for the first time — the buffer pool cannot do
    /// it on the caller's behalf because only the caller knows whether the
    /// new page is a leaf.
    pub fn init_node(&mut self, is_leaf: bool) {
        let mut header = self.node_header_mut();
        header.set_is_leaf(is_leaf);
        header.set_number_of_keys(0);
        header.set_parent_page_number(INVALID_PAGENUM);
        header.set_special_page_number(INVALID_PAGENUM);
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read-only view of the file header (page 0).
pub struct FileHeaderView<'a>(&'a [u8; PAGE_SIZE]);

impl<'a> FileHeaderView<'a> {
    pub fn free_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, FH_FREE_PAGE))
    }

    pub fn root_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, FH_ROOT_PAGE))
    }

    pub fn number_of_pages(&self) -> u64 {
        read_u64(self.0, FH_NUM_PAGES)
    }
}

/// Mutable view of the file header (page 0).
pub struct FileHeaderViewMut<'a>(&'a mut [u8; PAGE_SIZE]);

impl<'a> FileHeaderViewMut<'a> {
    pub fn free_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, FH_FREE_PAGE))
    }

    pub fn root_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, FH_ROOT_PAGE))
    }

    pub fn number_of_pages(&self) -> u64 {
        read_u64(self.0, FH_NUM_PAGES)
    }

    pub fn set_free_page_number(&mut self, pagenum: PageNum) {
        write_u64(self.0, FH_FREE_PAGE, pagenum.0);
    }

    pub fn set_root_page_number(&mut self, pagenum: PageNum) {
        write_u64(self.0, FH_ROOT_PAGE, pagenum.0);
    }

    pub fn set_number_of_pages(&mut self, count: u64) {
        write_u64(self.0, FH_NUM_PAGES, count);
    }
}

/// Read-only view of a regular node page's leading header.
pub struct NodeHeaderView<'a>(&'a [u8; PAGE_SIZE]);

impl<'a> NodeHeaderView<'a> {
    pub fn parent_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, PH_PARENT_PAGE))
    }

    pub fn is_leaf(&self) -> bool {
        read_u32(self.0, PH_IS_LEAF) != 0
    }

    pub fn number_of_keys(&self) -> u32 {
        read_u32(self.0, PH_NUM_KEYS)
    }

    pub fn special_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, PH_SPECIAL_PAGE))
    }
}

/// Mutable view of a regular node page's leading header.
pub struct NodeHeaderViewMut<'a>(&'a mut [u8; PAGE_SIZE]);

impl<'a> NodeHeaderViewMut<'a> {
    pub fn parent_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, PH_PARENT_PAGE))
    }

    pub fn is_leaf(&self) -> bool {
        read_u32(self.0, PH_IS_LEAF) != 0
    }

    pub fn number_of_keys(&self) -> u32 {
        read_u32(self.0, PH_NUM_KEYS)
    }

    pub fn special_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, PH_SPECIAL_PAGE))
    }

    pub fn set_parent_page_number(&mut self, pagenum: PageNum) {
        write_u64(self.0, PH_PARENT_PAGE, pagenum.0);
    }

    pub fn set_is_leaf(&mut self, is_leaf: bool) {
        write_u32(self.0, PH_IS_LEAF, is_leaf as u32);
    }

    pub fn set_number_of_keys(&mut self, count: u32) {
        write_u32(self.0, PH_NUM_KEYS, count);
    }

    pub fn set_special_page_number(&mut self, pagenum: PageNum) {
        write_u64(self.0, PH_SPECIAL_PAGE, pagenum.0);
    }
}

/// Free-list node view: overlays `next_page_number` onto the same 8 bytes
/// the regular header uses for `special_page_number`.
pub struct FreePageView<'a>(&'a [u8; PAGE_SIZE]);

impl<'a> FreePageView<'a> {
    pub fn next_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, PH_SPECIAL_PAGE))
    }
}

pub struct FreePageViewMut<'a>(&'a mut [u8; PAGE_SIZE]);

impl<'a> FreePageViewMut<'a> {
    pub fn next_page_number(&self) -> PageNum {
        PageNum(read_u64(self.0, PH_SPECIAL_PAGE))
    }

    pub fn set_next_page_number(&mut self, pagenum: PageNum) {
        write_u64(self.0, PH_SPECIAL_PAGE, pagenum.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_header_round_trips() {
        let mut page = Page::zeroed();
        {
            let mut h = page.file_header_mut();
            h.set_free_page_number(PageNum(7));
            h.set_root_page_number(INVALID_PAGENUM);
            h.set_number_of_pages(3);
        }
        let h = page.file_header();
        assert_eq!(h.free_page_number(), PageNum(7));
        assert_eq!(h.root_page_number(), INVALID_PAGENUM);
        assert_eq!(h.number_of_pages(), 3);
    }

    #[test]
    fn node_header_round_trips() {
        let mut page = Page::zeroed();
        page.init_node(true);
        {
            let mut h = page.node_header_mut();
            h.set_parent_page_number(PageNum(42));
            h.set_number_of_keys(5);
            h.set_special_page_number(PageNum(99));
        }
        let h = page.node_header();
        assert!(h.is_leaf());
        assert_eq!(h.parent_page_number(), PageNum(42));
        assert_eq!(h.number_of_keys(), 5);
        assert_eq!(h.special_page_number(), PageNum(99));
    }

    #[test]
    fn free_page_overlays_special_page_number() {
        let mut page = Page::zeroed();
        page.node_header_mut().set_special_page_number(PageNum(123));
        assert_eq!(page.free_page().next_page_number(), PageNum(123));

        page.free_page_mut().set_next_page_number(PageNum(456));
        assert_eq!(page.node_header().special_page_number(), PageNum(456));
    }

    #[test]
    fn header_fields_are_little_endian_on_the_wire() {
        let mut page = Page::zeroed();
        page.file_header_mut()
            .set_free_page_number(PageNum(0x0102030405060708));
        assert_eq!(
            &page.as_bytes()[0..8],
            &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]
        );
    }
}
