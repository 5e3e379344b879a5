//! A flat, single-page record store standing in for a full B+-tree. A data
//! page holds a linear array of fixed-size slots in its body, each either
//! empty or holding one `(key, value)` pair — enough to exercise
//! `db_insert`/`db_find`/`db_delete` against the buffer pool and lock
//! manager without needing key ordering, redistribution, or coalescence.
//!
//! Not a tree: no splitting, no key ordering, no multi-page chaining. A
//! full page simply refuses further distinct-key inserts.

use crate::config::{NODE_HEADER_SIZE, PAGE_SIZE};
use crate::error::{DbError, DbResult};
use crate::page::Page;

/// Largest value this store accepts. Values are stored inline, fixed-width,
/// so the slot layout never needs to move bytes between pages.
pub const VALUE_MAX: usize = 120;

const SLOT_SIZE: usize = 8 /* key */ + 4 /* len */ + VALUE_MAX;
/// Sentinel marking a slot unused. A real key may not equal this value,
/// the same trade-off `INVALID_PAGENUM` makes for page numbers.
const EMPTY_KEY: u64 = u64::MAX;

pub fn slot_count() -> usize {
    (PAGE_SIZE - NODE_HEADER_SIZE) / SLOT_SIZE
}

fn slot_offset(i: usize) -> usize {
    NODE_HEADER_SIZE + i * SLOT_SIZE
}

fn read_u64(bytes: &[u8], off: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[off..off + 8]);
    u64::from_le_bytes(buf)
}

fn write_u64(bytes: &mut [u8], off: usize, v: u64) {
    bytes[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn read_u32(bytes: &[u8], off: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[off..off + 4]);
    u32::from_le_bytes(buf)
}

fn write_u32(bytes: &mut [u8], off: usize, v: u32) {
    bytes[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn find_slot(bytes: &[u8], key: u64) -> Option<usize> {
    (0..slot_count()).find(|&i| read_u64(bytes, slot_offset(i)) == key)
}

/// Read a record's value, if present.
pub fn find(page: &Page, key: u64) -> Option<Vec<u8>> {
    let bytes = page.as_bytes();
    let i = find_slot(bytes, key)?;
    let off = slot_offset(i);
    let len = read_u32(bytes, off + 8) as usize;
    Some(bytes[off + 12..off + 12 + len].to_vec())
}

/// Insert or overwrite a record. Returns the previous value, if any (the
/// caller uses this to build an undo closure).
pub fn insert(page: &mut Page, key: u64, value: &[u8]) -> DbResult<Option<Vec<u8>>> {
    if key == EMPTY_KEY {
        return Err(DbError::Invariant(format!(
            "key {} is reserved as the empty-slot sentinel",
            EMPTY_KEY
        )));
    }
    if value.len() > VALUE_MAX {
        return Err(DbError::Invariant(format!(
            "value of {} bytes exceeds the {}-byte limit",
            value.len(),
            VALUE_MAX
        )));
    }

    let previous = find(page, key);
    let bytes = page.as_bytes_mut();

    let mut target = find_slot(bytes, key);
    let is_new = target.is_none();
    if target.is_none() {
        target = (0..slot_count()).find(|&i| read_u64(bytes, slot_offset(i)) == EMPTY_KEY);
    }
    let i = target.ok_or_else(|| DbError::Invariant("data page is full".to_string()))?;

    let off = slot_offset(i);
    write_u64(bytes, off, key);
    write_u32(bytes, off + 8, value.len() as u32);
    bytes[off + 12..off + 12 + value.len()].copy_from_slice(value);

    if is_new {
        let count = page.node_header().number_of_keys();
        page.node_header_mut().set_number_of_keys(count + 1);
    }
    Ok(previous)
}

/// Remove a record. Returns its value if it existed.
pub fn delete(page: &mut Page, key: u64) -> Option<Vec<u8>> {
    let previous = find(page, key);
    if previous.is_none() {
        return None;
    }
    let bytes = page.as_bytes_mut();
    let i = find_slot(bytes, key).expect("just checked find() returned Some");
    let off = slot_offset(i);
    write_u64(bytes, off, EMPTY_KEY);
    write_u32(bytes, off + 8, 0);

    let count = page.node_header().number_of_keys();
    page.node_header_mut().set_number_of_keys(count.saturating_sub(1));
    previous
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page() -> Page {
        let mut page = Page::zeroed();
        page.init_node(true);
        page
    }

    #[test]
    fn insert_then_find_round_trips() {
        let mut page = fresh_page();
        insert(&mut page, 1, b"a").unwrap();
        insert(&mut page, 2, b"b").unwrap();
        assert_eq!(find(&page, 1), Some(b"a".to_vec()));
        assert_eq!(find(&page, 2), Some(b"b".to_vec()));
        assert_eq!(page.node_header().number_of_keys(), 2);
    }

    #[test]
    fn insert_overwrites_existing_key_without_growing_count() {
        let mut page = fresh_page();
        insert(&mut page, 1, b"a").unwrap();
        let previous = insert(&mut page, 1, b"updated").unwrap();
        assert_eq!(previous, Some(b"a".to_vec()));
        assert_eq!(find(&page, 1), Some(b"updated".to_vec()));
        assert_eq!(page.node_header().number_of_keys(), 1);
    }

    #[test]
    fn delete_frees_the_slot_for_reuse() {
        let mut page = fresh_page();
        insert(&mut page, 1, b"a").unwrap();
        assert_eq!(delete(&mut page, 1), Some(b"a".to_vec()));
        assert_eq!(find(&page, 1), None);
        assert_eq!(page.node_header().number_of_keys(), 0);

        insert(&mut page, 2, b"b").unwrap();
        assert_eq!(page.node_header().number_of_keys(), 1);
    }

    #[test]
    fn value_over_the_limit_is_rejected() {
        let mut page = fresh_page();
        let big = vec![0u8; VALUE_MAX + 1];
        assert!(matches!(insert(&mut page, 1, &big), Err(DbError::Invariant(_))));
    }
}
