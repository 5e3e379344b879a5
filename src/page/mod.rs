//! Fixed-size page images and the typed views over their byte layout.
//!
//! Every page on disk is exactly [`PAGE_SIZE`](crate::config::PAGE_SIZE)
//! bytes. Page 0 of a file is the file header; every other page carries a
//! [`NODE_HEADER_SIZE`](crate::config::NODE_HEADER_SIZE)-byte header
//! followed by a body the B+-tree layer owns. This module only knows about
//! bytes and offsets — it has no notion of keys, records, or tree shape.

mod layout;

pub use layout::{FileHeaderView, FreePageView, NodeHeaderView, Page};
