//! A disk-backed storage kernel: fixed-size pages, a paged file store with
//! free-list reuse, a bounded buffer pool with pin-counted frames, and a
//! hierarchical shared/exclusive lock manager with deadlock detection tied
//! to transaction abort.
//!
//! This crate deliberately stops short of a B+-tree: [`record`] stands in
//! for that layer with a flat single-page slot array, just enough for
//! [`db::db_insert`]/[`db::db_find`]/[`db::db_delete`] to exercise the
//! kernel underneath end to end.

pub mod buffer;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod lock;
pub mod logging;
pub mod page;
pub mod record;
pub mod transaction;
pub mod types;

pub use config::EngineConfig;
pub use db::{
    abort_trx, begin_trx, db_close, db_delete, db_find, db_insert, db_open, end_trx, init_db,
    shutdown_db,
};
pub use error::{DbError, DbResult};
pub use types::{FileId, PageNum, TableId, TxnId};
