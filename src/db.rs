//! Engine façade: wires the file store, buffer pool, lock manager, and
//! transaction table behind the public operations
//! (`init_db`/`shutdown_db`/`db_open`/`db_close`/`db_insert`/`db_find`/
//! `db_delete`/`begin_trx`/`end_trx`/`abort_trx`), behind a global
//! singleton realized with `once_cell` rather than an `unsafe`
//! raw-pointer.
//!
//! `db_insert`/`db_find`/`db_delete` accept an `Option<TxnId>` (see
//! DESIGN.md for the reasoning): `None` auto-commits a fresh transaction
//! per call, `Some(id)` joins an already-begun one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::buffer::BufferPool;
use crate::config::{EngineConfig, FILE_HEADER_PAGENUM, INVALID_PAGENUM};
use crate::error::{DbError, DbResult};
use crate::file::FileStore;
use crate::lock::{HierarchicalId, LockManager, LockMode};
use crate::record;
use crate::transaction::{Transaction, TransactionTable};
use crate::types::{PageNum, TableId, TxnId};

struct Engine {
    pool: Arc<BufferPool>,
    lock_mgr: Arc<LockManager>,
    txn_table: Arc<TransactionTable>,
    tables: Mutex<HashMap<TableId, Arc<FileStore>>>,
    next_table_id: AtomicU64,
}

impl Engine {
    fn new(config: EngineConfig) -> Self {
        Engine {
            pool: BufferPool::new(config.buffer_capacity),
            lock_mgr: Arc::new(LockManager::new(config.lock_wait)),
            txn_table: Arc::new(TransactionTable::new()),
            tables: Mutex::new(HashMap::new()),
            next_table_id: AtomicU64::new(1),
        }
    }

    fn table_file(&self, table_id: TableId) -> DbResult<Arc<FileStore>> {
        self.tables
            .lock()
            .unwrap()
            .get(&table_id)
            .cloned()
            .ok_or_else(|| DbError::Invariant(format!("unknown table {}", table_id)))
    }

    /// Ensure the file has a data page and return its page number,
    /// allocating one (and recording it in the file header) on first use.
    fn ensure_data_page(&self, file: &Arc<FileStore>) -> DbResult<PageNum> {
        let root = {
            let mut header = self.pool.buffering(file, FILE_HEADER_PAGENUM)?;
            header.with_read(|p| Ok(p.file_header().root_page_number()))?
        };
        if root != INVALID_PAGENUM {
            return Ok(root);
        }

        let mut data = self.pool.new_page(file)?;
        let pagenum = data.pagenum();
        data.with_write(|p| {
            p.init_node(true);
            Ok(())
        })?;

        let mut header = self.pool.buffering(file, FILE_HEADER_PAGENUM)?;
        header.with_write(|p| {
            p.file_header_mut().set_root_page_number(pagenum);
            Ok(())
        })?;
        Ok(pagenum)
    }

    fn open(&self, path: &str) -> DbResult<TableId> {
        let file = Arc::new(FileStore::open(path)?);
        self.ensure_data_page(&file)?;
        let id = TableId(self.next_table_id.fetch_add(1, Ordering::SeqCst));
        self.tables.lock().unwrap().insert(id, file);
        Ok(id)
    }

    fn close(&self, table_id: TableId) -> DbResult<()> {
        let file = self
            .tables
            .lock()
            .unwrap()
            .remove(&table_id)
            .ok_or_else(|| DbError::Invariant(format!("unknown table {}", table_id)))?;
        self.pool.release_file(file.id())
    }

    /// Run `body` under `trx` if given, else under a fresh auto-committed
    /// (or auto-aborted, on failure) transaction.
    fn with_trx<R>(
        &self,
        trx: Option<TxnId>,
        body: impl FnOnce(&Arc<Transaction>) -> DbResult<R>,
    ) -> DbResult<R> {
        match trx {
            Some(id) => {
                let t = self
                    .txn_table
                    .get(id)
                    .ok_or_else(|| DbError::Invariant(format!("unknown transaction {}", id)))?;
                body(&t)
            }
            None => {
                let t = self.txn_table.begin();
                let result = body(&t);
                if result.is_ok() {
                    self.txn_table.end(t.id(), &self.lock_mgr)?;
                } else {
                    self.txn_table.abort(t.id(), &self.lock_mgr)?;
                }
                result
            }
        }
    }

    fn insert(
        &self,
        table_id: TableId,
        key: u64,
        value: &[u8],
        trx: Option<TxnId>,
    ) -> DbResult<()> {
        let file = self.table_file(table_id)?;
        let pagenum = self.ensure_data_page(&file)?;
        self.with_trx(trx, |t| {
            let hid = HierarchicalId::new(table_id, pagenum, key);
            self.lock_mgr.require_lock(t, hid, LockMode::Exclusive)?;

            let mut handle = self.pool.buffering(&file, pagenum)?;
            let previous = handle.with_write(|page| record::insert(page, key, value))?;

            let pool = self.pool.clone();
            let file = file.clone();
            t.push_undo(Box::new(move || {
                let _ = pool.buffering(&file, pagenum).and_then(|mut h| {
                    h.with_write(|page| match &previous {
                        Some(old) => record::insert(page, key, old).map(|_| ()),
                        None => {
                            record::delete(page, key);
                            Ok(())
                        }
                    })
                });
            }));
            Ok(())
        })
    }

    fn find(&self, table_id: TableId, key: u64, trx: Option<TxnId>) -> DbResult<Option<Vec<u8>>> {
        let file = self.table_file(table_id)?;
        let pagenum = self.ensure_data_page(&file)?;
        self.with_trx(trx, |t| {
            let hid = HierarchicalId::new(table_id, pagenum, key);
            self.lock_mgr.require_lock(t, hid, LockMode::Shared)?;

            let mut handle = self.pool.buffering(&file, pagenum)?;
            handle.with_read(|page| Ok(record::find(page, key)))
        })
    }

    fn delete(&self, table_id: TableId, key: u64, trx: Option<TxnId>) -> DbResult<bool> {
        let file = self.table_file(table_id)?;
        let pagenum = self.ensure_data_page(&file)?;
        self.with_trx(trx, |t| {
            let hid = HierarchicalId::new(table_id, pagenum, key);
            self.lock_mgr.require_lock(t, hid, LockMode::Exclusive)?;

            let mut handle = self.pool.buffering(&file, pagenum)?;
            let previous = handle.with_write(|page| Ok(record::delete(page, key)))?;

            if let Some(old) = previous.clone() {
                let pool = self.pool.clone();
                let file = file.clone();
                t.push_undo(Box::new(move || {
                    let _ = pool
                        .buffering(&file, pagenum)
                        .and_then(|mut h| h.with_write(|page| record::insert(page, key, &old).map(|_| ())));
                }));
            }
            Ok(previous.is_some())
        })
    }
}

static ENGINE: Lazy<Mutex<Option<Arc<Engine>>>> = Lazy::new(|| Mutex::new(None));

fn engine() -> DbResult<Arc<Engine>> {
    ENGINE
        .lock()
        .unwrap()
        .clone()
        .ok_or_else(|| DbError::Invariant("engine not initialized; call init_db first".to_string()))
}

/// Initialize the global engine instance. Replaces any previously
/// initialized one (callers are expected to `shutdown_db` first).
pub fn init_db(config: EngineConfig) {
    *ENGINE.lock().unwrap() = Some(Arc::new(Engine::new(config)));
}

/// Write back every dirty frame and tear down the global engine instance.
/// Safe to call again after a fresh `init_db`.
pub fn shutdown_db() -> DbResult<()> {
    let engine = ENGINE.lock().unwrap().take();
    if let Some(engine) = engine {
        engine.pool.shutdown()?;
    }
    Ok(())
}

pub fn db_open(path: &str) -> DbResult<TableId> {
    engine()?.open(path)
}

pub fn db_close(table_id: TableId) -> DbResult<()> {
    engine()?.close(table_id)
}

pub fn db_insert(table_id: TableId, key: u64, value: &[u8], trx: Option<TxnId>) -> DbResult<()> {
    engine()?.insert(table_id, key, value, trx)
}

pub fn db_find(table_id: TableId, key: u64, trx: Option<TxnId>) -> DbResult<Option<Vec<u8>>> {
    engine()?.find(table_id, key, trx)
}

pub fn db_delete(table_id: TableId, key: u64, trx: Option<TxnId>) -> DbResult<bool> {
    engine()?.delete(table_id, key, trx)
}

pub fn begin_trx() -> DbResult<TxnId> {
    Ok(engine()?.txn_table.begin().id())
}

pub fn end_trx(trx_id: TxnId) -> DbResult<()> {
    let e = engine()?;
    e.txn_table.end(trx_id, &e.lock_mgr)
}

pub fn abort_trx(trx_id: TxnId) -> DbResult<()> {
    let e = engine()?;
    e.txn_table.abort(trx_id, &e.lock_mgr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // init_db/shutdown_db touch shared global state; serialize the tests
    // that exercise them.
    static GLOBAL: StdMutex<()> = StdMutex::new(());

    fn temp_dir(name: &str) -> tempfile::TempDir {
        tempfile::Builder::new()
            .prefix(&format!("latchdb-engine-{}-", name))
            .tempdir()
            .unwrap()
    }

    fn temp_path(dir: &tempfile::TempDir) -> String {
        dir.path().join("t.db").to_string_lossy().to_string()
    }

    #[test]
    fn insert_find_delete_round_trip_with_auto_commit() {
        let _guard = GLOBAL.lock().unwrap();
        let dir = temp_dir("roundtrip");
        let path = temp_path(&dir);

        init_db(EngineConfig::new(8));
        let table = db_open(&path).unwrap();

        db_insert(table, 1, b"a", None).unwrap();
        db_insert(table, 2, b"b", None).unwrap();
        db_insert(table, 3, b"c", None).unwrap();

        assert_eq!(db_find(table, 2, None).unwrap(), Some(b"b".to_vec()));
        assert!(db_delete(table, 1, None).unwrap());
        assert_eq!(db_find(table, 1, None).unwrap(), None);

        db_close(table).unwrap();
        shutdown_db().unwrap();
    }

    #[test]
    fn reopen_after_shutdown_observes_prior_writes() {
        let _guard = GLOBAL.lock().unwrap();
        let dir = temp_dir("reopen");
        let path = temp_path(&dir);

        init_db(EngineConfig::new(4));
        let table = db_open(&path).unwrap();
        db_insert(table, 42, b"durable", None).unwrap();
        db_close(table).unwrap();
        shutdown_db().unwrap();

        init_db(EngineConfig::new(4));
        let table = db_open(&path).unwrap();
        assert_eq!(db_find(table, 42, None).unwrap(), Some(b"durable".to_vec()));
        db_close(table).unwrap();
        shutdown_db().unwrap();
    }

    #[test]
    fn explicit_transaction_abort_undoes_its_writes() {
        let _guard = GLOBAL.lock().unwrap();
        let dir = temp_dir("abort");
        let path = temp_path(&dir);

        init_db(EngineConfig::new(4));
        let table = db_open(&path).unwrap();
        db_insert(table, 1, b"original", None).unwrap();

        let trx = begin_trx().unwrap();
        db_insert(table, 1, b"overwritten", Some(trx)).unwrap();
        db_insert(table, 2, b"new", Some(trx)).unwrap();
        abort_trx(trx).unwrap();

        assert_eq!(db_find(table, 1, None).unwrap(), Some(b"original".to_vec()));
        assert_eq!(db_find(table, 2, None).unwrap(), None);

        db_close(table).unwrap();
        shutdown_db().unwrap();
    }
}
