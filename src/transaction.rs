//! Transaction identity and state, and the table the engine façade uses to
//! look transactions up by id.
//!
//! A transaction is an id, a state, a FIFO list of currently-held locks,
//! and an optional pointer at the lock it is currently blocked on (the
//! edge the deadlock detector's wait-for graph walks).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;

use crate::error::DbResult;
use crate::lock::{Lock, LockManager};
use crate::types::TxnId;

/// A transaction's lifecycle.
///
/// A transaction starts `Idle` and only becomes `Running` once its first
/// lock is granted — marking the transaction `Running` happens as part of
/// the *grant*, not of `begin()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Running,
    Waiting,
    Aborted,
    Committed,
}

/// One inverse operation recorded so `abort` can undo a transaction's
/// writes. Opaque to the core: the caller supplies whatever closure
/// reverses its own mutation.
pub type UndoOp = Box<dyn FnMut() + Send>;

pub struct Transaction {
    id: TxnId,
    state: Mutex<TransactionState>,
    held_locks: Mutex<Vec<Arc<Lock>>>,
    waiting_on: Mutex<Option<Arc<Lock>>>,
    undo_log: Mutex<Vec<UndoOp>>,
}

impl Transaction {
    fn new(id: TxnId) -> Arc<Self> {
        Arc::new(Transaction {
            id,
            state: Mutex::new(TransactionState::Idle),
            held_locks: Mutex::new(Vec::new()),
            waiting_on: Mutex::new(None),
            undo_log: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set_state(&self, state: TransactionState) {
        *self.state.lock().unwrap() = state;
    }

    pub(crate) fn set_waiting_on(&self, lock: Option<Arc<Lock>>) {
        *self.waiting_on.lock().unwrap() = lock;
    }

    pub(crate) fn push_held_lock(&self, lock: Arc<Lock>) {
        self.held_locks.lock().unwrap().push(lock);
    }

    pub fn held_lock_count(&self) -> usize {
        self.held_locks.lock().unwrap().len()
    }

    /// Record an inverse operation; `abort` runs these in LIFO order.
    pub fn push_undo(&self, op: UndoOp) {
        self.undo_log.lock().unwrap().push(op);
    }

    /// Release every held lock and mark this transaction `Committed`. The
    /// undo log is discarded unapplied.
    pub fn commit(&self, lock_mgr: &LockManager) -> DbResult<()> {
        let locks: Vec<Arc<Lock>> = self.held_locks.lock().unwrap().drain(..).collect();
        for lock in locks {
            lock_mgr.release_lock(&lock)?;
        }
        self.undo_log.lock().unwrap().clear();
        self.set_state(TransactionState::Committed);
        debug!("transaction {} committed", self.id);
        Ok(())
    }

    /// Apply the undo log in reverse, release every held lock, and mark
    /// this transaction `Aborted`. Releasing a lock may promote a waiter
    /// on the same resource, cascading the abort's effect to stalled
    /// peers.
    pub fn abort(&self, lock_mgr: &LockManager) -> DbResult<()> {
        {
            let mut undo = self.undo_log.lock().unwrap();
            while let Some(mut op) = undo.pop() {
                op();
            }
        }
        let locks: Vec<Arc<Lock>> = self.held_locks.lock().unwrap().drain(..).collect();
        self.set_state(TransactionState::Aborted);
        for lock in locks {
            lock_mgr.release_lock(&lock)?;
        }
        debug!("transaction {} aborted", self.id);
        Ok(())
    }
}

/// Registry of live transactions, keyed by id. Owned by the engine façade,
/// which builds `begin_trx`/`end_trx`/`abort_trx` on top of it.
pub struct TransactionTable {
    next_id: AtomicU64,
    live: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        TransactionTable {
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self) -> Arc<Transaction> {
        let id = TxnId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let trx = Transaction::new(id);
        self.live.lock().unwrap().insert(id, trx.clone());
        debug!("transaction {} started", id);
        trx
    }

    pub fn get(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.live.lock().unwrap().get(&id).cloned()
    }

    pub fn end(&self, id: TxnId, lock_mgr: &LockManager) -> DbResult<()> {
        if let Some(trx) = self.live.lock().unwrap().remove(&id) {
            trx.commit(lock_mgr)?;
        }
        Ok(())
    }

    pub fn abort(&self, id: TxnId, lock_mgr: &LockManager) -> DbResult<()> {
        if let Some(trx) = self.live.lock().unwrap().remove(&id) {
            trx.abort(lock_mgr)?;
        }
        Ok(())
    }
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}
