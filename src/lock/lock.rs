use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::transaction::Transaction;
use crate::types::TxnId;

use super::hid::HierarchicalId;

/// Lock mode. `Idle` only ever appears as a [`super::manager::LockCell`]'s
/// aggregate mode when nothing currently holds it; an individual [`Lock`]
/// is always `Shared` or `Exclusive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Idle,
    Shared,
    Exclusive,
}

impl LockMode {
    /// Whether a new request for `requested` may be granted while the
    /// module is currently at `self`. Grantable iff idle, or both sides
    /// are shared.
    pub fn compatible_with(self, requested: LockMode) -> bool {
        matches!(
            (self, requested),
            (LockMode::Idle, _) | (LockMode::Shared, LockMode::Shared)
        )
    }
}

/// One granted-or-waiting lock request.
///
/// `wait` starts `true` for a request that had to queue and flips to
/// `false` the moment the lock manager promotes it — the transaction
/// parked in `require_lock` polls this flag after every wake to decide
/// whether it was actually granted or just spuriously woken.
///
/// The transaction back-reference is a [`Weak`] pointer rather than an
/// [`Arc`]: a transaction's held-lock list already owns its locks via
/// `Arc`, and a strong cycle there would never deallocate. The deadlock
/// detector upgrades it only for the instant it needs to inspect or abort
/// the owning transaction.
pub struct Lock {
    pub hid: HierarchicalId,
    pub mode: LockMode,
    pub txn_id: TxnId,
    trx: Weak<Transaction>,
    wait: AtomicBool,
}

impl Lock {
    pub fn new(
        hid: HierarchicalId,
        mode: LockMode,
        trx: &Arc<Transaction>,
        waiting: bool,
    ) -> Self {
        Lock {
            hid,
            mode,
            txn_id: trx.id(),
            trx: Arc::downgrade(trx),
            wait: AtomicBool::new(waiting),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.wait.load(Ordering::SeqCst)
    }

    /// The transaction this lock belongs to, if it still exists.
    pub fn transaction(&self) -> Option<Arc<Transaction>> {
        self.trx.upgrade()
    }

    /// Promote a queued lock: clears its `wait` flag. Called by
    /// `release_lock` while holding the manager's mutex.
    pub(crate) fn run(&self) {
        self.wait.store(false, Ordering::SeqCst);
    }
}
