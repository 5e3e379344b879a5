//! The per-resource lock table: grant rules, the wait/wake protocol, and
//! the hook into deadlock detection.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::transaction::{Transaction, TransactionState};

use super::deadlock::{choose_victim, find_cycle, DeadlockDetector};
use super::hid::HierarchicalId;
use super::lock::{Lock, LockMode};

/// Per-hierarchical-id state: the resource module (called `LockCell`
/// here to avoid colliding with the `Lock` type name).
struct LockCell {
    mode: LockMode,
    running: Vec<Arc<Lock>>,
    waiting: VecDeque<Arc<Lock>>,
    condvar: Arc<Condvar>,
}

impl LockCell {
    fn new() -> Self {
        LockCell {
            mode: LockMode::Idle,
            running: Vec::new(),
            waiting: VecDeque::new(),
            condvar: Arc::new(Condvar::new()),
        }
    }
}

type LockTable = HashMap<HierarchicalId, LockCell>;

/// Hierarchical lock manager: one instance per engine, shared by every
/// open table (hierarchical ids already carry the table id).
pub struct LockManager {
    table: Mutex<LockTable>,
    lock_wait: Duration,
    detector: Mutex<DeadlockDetector>,
}

impl LockManager {
    pub fn new(lock_wait: Duration) -> Self {
        LockManager {
            table: Mutex::new(HashMap::new()),
            lock_wait,
            detector: Mutex::new(DeadlockDetector::new(lock_wait)),
        }
    }

    /// Acquire a hierarchical lock for `trx`, blocking (with periodic
    /// deadlock detection) until it is granted or `trx` is chosen as a
    /// deadlock victim.
    pub fn require_lock(
        &self,
        trx: &Arc<Transaction>,
        hid: HierarchicalId,
        mode: LockMode,
    ) -> DbResult<Arc<Lock>> {
        let mut guard = self.table.lock().unwrap();
        let grantable = guard.entry(hid).or_insert_with(LockCell::new).mode.compatible_with(mode);
        let lock = Arc::new(Lock::new(hid, mode, trx, !grantable));

        if grantable {
            let cell = guard.get_mut(&hid).unwrap();
            cell.running.push(lock.clone());
            cell.mode = mode;
            drop(guard);

            trx.set_state(TransactionState::Running);
            trx.push_held_lock(lock.clone());
            debug!("lock granted immediately: trx={} hid={:?} mode={:?}", trx.id(), hid, mode);
            return Ok(lock);
        }

        trx.set_state(TransactionState::Waiting);
        trx.set_waiting_on(Some(lock.clone()));
        let condvar = {
            let cell = guard.get_mut(&hid).unwrap();
            cell.waiting.push_back(lock.clone());
            cell.condvar.clone()
        };
        debug!("lock queued: trx={} hid={:?} mode={:?}", trx.id(), hid, mode);

        loop {
            let (new_guard, timeout) = condvar.wait_timeout(guard, self.lock_wait).unwrap();
            guard = new_guard;

            if trx.state() == TransactionState::Aborted {
                Self::dequeue_waiter(&mut guard, hid, &lock);
                drop(guard);
                return Err(DbError::Deadlock);
            }

            if timeout.timed_out() {
                drop(guard);
                self.detect_and_release()?;
                guard = self.table.lock().unwrap();

                if trx.state() == TransactionState::Aborted {
                    Self::dequeue_waiter(&mut guard, hid, &lock);
                    drop(guard);
                    return Err(DbError::Deadlock);
                }
            }

            if !lock.is_waiting() {
                break;
            }
        }
        drop(guard);

        trx.set_state(TransactionState::Running);
        trx.set_waiting_on(None);
        trx.push_held_lock(lock.clone());
        debug!("lock granted after wait: trx={} hid={:?} mode={:?}", trx.id(), hid, mode);
        Ok(lock)
    }

    fn dequeue_waiter(guard: &mut LockTable, hid: HierarchicalId, lock: &Arc<Lock>) {
        if let Some(cell) = guard.get_mut(&hid) {
            cell.waiting.retain(|l| !Arc::ptr_eq(l, lock));
        }
    }

    /// Release a previously granted lock. If other running locks remain
    /// on the resource, this is a no-op; otherwise the head of the
    /// waiting list (if any) is promoted and every waiter is woken so it
    /// can re-check whether it was the one promoted.
    pub fn release_lock(&self, lock: &Arc<Lock>) -> DbResult<()> {
        let mut guard = self.table.lock().unwrap();
        let hid = lock.hid;

        let condvar = {
            let cell = guard.get_mut(&hid).ok_or_else(|| {
                DbError::Invariant(format!("release_lock: no resource module for {:?}", hid))
            })?;
            cell.running.retain(|l| !Arc::ptr_eq(l, lock));

            if !cell.running.is_empty() {
                None
            } else if let Some(promoted) = cell.waiting.pop_front() {
                promoted.run();
                cell.mode = promoted.mode;
                cell.running.push(promoted);
                Some(cell.condvar.clone())
            } else {
                cell.mode = LockMode::Idle;
                None
            }
        };
        drop(guard);

        if let Some(condvar) = condvar {
            condvar.notify_all();
        }
        Ok(())
    }

    /// Run one round of deadlock detection if the detector's back-off
    /// schedule says enough time has elapsed since the last scan. If a
    /// cycle is found, aborts a deterministically chosen victim, which
    /// releases its held locks and may cascade further wakeups.
    pub fn detect_and_release(&self) -> DbResult<()> {
        let should_scan = self.detector.lock().unwrap().schedule();
        if !should_scan {
            return Ok(());
        }

        let (edges, txns) = {
            let guard = self.table.lock().unwrap();
            self.build_wait_for_graph(&guard)
        };

        let cycle = find_cycle(&edges);
        match cycle {
            Some(cycle) => {
                self.detector.lock().unwrap().on_cycle_found();
                let victim_id = choose_victim(&cycle, &txns);
                if let Some(victim) = txns.get(&victim_id) {
                    warn!("deadlock detected, aborting transaction {}", victim_id);
                    victim.abort(self)?;
                }
            }
            None => self.detector.lock().unwrap().on_no_cycle_found(),
        }
        Ok(())
    }

    /// Build the wait-for graph: an edge from every waiting transaction to
    /// every transaction currently running on the resource it waits for.
    fn build_wait_for_graph(
        &self,
        table: &LockTable,
    ) -> (
        HashMap<crate::types::TxnId, Vec<crate::types::TxnId>>,
        HashMap<crate::types::TxnId, Arc<Transaction>>,
    ) {
        let mut edges: HashMap<crate::types::TxnId, Vec<crate::types::TxnId>> = HashMap::new();
        let mut txns: HashMap<crate::types::TxnId, Arc<Transaction>> = HashMap::new();

        for cell in table.values() {
            for waiter in &cell.waiting {
                if let Some(trx) = waiter.transaction() {
                    txns.insert(waiter.txn_id, trx);
                }
                let entry = edges.entry(waiter.txn_id).or_insert_with(Vec::new);
                for runner in &cell.running {
                    if let Some(trx) = runner.transaction() {
                        txns.insert(runner.txn_id, trx);
                    }
                    if runner.txn_id != waiter.txn_id {
                        entry.push(runner.txn_id);
                    }
                }
            }
        }
        (edges, txns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionTable;
    use crate::types::{PageNum, TableId};

    fn hid(record: u64) -> HierarchicalId {
        HierarchicalId::new(TableId(1), PageNum(0), record)
    }

    #[test]
    fn shared_locks_on_same_resource_are_both_granted() {
        let mgr = LockManager::new(Duration::from_millis(5));
        let table = TransactionTable::new();
        let t1 = table.begin();
        let t2 = table.begin();

        mgr.require_lock(&t1, hid(1), LockMode::Shared).unwrap();
        mgr.require_lock(&t2, hid(1), LockMode::Shared).unwrap();

        assert_eq!(t1.held_lock_count(), 1);
        assert_eq!(t2.held_lock_count(), 1);
    }

    #[test]
    fn exclusive_then_shared_waits_and_is_granted_after_release() {
        let mgr = Arc::new(LockManager::new(Duration::from_millis(5)));
        let table = Arc::new(TransactionTable::new());
        let t1 = table.begin();
        let t2 = table.begin();

        let l1 = mgr.require_lock(&t1, hid(1), LockMode::Exclusive).unwrap();

        let mgr2 = mgr.clone();
        let t2c = t2.clone();
        let waiter = std::thread::spawn(move || {
            mgr2.require_lock(&t2c, hid(1), LockMode::Shared).unwrap()
        });

        std::thread::sleep(Duration::from_millis(20));
        mgr.release_lock(&l1).unwrap();

        let granted = waiter.join().unwrap();
        assert_eq!(granted.txn_id, t2.id());
        assert_eq!(t2.state(), TransactionState::Running);
        assert_eq!(t2.held_lock_count(), 1);
    }

    #[test]
    fn deadlock_between_two_transactions_aborts_exactly_one() {
        let mgr = Arc::new(LockManager::new(Duration::from_millis(5)));
        let table = Arc::new(TransactionTable::new());
        let t1 = table.begin();
        let t2 = table.begin();

        mgr.require_lock(&t1, hid(10), LockMode::Exclusive).unwrap();
        mgr.require_lock(&t2, hid(20), LockMode::Exclusive).unwrap();

        let mgr_a = mgr.clone();
        let t1a = t1.clone();
        let a = std::thread::spawn(move || mgr_a.require_lock(&t1a, hid(20), LockMode::Exclusive));

        let mgr_b = mgr.clone();
        let t2b = t2.clone();
        let b = std::thread::spawn(move || mgr_b.require_lock(&t2b, hid(10), LockMode::Exclusive));

        let ra = a.join().unwrap();
        let rb = b.join().unwrap();

        // exactly one side must fail with Deadlock; the other must succeed.
        let outcomes = [ra.is_err(), rb.is_err()];
        assert_eq!(outcomes.iter().filter(|&&failed| failed).count(), 1);

        let aborted = [t1.state(), t2.state()]
            .iter()
            .filter(|&&s| s == TransactionState::Aborted)
            .count();
        assert_eq!(aborted, 1);
    }
}
