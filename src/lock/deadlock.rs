//! Deadlock detection: wait-for graph construction (done by the caller,
//! which has the lock table), cycle search, back-off scheduling, and
//! victim selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::transaction::Transaction;
use crate::types::TxnId;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Owns the detector's back-off state (see DESIGN.md for the scan-cadence
/// decision this resolves). `schedule()` allows a scan once `base *
/// backoff` has elapsed since the last one; a clean scan doubles the
/// backoff (capped) so idle periods poll less often, and a cycle find
/// resets it to the base interval since contention is likely ongoing.
pub(crate) struct DeadlockDetector {
    last_use: Instant,
    backoff: u32,
    base: Duration,
}

const MAX_BACKOFF: u32 = 16;

impl DeadlockDetector {
    pub(crate) fn new(base: Duration) -> Self {
        DeadlockDetector {
            last_use: Instant::now(),
            backoff: 1,
            base,
        }
    }

    pub(crate) fn schedule(&mut self) -> bool {
        if self.last_use.elapsed() >= self.base * self.backoff {
            self.last_use = Instant::now();
            true
        } else {
            false
        }
    }

    pub(crate) fn on_no_cycle_found(&mut self) {
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
    }

    pub(crate) fn on_cycle_found(&mut self) {
        self.backoff = 1;
    }
}

/// Search a wait-for graph (edges: waiter -> each transaction it is
/// blocked behind) for a cycle via DFS with tri-color marking. Returns the
/// cycle's member transactions if one exists. Root and neighbor order are
/// sorted by id first so the search (and therefore which cycle is found
/// when several exist) is deterministic.
pub(crate) fn find_cycle(edges: &HashMap<TxnId, Vec<TxnId>>) -> Option<Vec<TxnId>> {
    let mut color: HashMap<TxnId, Color> = HashMap::new();
    let mut path: Vec<TxnId> = Vec::new();
    let mut found: Option<Vec<TxnId>> = None;

    let mut roots: Vec<TxnId> = edges.keys().copied().collect();
    roots.sort();

    for root in roots {
        if found.is_some() {
            break;
        }
        if *color.get(&root).unwrap_or(&Color::White) == Color::White {
            visit(root, edges, &mut color, &mut path, &mut found);
        }
    }
    found
}

fn visit(
    node: TxnId,
    edges: &HashMap<TxnId, Vec<TxnId>>,
    color: &mut HashMap<TxnId, Color>,
    path: &mut Vec<TxnId>,
    found: &mut Option<Vec<TxnId>>,
) {
    color.insert(node, Color::Gray);
    path.push(node);

    if let Some(neighbors) = edges.get(&node) {
        let mut sorted = neighbors.clone();
        sorted.sort();
        for next in sorted {
            if found.is_some() {
                break;
            }
            match color.get(&next).copied().unwrap_or(Color::White) {
                Color::White => visit(next, edges, color, path, found),
                Color::Gray => {
                    let start = path.iter().position(|&n| n == next).unwrap();
                    *found = Some(path[start..].to_vec());
                }
                Color::Black => {}
            }
        }
    }

    if found.is_none() {
        color.insert(node, Color::Black);
        path.pop();
    }
}

/// Pick the victim with the largest held-lock count, breaking ties by the
/// highest transaction id.
pub(crate) fn choose_victim(
    cycle: &[TxnId],
    txns: &HashMap<TxnId, Arc<Transaction>>,
) -> TxnId {
    *cycle
        .iter()
        .max_by_key(|id| {
            let count = txns.get(id).map(|t| t.held_lock_count()).unwrap_or(0);
            (count, id.0)
        })
        .expect("find_cycle never returns an empty cycle")
}
