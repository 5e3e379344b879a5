//! Hierarchical shared/exclusive lock manager: per-resource wait queues,
//! condition-variable wakeups, and cycle-based deadlock detection coupled
//! to transaction abort.

mod deadlock;
mod hid;
mod lock;
mod manager;

pub use hid::HierarchicalId;
pub use lock::{Lock, LockMode};
pub use manager::LockManager;
