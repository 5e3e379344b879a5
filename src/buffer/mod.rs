//! Bounded buffer pool sitting between the B+-tree layer and the paged
//! file store: pins pages in memory, hands out scoped read/write
//! sessions, and evicts under an [`EvictionPolicy`] when full.

mod frame;
mod handle;
mod policy;
mod pool;

pub use handle::BufferHandle;
pub use policy::{EvictionPolicy, Lru, Mru, UsageChain};
pub use pool::BufferPool;
