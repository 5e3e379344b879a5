/// A read-only snapshot of the buffer pool's intrusive usage chain, handed
/// to an [`EvictionPolicy`] so it never needs to see frame contents or
/// owners — only the linkage.
pub struct UsageChain<'a> {
    pub lru: isize,
    pub mru: isize,
    pub next_use: &'a [isize],
    pub prev_use: &'a [isize],
}

/// A victim-selection strategy over the usage chain.
///
/// `init` picks a starting frame, `next` walks to the next candidate. The
/// pool walks the chain skipping pinned frames and releases the first
/// unpinned one it finds; new strategies (e.g. CLOCK) plug in here
/// without touching `BufferPool` itself.
pub trait EvictionPolicy: Send + Sync {
    fn init(&self, chain: &UsageChain) -> isize;
    fn next(&self, chain: &UsageChain, frame: isize) -> isize;
}

/// Evict the least-recently-used frame first.
pub struct Lru;

impl EvictionPolicy for Lru {
    fn init(&self, chain: &UsageChain) -> isize {
        chain.lru
    }

    fn next(&self, chain: &UsageChain, frame: isize) -> isize {
        chain.next_use[frame as usize]
    }
}

/// Evict the most-recently-used frame first.
pub struct Mru;

impl EvictionPolicy for Mru {
    fn init(&self, chain: &UsageChain) -> isize {
        chain.mru
    }

    fn next(&self, chain: &UsageChain, frame: isize) -> isize {
        chain.prev_use[frame as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Vec<isize>, Vec<isize>) {
        // usage order (lru -> mru): 0, 1, 2
        let next_use = vec![1, 2, -1];
        let prev_use = vec![-1, 0, 1];
        (next_use, prev_use)
    }

    #[test]
    fn lru_walks_from_least_recently_used() {
        let (next_use, prev_use) = chain();
        let chain = UsageChain {
            lru: 0,
            mru: 2,
            next_use: &next_use,
            prev_use: &prev_use,
        };
        let lru = Lru;
        let start = lru.init(&chain);
        assert_eq!(start, 0);
        assert_eq!(lru.next(&chain, start), 1);
    }

    #[test]
    fn mru_walks_from_most_recently_used() {
        let (next_use, prev_use) = chain();
        let chain = UsageChain {
            lru: 0,
            mru: 2,
            next_use: &next_use,
            prev_use: &prev_use,
        };
        let mru = Mru;
        let start = mru.init(&chain);
        assert_eq!(start, 2);
        assert_eq!(mru.next(&chain, start), 1);
    }
}
