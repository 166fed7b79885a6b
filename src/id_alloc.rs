//! Sequential id allocator
//!
//! Tracks a contiguous range of live positive ids. New ids come off the top,
//! releases come off the bottom (oldest first). Only the bounds are stored,
//! so an arbitrary id in the middle can never be released.

/// Contiguous FIFO range of positive ids.
///
/// Empty when `first > last`; initially `first = 1, last = 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequentialIdAllocator {
    first: u64,
    last: u64,
}

impl SequentialIdAllocator {
    pub fn new() -> Self {
        Self { first: 1, last: 0 }
    }

    /// Allocate the next id at the tail of the range.
    pub fn allocate(&mut self) -> u64 {
        if self.is_empty() {
            self.last = self.first;
            return self.first;
        }
        self.last += 1;
        self.last
    }

    /// Release the oldest live id, or `None` when nothing is live.
    pub fn release(&mut self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        let id = self.first;
        self.first += 1;
        Some(id)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }

    /// Number of live ids.
    #[inline]
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.last - self.first + 1
        }
    }

    /// Most recently allocated id that is still live.
    #[inline]
    pub fn newest(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.last)
    }

    /// Oldest live id (the one [`release`](Self::release) would return).
    #[inline]
    pub fn oldest(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.first)
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_counts_up_from_one() {
        let mut ids = SequentialIdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 3);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_release_on_fresh_allocator_is_none() {
        let mut ids = SequentialIdAllocator::new();
        assert_eq!(ids.release(), None);
        assert!(ids.is_empty());
        assert_eq!(ids.newest(), None);
    }

    #[test]
    fn test_release_is_fifo() {
        let mut ids = SequentialIdAllocator::new();
        for _ in 0..3 {
            ids.allocate();
        }
        assert_eq!(ids.release(), Some(1));
        assert_eq!(ids.release(), Some(2));
        assert_eq!(ids.release(), Some(3));
        assert_eq!(ids.release(), None);
    }

    /// After draining, ids keep counting up instead of restarting at 1.
    #[test]
    fn test_ids_not_reused_after_drain() {
        let mut ids = SequentialIdAllocator::new();
        ids.allocate();
        ids.allocate();
        ids.release();
        ids.release();
        assert!(ids.is_empty());
        assert_eq!(ids.allocate(), 3);
        assert_eq!(ids.oldest(), Some(3));
        assert_eq!(ids.newest(), Some(3));
    }

    #[test]
    fn test_interleaved_allocate_release() {
        let mut ids = SequentialIdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.release(), Some(1));
        assert_eq!(ids.allocate(), 3);
        assert_eq!(ids.newest(), Some(3));
        assert_eq!(ids.oldest(), Some(2));
        assert_eq!(ids.len(), 2);
    }
}
