// tracking.rs - Allocation accounting decorator

use std::cell::Cell;

use super::{Allocator, SystemAllocator};

/// Wraps another allocator and counts what flows through it.
///
/// Useful in tests (asserting a pool holds exactly one live block) and for
/// per-subsystem memory budgets. Counters use `Cell`; the containers are
/// single-threaded per instance, and so is their accounting.
pub struct TrackingAllocator<A: Allocator = SystemAllocator> {
    inner: A,
    allocations: Cell<usize>,
    deallocations: Cell<usize>,
    bytes_requested: Cell<usize>,
}

impl TrackingAllocator<SystemAllocator> {
    pub fn new() -> Self {
        Self::wrapping(SystemAllocator::new())
    }
}

impl<A: Allocator> TrackingAllocator<A> {
    pub fn wrapping(inner: A) -> Self {
        Self {
            inner,
            allocations: Cell::new(0),
            deallocations: Cell::new(0),
            bytes_requested: Cell::new(0),
        }
    }

    /// Successful `allocate` calls so far.
    pub fn allocations(&self) -> usize {
        self.allocations.get()
    }

    /// `deallocate` calls so far.
    pub fn deallocations(&self) -> usize {
        self.deallocations.get()
    }

    /// Blocks currently outstanding.
    pub fn live_blocks(&self) -> usize {
        self.allocations.get() - self.deallocations.get()
    }

    /// Cumulative bytes requested across all successful allocations.
    pub fn bytes_requested(&self) -> usize {
        self.bytes_requested.get()
    }
}

impl Default for TrackingAllocator<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, size: usize, align: usize, tag: &'static str) -> *mut u8 {
        let ptr = self.inner.allocate(size, align, tag);
        if !ptr.is_null() {
            self.allocations.set(self.allocations.get() + 1);
            self.bytes_requested.set(self.bytes_requested.get() + size);
        }
        ptr
    }

    unsafe fn deallocate(&self, ptr: *mut u8) {
        self.deallocations.set(self.deallocations.get() + 1);
        self.inner.deallocate(ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_allocations_and_releases() {
        let tracker = TrackingAllocator::new();
        let a = tracker.allocate(64, 8, "test");
        let b = tracker.allocate(128, 8, "test");
        assert_eq!(tracker.allocations(), 2);
        assert_eq!(tracker.live_blocks(), 2);
        assert_eq!(tracker.bytes_requested(), 192);
        unsafe {
            tracker.deallocate(a);
            tracker.deallocate(b);
        }
        assert_eq!(tracker.live_blocks(), 0);
    }
}
