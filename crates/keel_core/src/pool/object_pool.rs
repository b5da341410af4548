// object_pool.rs - Pool of T addressed by generational handles
//
// Storage is a single backing block laid out as
// [ gen: u8 x capacity ][ padding ][ slot: T x capacity ], obtained from an
// injected allocator. The index allocator decides which slots are live; the
// generation bytes decide which handles still name their slot.

use std::alloc::Layout;
use std::ptr;

use keel_metrics::Counter;
use thiserror::Error;

use crate::handle::Handle;
use crate::index_allocator::IndexAllocator;
use crate::memory::{Allocator, SystemAllocator};
use crate::pool::{Iter, IterMut};

// The handle index field must be able to name every slot the index
// allocator can hand out.
const _: () = assert!(IndexAllocator::MAX_INDEX <= 0x00ff_ffff);

/// Why an insertion could not produce a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every index in the allocator's domain is in use.
    #[error("the pool's index space is exhausted")]
    IndexSpaceExhausted,

    /// The injected allocator refused to provide a bigger backing block.
    /// The pool is unchanged and remains usable at its current capacity.
    #[error("backing allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },
}

/// Pool that manages objects of type `T` with stable handles.
///
/// Objects sit in contiguous memory and are accessed through [`Handle`]s.
/// The pool grows in powers of two and always keeps objects in a single
/// contiguous block, relocating them on growth; handles stay valid across
/// both growth and a move of the pool value itself.
///
/// Relocation moves values bytewise and forgets the source, which every Rust
/// type supports, so growth can never half-fail. Access is O(1) except for
/// the rare insert that has to expand the backing block.
///
/// A pool is not internally synchronized; share one between threads only
/// under external exclusion. Distinct pools are fully independent.
pub struct ObjectPool<T, A: Allocator = SystemAllocator> {
    mem_alloc: A,
    indices: IndexAllocator,
    /// Largest index that has been live since the last clear. An iteration
    /// bound, not a correctness invariant.
    max_idx: u32,

    mem: *mut u8,
    gens: *mut u8,
    slots: *mut T,
    capacity: usize,
    len: usize,

    stats: Counter,
}

// The raw storage pointers are uniquely owned by the pool, so the usual
// container rules apply.
unsafe impl<T: Send, A: Allocator + Send> Send for ObjectPool<T, A> {}
unsafe impl<T: Sync, A: Allocator + Sync> Sync for ObjectPool<T, A> {}

impl<T, A: Allocator + Default> ObjectPool<T, A> {
    pub fn new() -> Self {
        Self::with_allocator(A::default())
    }
}

impl<T, A: Allocator + Default> Default for ObjectPool<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> ObjectPool<T, A> {
    /// Construct a pool that obtains its backing block from `mem_alloc`.
    ///
    /// The allocator must outlive the pool; it is called only on growth and
    /// on destruction.
    pub fn with_allocator(mem_alloc: A) -> Self {
        Self {
            mem_alloc,
            indices: IndexAllocator::new(),
            max_idx: 0,
            mem: ptr::null_mut(),
            gens: ptr::null_mut(),
            slots: ptr::null_mut(),
            capacity: 0,
            len: 0,
            stats: Counter::new(),
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slots the current backing block can hold without growing.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Storage event counters (active when the `metrics` feature is on).
    pub fn stats(&self) -> &Counter {
        &self.stats
    }

    /// Move `value` into the pool.
    ///
    /// Returns [`Handle::INVALID`] when the index space is exhausted or the
    /// backing allocation fails; in both cases the pool is unchanged. See
    /// [`try_add`](Self::try_add) for the variant that says which.
    pub fn add(&mut self, value: T) -> Handle<T> {
        self.try_add(value).unwrap_or(Handle::INVALID)
    }

    /// Like [`add`](Self::add), constructing the value at insertion time and
    /// writing it straight into its slot.
    pub fn add_with<F: FnOnce() -> T>(&mut self, make: F) -> Handle<T> {
        self.try_add_with(make).unwrap_or(Handle::INVALID)
    }

    /// Move `value` into the pool, reporting failures as typed errors.
    pub fn try_add(&mut self, value: T) -> Result<Handle<T>, PoolError> {
        self.try_add_with(move || value)
    }

    /// In-place variant of [`try_add`](Self::try_add).
    pub fn try_add_with<F: FnOnce() -> T>(&mut self, make: F) -> Result<Handle<T>, PoolError> {
        let Some(idx) = self.indices.allocate() else {
            tracing::warn!("object pool index space exhausted");
            return Err(PoolError::IndexSpaceExhausted);
        };

        if let Err(err) = self.ensure_capacity(idx) {
            // Give the index back so the failed insert leaves no trace.
            self.indices.try_deallocate(idx);
            self.stats.increment("pool.alloc_failed", 1);
            return Err(err);
        }

        if self.max_idx < idx {
            self.max_idx = idx;
        }

        // SAFETY: ensure_capacity made idx < capacity, and a freshly
        // allocated index names an unoccupied slot.
        unsafe {
            self.slots.add(idx as usize).write(make());
        }
        self.len += 1;

        Ok(self.handle_for(idx))
    }

    /// Whether `handle` currently names a live object in this pool.
    pub fn exists(&self, handle: Handle<T>) -> bool {
        self.live_index(handle).is_some()
    }

    /// Borrow the object named by `handle`, if it is still live.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        let idx = self.live_index(handle)?;
        // SAFETY: live_index vouches for idx being a live slot in range.
        Some(unsafe { &*self.slots.add(idx as usize) })
    }

    /// Mutable variant of [`try_get`](Self::try_get).
    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let idx = self.live_index(handle)?;
        // SAFETY: as in try_get, plus &mut self gives exclusive access.
        Some(unsafe { &mut *self.slots.add(idx as usize) })
    }

    /// Destroy the object named by `handle`.
    ///
    /// Returns false if the handle is stale, forged, or already erased; the
    /// pool is untouched in that case. Erasing bumps the slot's generation
    /// so every outstanding copy of the handle goes stale.
    pub fn erase(&mut self, handle: Handle<T>) -> bool {
        let Some(idx) = self.live_index(handle) else {
            return false;
        };

        let freed = self.indices.try_deallocate(idx);
        debug_assert!(freed);

        if self.max_idx == idx && idx > 0 {
            let mut i = idx - 1;
            while i > 0 && !self.indices.allocated(i) {
                i -= 1;
            }
            self.max_idx = i;
        }

        // SAFETY: idx came from live_index, so the slot is in range and
        // holds a live value.
        unsafe {
            let gen = self.gens.add(idx as usize);
            // Full-byte increment; reads mask to 7 bits, so the generation
            // wraps modulo 128.
            *gen = (*gen).wrapping_add(1);
            ptr::drop_in_place(self.slots.add(idx as usize));
        }
        self.len -= 1;

        true
    }

    /// Visit every live object in ascending index order.
    pub fn for_each<F: FnMut(Handle<T>, &mut T)>(&mut self, mut fun: F) {
        if self.len == 0 {
            return;
        }
        for i in 0..=self.max_idx {
            if self.indices.allocated(i) {
                let handle = self.handle_for(i);
                // SAFETY: allocated indices within max_idx name live slots.
                fun(handle, unsafe { &mut *self.slots.add(i as usize) });
            }
        }
    }

    /// Iterate live objects as `(handle, &T)` in ascending index order.
    pub fn iter(&self) -> Iter<'_, T> {
        // SAFETY: the iterator never dereferences past max_idx and stops
        // after len items, both of which it borrows from self.
        unsafe { Iter::new(&self.indices, self.gens, self.slots, self.max_idx, self.len) }
    }

    /// Iterate live objects as `(handle, &mut T)` in ascending index order.
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        // SAFETY: as iter, and &mut self guarantees exclusivity.
        unsafe { IterMut::new(&self.indices, self.gens, self.slots, self.max_idx, self.len) }
    }

    /// Destroy every live object and free every index.
    ///
    /// Capacity and the generation bytes are kept: slots go back to simply
    /// being unallocated, so handles issued before the clear fail the
    /// allocation check rather than resolving to garbage.
    pub fn clear(&mut self) {
        if !self.mem.is_null() {
            for i in 0..=self.max_idx {
                if self.indices.allocated(i) {
                    // SAFETY: allocated index within capacity, live value.
                    unsafe {
                        ptr::drop_in_place(self.slots.add(i as usize));
                    }
                }
            }
        }
        self.indices.reset();
        self.max_idx = 0;
        self.len = 0;
        tracing::trace!("object pool cleared");
    }

    fn handle_for(&self, idx: u32) -> Handle<T> {
        // SAFETY: callers only pass indices below capacity.
        let gen = unsafe { *self.gens.add(idx as usize) };
        Handle::new(idx, gen & Handle::<T>::GENERATION_MASK)
    }

    /// The four-step validity chain every handle-taking operation shares:
    /// capacity, index range, generation, allocation state.
    fn live_index(&self, handle: Handle<T>) -> Option<u32> {
        if self.capacity == 0 {
            return None;
        }
        let idx = handle.index();
        if idx as usize >= self.capacity {
            return None;
        }
        // SAFETY: idx < capacity.
        let gen = unsafe { *self.gens.add(idx as usize) } & Handle::<T>::GENERATION_MASK;
        if handle.generation() != gen {
            return None;
        }
        if !self.indices.allocated(idx) {
            return None;
        }
        Some(idx)
    }

    fn ensure_capacity(&mut self, idx: u32) -> Result<(), PoolError> {
        let needed = Self::adapt_capacity(idx as usize + 1);
        if self.capacity >= needed {
            return Ok(());
        }
        self.grow_to(needed)
    }

    /// Smallest power-of-two capacity (at least 2) covering `wanted`,
    /// clamped to the index allocator's domain.
    fn adapt_capacity(wanted: usize) -> usize {
        let domain = IndexAllocator::MAX_INDEX as usize + 1;
        wanted.max(2).next_power_of_two().min(domain)
    }

    /// Layout of the combined block for `capacity` slots, plus the byte
    /// offset of the slot array within it.
    fn block_layout(capacity: usize) -> Option<(Layout, usize)> {
        let gens = Layout::array::<u8>(capacity).ok()?;
        let slots = Layout::array::<T>(capacity).ok()?;
        gens.extend(slots).ok()
    }

    fn grow_to(&mut self, new_capacity: usize) -> Result<(), PoolError> {
        let (layout, slot_offset) = Self::block_layout(new_capacity)
            .ok_or(PoolError::AllocationFailed { bytes: usize::MAX })?;

        let new_mem = self
            .mem_alloc
            .allocate(layout.size(), layout.align(), "object_pool");
        if new_mem.is_null() {
            tracing::warn!(
                bytes = layout.size(),
                capacity = new_capacity,
                "object pool backing allocation failed"
            );
            return Err(PoolError::AllocationFailed {
                bytes: layout.size(),
            });
        }

        let new_gens = new_mem;
        // SAFETY: slot_offset is within the block just allocated.
        let new_slots = unsafe { new_mem.add(slot_offset).cast::<T>() };

        if self.mem.is_null() {
            // SAFETY: the fresh block has room for new_capacity gen bytes.
            unsafe {
                ptr::write_bytes(new_gens, 0, new_capacity);
            }
        } else {
            // SAFETY: both blocks are live, old capacity < new capacity,
            // and the live set is described exactly by the index allocator.
            let moved = unsafe { self.relocate_into(new_gens, new_slots, new_capacity) };
            unsafe {
                self.mem_alloc.deallocate(self.mem);
            }
            self.stats.increment("pool.relocated", moved);
        }

        tracing::trace!(
            old_capacity = self.capacity,
            new_capacity,
            "object pool storage grown"
        );
        self.stats.increment("pool.grow", 1);

        self.mem = new_mem;
        self.gens = new_gens;
        self.slots = new_slots;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Carry generations and live objects over to a bigger block.
    ///
    /// # Safety
    ///
    /// The destination must hold at least `new_capacity >= self.capacity`
    /// slots and must not overlap the current block.
    unsafe fn relocate_into(
        &mut self,
        new_gens: *mut u8,
        new_slots: *mut T,
        new_capacity: usize,
    ) -> u64 {
        ptr::copy_nonoverlapping(self.gens, new_gens, self.capacity);
        ptr::write_bytes(new_gens.add(self.capacity), 0, new_capacity - self.capacity);

        // Bytewise move: read relinquishes the old slot, write claims the
        // new one, and the old bytes are simply forgotten.
        let mut moved = 0;
        for i in 0..=self.max_idx {
            if self.indices.allocated(i) {
                let value = self.slots.add(i as usize).read();
                new_slots.add(i as usize).write(value);
                moved += 1;
            }
        }
        moved
    }
}

impl<T, A: Allocator> Drop for ObjectPool<T, A> {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        for i in 0..=self.max_idx {
            if self.indices.allocated(i) {
                // SAFETY: allocated indices name live slots.
                unsafe {
                    ptr::drop_in_place(self.slots.add(i as usize));
                }
            }
        }
        // SAFETY: mem came from this allocator and is released once.
        unsafe {
            self.mem_alloc.deallocate(self.mem);
        }
    }
}
