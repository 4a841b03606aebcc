//! Slab Allocator - fixed-capacity pool of same-sized objects.
//!
//! The pool pre-allocates every slot at startup, eliminating heap
//! allocation in the hot path. Each slot carries its own free flag next to
//! the object, so a scan touches one cache line per slot. Objects are
//! addressed by index rather than pointer: bounds and ownership checks are
//! plain integer comparisons.

use std::fmt;

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Type alias for slab indices - our "compressed pointers"
pub type SlabIndex = u32;

#[derive(Clone)]
struct Slot<T> {
    object: T,
    is_free: bool,
}

/// Pre-allocated object pool with in-place construction.
///
/// Allocation scans forward (circularly) from a cursor kept between
/// calls, so the common case is O(1) and a fragmented pool degrades to
/// O(capacity). Running out of slots is a configuration error and panics.
pub struct SlabAllocator<T> {
    slots: Vec<Slot<T>>,

    /// Where the next free-slot scan starts
    next_free: usize,

    /// Number of currently allocated slots
    allocated: u32,
}

impl<T: Default> SlabAllocator<T> {
    /// Create a pool with `capacity` default-constructed slots.
    ///
    /// # Panics
    /// Panics if capacity is zero or not below `NULL_INDEX`.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Slab capacity must be non-zero");
        assert!(capacity < NULL_INDEX, "Capacity must be less than NULL_INDEX");

        let slots = (0..capacity)
            .map(|_| Slot {
                object: T::default(),
                is_free: true,
            })
            .collect();

        Self {
            slots,
            next_free: 0,
            allocated: 0,
        }
    }

    /// Construct `value` in the next free slot.
    ///
    /// # Panics
    /// Panics if every slot is in use.
    #[inline]
    pub fn allocate(&mut self, value: T) -> SlabIndex {
        match self.try_allocate(value) {
            Some(index) => index,
            None => panic!(
                "Slab allocator out of space (capacity {})",
                self.slots.len()
            ),
        }
    }

    /// Construct `value` in the next free slot, or `None` if the pool is full.
    #[inline]
    pub fn try_allocate(&mut self, value: T) -> Option<SlabIndex> {
        if self.allocated as usize == self.slots.len() {
            return None;
        }

        // At least one slot is free, so the scan terminates within one lap.
        let capacity = self.slots.len();
        let mut index = self.next_free;
        while !self.slots[index].is_free {
            index += 1;
            if index == capacity {
                index = 0;
            }
        }

        let slot = &mut self.slots[index];
        slot.object = value;
        slot.is_free = false;
        self.allocated += 1;
        self.next_free = if index + 1 == capacity { 0 } else { index + 1 };

        Some(index as SlabIndex)
    }

    /// Return a slot to the pool, moving its object out.
    ///
    /// # Panics
    /// Panics if `index` does not belong to this pool or the slot is
    /// already free.
    #[inline]
    pub fn deallocate(&mut self, index: SlabIndex) -> T {
        let capacity = self.slots.len();
        assert!(
            (index as usize) < capacity,
            "Slot {} does not belong to this slab (capacity {})",
            index,
            capacity
        );
        let slot = &mut self.slots[index as usize];
        assert!(!slot.is_free, "Double free of slab slot {}", index);

        slot.is_free = true;
        self.allocated -= 1;
        std::mem::take(&mut slot.object)
    }
}

impl<T> SlabAllocator<T> {
    /// Get an immutable reference to an allocated object.
    #[inline]
    pub fn get(&self, index: SlabIndex) -> &T {
        let slot = &self.slots[index as usize];
        debug_assert!(!slot.is_free, "Access to free slab slot {}", index);
        &slot.object
    }

    /// Get a mutable reference to an allocated object.
    #[inline]
    pub fn get_mut(&mut self, index: SlabIndex) -> &mut T {
        let slot = &mut self.slots[index as usize];
        debug_assert!(!slot.is_free, "Access to free slab slot {}", index);
        &mut slot.object
    }

    /// Whether the slot at `index` is free.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn is_free_at(&self, index: SlabIndex) -> bool {
        assert!(
            (index as usize) < self.slots.len(),
            "Slot {} out of range",
            index
        );
        self.slots[index as usize].is_free
    }

    /// Returns the number of currently allocated slots.
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Returns the total capacity of the pool.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.allocated as usize == self.slots.len()
    }

    /// Pre-fault all memory pages (warm-up routine).
    ///
    /// Walks through all slots to force the OS to map virtual pages
    /// to physical RAM, preventing page faults in the hot path.
    pub fn warm_up(&mut self) {
        for slot in &mut self.slots {
            // Volatile write to prevent optimization
            unsafe {
                std::ptr::write_volatile(&mut slot.is_free, slot.is_free);
            }
        }
    }
}

impl<T> fmt::Debug for SlabAllocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabAllocator")
            .field("capacity", &self.slots.len())
            .field("allocated", &self.allocated)
            .field("next_free", &self.next_free)
            .finish()
    }
}
