//! Ring Transport - lock-free single-producer/single-consumer queue.
//!
//! A fixed ring of pre-constructed slots plus one atomic element count.
//! The writer fills the slot at its cursor in place and commits it; the
//! reader peeks the slot at its cursor and releases it. Each cursor is
//! owned by exactly one half, so the only shared mutable state is the count.
//!
//! [`RingTransport::with_capacity`] hands out one [`RingWriter`] and one
//! [`RingReader`]. Neither half is `Clone`, which makes a second producer
//! or consumer on the same ring unrepresentable.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Storage shared by the two halves of a ring.
pub struct RingTransport<T> {
    slots: Box<[UnsafeCell<T>]>,
    /// Number of committed, unread elements
    len: AtomicUsize,
}

// SAFETY: a slot is only ever accessed by the writer while it is not
// counted in `len`, and only by the reader while it is. The Release store
// on commit and the Acquire load before access order the slot contents.
unsafe impl<T: Send> Sync for RingTransport<T> {}
unsafe impl<T: Send> Send for RingTransport<T> {}

impl<T: Default> RingTransport<T> {
    /// Create a ring with `capacity` pre-constructed slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> (RingWriter<T>, RingReader<T>) {
        assert!(capacity > 0, "ring transport capacity must be non-zero");

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let ring = Arc::new(Self {
            slots,
            len: AtomicUsize::new(0),
        });

        (
            RingWriter {
                ring: Arc::clone(&ring),
                next_write: 0,
            },
            RingReader { ring, next_read: 0 },
        )
    }
}

impl<T> RingTransport<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }
}

/// Producer half of a [`RingTransport`].
pub struct RingWriter<T> {
    ring: Arc<RingTransport<T>>,
    next_write: usize,
}

impl<T> RingWriter<T> {
    /// The slot at the write cursor, to be filled in place.
    ///
    /// Call [`commit_write`](Self::commit_write) to publish it.
    ///
    /// # Panics
    /// Panics if the ring is full: the writer would overwrite an element the
    /// reader has not released. Capacity must be provisioned so this never
    /// happens.
    #[inline]
    pub fn next_to_write(&mut self) -> &mut T {
        assert!(
            self.ring.len() < self.ring.capacity(),
            "ring transport overrun: writer lapped the reader (capacity {})",
            self.ring.capacity()
        );
        // SAFETY: the slot is not counted in `len`, so the reader cannot
        // observe it until the next commit.
        unsafe { &mut *self.ring.slots[self.next_write].get() }
    }

    /// Publish the slot at the write cursor and advance the cursor.
    #[inline]
    pub fn commit_write(&mut self) {
        self.next_write = (self.next_write + 1) % self.ring.capacity();
        let previous = self.ring.len.fetch_add(1, Ordering::Release);
        assert!(
            previous < self.ring.capacity(),
            "ring transport overrun: committed into a full ring"
        );
    }

    /// Copy `value` into the next slot and commit it.
    #[inline]
    pub fn push(&mut self, value: T) {
        *self.next_to_write() = value;
        self.commit_write();
    }

    /// Number of committed elements not yet released by the reader
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the next write would overrun the reader
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Consumer half of a [`RingTransport`].
pub struct RingReader<T> {
    ring: Arc<RingTransport<T>>,
    next_read: usize,
}

impl<T> RingReader<T> {
    /// The element at the read cursor, or `None` if the ring is empty.
    ///
    /// The element stays owned by the ring until
    /// [`commit_read`](Self::commit_read).
    #[inline]
    pub fn next_to_read(&self) -> Option<&T> {
        if self.ring.len() == 0 {
            return None;
        }
        // SAFETY: the slot is counted in `len`, so the writer will not hand
        // it out again until we release it.
        Some(unsafe { &*self.ring.slots[self.next_read].get() })
    }

    /// Release the element at the read cursor and advance the cursor.
    ///
    /// # Panics
    /// Panics if the ring is empty.
    #[inline]
    pub fn commit_read(&mut self) {
        assert!(
            self.ring.len() != 0,
            "ring transport underflow: read past the last committed element"
        );
        self.next_read = (self.next_read + 1) % self.ring.capacity();
        self.ring.len.fetch_sub(1, Ordering::Release);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

impl<T: Copy> RingReader<T> {
    /// Copy out and release the next element.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let value = *self.next_to_read()?;
        self.commit_read();
        Some(value)
    }
}

impl<T> fmt::Debug for RingWriter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingWriter")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("next_write", &self.next_write)
            .finish()
    }
}

impl<T> fmt::Debug for RingReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingReader")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("next_read", &self.next_read)
            .finish()
    }
}
