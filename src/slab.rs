//! Bounded, lock-free, slab-backed memory pool.
//!
//! `SlabPool<T>` hands out fixed-size `T` slots carved from one
//! contiguous arena allocated up front. The free list is a
//! Michael–Scott queue of fragments (not a Treiber stack): the oldest
//! freed fragment is handed out first, which keeps fragments cycling
//! through the whole arena instead of hammering the same cache lines.
//! One extra fragment beyond `capacity` is reserved as the free list's
//! own sentinel and is never handed to a caller.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::atomic::AtomicU32;

use crate::error::{Error, Result};
use crate::tagged::{AtomicTaggedPtr, TaggedPtr};

#[repr(C)]
struct Fragment<T> {
    /// Free-list link. Meaningful only while the fragment is on the
    /// free list; once handed out, the owner (queue, list, ...) is
    /// free to ignore it.
    next: AtomicUsize,
    value: std::cell::UnsafeCell<MaybeUninit<T>>,
}

impl<T> Fragment<T> {
    fn new() -> Self {
        Fragment {
            next: AtomicUsize::new(0),
            value: std::cell::UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn payload_ptr(this: *mut Fragment<T>) -> *mut T {
        unsafe { (*this).value.get() as *mut T }
    }

    fn from_payload_ptr(payload: *mut T) -> *mut Fragment<T> {
        let offset = std::mem::offset_of!(Fragment<T>, value);
        unsafe { (payload as *mut u8).sub(offset) as *mut Fragment<T> }
    }
}

unsafe impl<T: Send> Send for Fragment<T> {}
unsafe impl<T: Send> Sync for Fragment<T> {}

/// A bounded, lock-free pool of same-sized `T` slots.
///
/// `SlabPool` never grows: once `capacity` live allocations are
/// outstanding, further [`alloc`](SlabPool::alloc) calls return
/// [`Error::OutOfMemory`].
pub struct SlabPool<T> {
    arena: Box<[Fragment<T>]>,
    capacity: usize,
    head: AtomicTaggedPtr<Fragment<T>>,
    tail: AtomicTaggedPtr<Fragment<T>>,
    /// Fragments currently available to [`alloc`](SlabPool::alloc).
    freeable: AtomicU32,
}

unsafe impl<T: Send> Send for SlabPool<T> {}
unsafe impl<T: Send> Sync for SlabPool<T> {}

impl<T> SlabPool<T> {
    /// Creates a pool with room for `capacity` outstanding allocations.
    ///
    /// Returns [`Error::InvalidArgument`] if `capacity` is zero, or
    /// [`Error::OutOfMemory`] if the arena cannot be allocated.
    pub fn create(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument);
        }

        let mut arena = Vec::new();
        arena
            .try_reserve_exact(capacity + 1)
            .map_err(|_| Error::OutOfMemory)?;
        for _ in 0..=capacity {
            arena.push(Fragment::new());
        }
        let arena = arena.into_boxed_slice();

        let pool = SlabPool {
            arena,
            capacity,
            head: AtomicTaggedPtr::new(TaggedPtr::null()),
            tail: AtomicTaggedPtr::new(TaggedPtr::null()),
            freeable: AtomicU32::new(0),
        };
        pool.reset_free_list();
        Ok(pool)
    }

    /// Rebuilds the free list so every non-sentinel fragment is
    /// available again. Callers must guarantee no fragment is still in
    /// use when calling this (mirrors `mempool_clear`'s contract).
    pub fn clear(&self) {
        self.reset_free_list();
    }

    fn reset_free_list(&self) {
        let sentinel = &self.arena[0] as *const Fragment<T> as *mut Fragment<T>;
        unsafe {
            (*sentinel).next.store(
                TaggedPtr::<Fragment<T>>::null().to_usize(),
                Ordering::Relaxed,
            );
        }
        self.head.store(TaggedPtr::new(sentinel, 0), Ordering::Release);
        self.tail.store(TaggedPtr::new(sentinel, 0), Ordering::Release);

        self.freeable.store(0, Ordering::Relaxed);
        for i in 1..self.arena.len() {
            let frag = &self.arena[i] as *const Fragment<T> as *mut Fragment<T>;
            self.internal_put(frag);
        }
    }

    /// Push a fragment onto the tail of the free-list queue.
    fn internal_put(&self, frag: *mut Fragment<T>) {
        unsafe {
            (*frag).next.store(TaggedPtr::<Fragment<T>>::null().to_usize(), Ordering::Relaxed);
        }
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let tail_next = unsafe { (*tail.ptr()).next.load(Ordering::Acquire) };
            let tail_next = TaggedPtr::<Fragment<T>>::from_usize(tail_next);
            if tail.to_usize() == self.tail.load(Ordering::Acquire).to_usize() {
                if tail_next.is_null() {
                    let new_next = TaggedPtr::new(frag, tail_next.tag().wrapping_add(1));
                    let cas_ok = unsafe {
                        (*tail.ptr())
                            .next
                            .compare_exchange_weak(
                                tail_next.to_usize(),
                                new_next.to_usize(),
                                Ordering::Release,
                                Ordering::Relaxed,
                            )
                            .is_ok()
                    };
                    if cas_ok {
                        let new_tail = TaggedPtr::new(frag, tail.tag().wrapping_add(1));
                        let _ = self.tail.compare_exchange(
                            tail,
                            new_tail,
                            Ordering::Release,
                            Ordering::Relaxed,
                        );
                        self.freeable.fetch_add(1, Ordering::Release);
                        return;
                    }
                } else {
                    let bumped = TaggedPtr::new(tail_next.ptr(), tail.tag().wrapping_add(1));
                    let _ = self.tail.compare_exchange(
                        tail,
                        bumped,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                }
            }
        }
    }

    /// Pop a fragment from the head of the free-list queue. Returns
    /// `None` if the pool is exhausted.
    fn internal_pick(&self) -> Option<*mut Fragment<T>> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let head_next = unsafe { (*head.ptr()).next.load(Ordering::Acquire) };
            let head_next = TaggedPtr::<Fragment<T>>::from_usize(head_next);

            if head.to_usize() != self.head.load(Ordering::Acquire).to_usize() {
                continue;
            }
            if head.ptr() == tail.ptr() {
                if head_next.is_null() {
                    return None;
                }
                let bumped = TaggedPtr::new(head_next.ptr(), tail.tag().wrapping_add(1));
                let _ = self.tail.compare_exchange(
                    tail,
                    bumped,
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                continue;
            }
            let new_head = TaggedPtr::new(head_next.ptr(), head.tag().wrapping_add(1));
            if self
                .head
                .compare_exchange_weak(head, new_head, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                self.freeable.fetch_sub(1, Ordering::Release);
                return Some(head.ptr());
            }
        }
    }

    /// Allocates a fragment and returns a pointer to its (uninitialized)
    /// payload. Returns [`Error::OutOfMemory`] if the pool is exhausted.
    pub fn alloc(&self) -> Result<*mut T> {
        match self.internal_pick() {
            Some(frag) => Ok(Fragment::payload_ptr(frag)),
            None => Err(Error::OutOfMemory),
        }
    }

    /// Returns a previously allocated payload pointer to the pool.
    ///
    /// # Safety
    /// `ptr` must have been returned by a prior call to
    /// [`alloc`](SlabPool::alloc) on this same pool and not already
    /// freed. The caller must have already dropped/read out any value
    /// it wrote into the slot.
    pub unsafe fn free(&self, ptr: *mut T) {
        let frag = Fragment::from_payload_ptr(ptr);
        self.internal_put(frag);
    }

    /// Whether `ptr` points into this pool's arena (any fragment's
    /// payload region, free or allocated).
    pub fn contains(&self, ptr: *const T) -> bool {
        if ptr.is_null() {
            return false;
        }
        let frag = Fragment::from_payload_ptr(ptr as *mut T);
        let start = self.arena.as_ptr() as *const Fragment<T>;
        let end = unsafe { start.add(self.arena.len()) };
        (frag as *const Fragment<T>) >= start && (frag as *const Fragment<T>) < end
    }

    /// Size, in bytes, of each fragment's payload.
    pub fn data_bytes(&self) -> usize {
        std::mem::size_of::<T>()
    }

    /// Total number of fragments available to callers (excludes the
    /// reserved sentinel).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of fragments currently on the free list.
    pub fn freeable(&self) -> usize {
        self.freeable.load(Ordering::Acquire) as usize
    }
}
