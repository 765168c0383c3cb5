//! Shared tagged-pointer encoding used by the slab free list and the
//! FIFO queue's node chain.
//!
//! A tagged pointer packs a monotonically increasing `tag` into the high
//! bits of a single machine word alongside a real pointer, so a single
//! `AtomicUsize` compare-exchange is enough to detect the ABA problem
//! without a native double-word CAS (see `spec.md` §9, "Double-word
//! CAS"). Canonical x86-64/AArch64 user-space pointers fit in 48 bits,
//! leaving the top 16 bits free for the tag.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

const PTR_BITS: u32 = 48;
const PTR_MASK: usize = (1 << PTR_BITS) - 1;

/// A `(tag, ptr)` pair packed into one `usize` and updated atomically.
pub(crate) struct TaggedPtr<T> {
    data: usize,
    _marker: PhantomData<*mut T>,
}

impl<T> Clone for TaggedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for TaggedPtr<T> {}

impl<T> TaggedPtr<T> {
    pub(crate) fn new(ptr: *mut T, tag: usize) -> Self {
        let addr = (ptr as usize) & PTR_MASK;
        TaggedPtr {
            data: (tag << PTR_BITS) | addr,
            _marker: PhantomData,
        }
    }

    pub(crate) fn null() -> Self {
        TaggedPtr {
            data: 0,
            _marker: PhantomData,
        }
    }

    pub(crate) fn ptr(self) -> *mut T {
        (self.data & PTR_MASK) as *mut T
    }

    pub(crate) fn tag(self) -> usize {
        self.data >> PTR_BITS
    }

    pub(crate) fn is_null(self) -> bool {
        self.ptr().is_null()
    }

    pub(crate) fn to_usize(self) -> usize {
        self.data
    }

    pub(crate) fn from_usize(data: usize) -> Self {
        TaggedPtr {
            data,
            _marker: PhantomData,
        }
    }
}

/// An [`AtomicUsize`] viewed as an atomic [`TaggedPtr<T>`].
pub(crate) struct AtomicTaggedPtr<T> {
    inner: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

impl<T> AtomicTaggedPtr<T> {
    pub(crate) fn new(initial: TaggedPtr<T>) -> Self {
        AtomicTaggedPtr {
            inner: AtomicUsize::new(initial.to_usize()),
            _marker: PhantomData,
        }
    }

    pub(crate) fn load(&self, order: Ordering) -> TaggedPtr<T> {
        TaggedPtr::from_usize(self.inner.load(order))
    }

    pub(crate) fn store(&self, new: TaggedPtr<T>, order: Ordering) {
        self.inner.store(new.to_usize(), order)
    }

    pub(crate) fn compare_exchange_weak(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        self.inner
            .compare_exchange_weak(current.to_usize(), new.to_usize(), success, failure)
            .map(TaggedPtr::from_usize)
            .map_err(TaggedPtr::from_usize)
    }

    pub(crate) fn compare_exchange(
        &self,
        current: TaggedPtr<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T>, TaggedPtr<T>> {
        self.inner
            .compare_exchange(current.to_usize(), new.to_usize(), success, failure)
            .map(TaggedPtr::from_usize)
            .map_err(TaggedPtr::from_usize)
    }
}
