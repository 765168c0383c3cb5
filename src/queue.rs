//! Bounded MPMC FIFO queue, backed by a [`SlabPool`].
//!
//! The chain is a Michael–Scott queue exactly like the slab's own free
//! list, but it links *value* nodes handed out by the slab rather than
//! free fragments. A queue of capacity `n` needs a slab of capacity
//! `n + 1`: one slot per outstanding value plus the queue's own
//! sentinel node.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::slab::SlabPool;
use crate::tagged::{AtomicTaggedPtr, TaggedPtr};

struct QueueNode<V> {
    next: AtomicUsize,
    value: std::cell::UnsafeCell<MaybeUninit<V>>,
}

unsafe impl<V: Send> Send for QueueNode<V> {}
unsafe impl<V: Send> Sync for QueueNode<V> {}

/// A bounded, lock-free FIFO queue.
pub struct Queue<V> {
    pool: SlabPool<QueueNode<V>>,
    head: AtomicTaggedPtr<QueueNode<V>>,
    tail: AtomicTaggedPtr<QueueNode<V>>,
}

unsafe impl<V: Send> Send for Queue<V> {}
unsafe impl<V: Send> Sync for Queue<V> {}

impl<V> Queue<V> {
    /// Creates a queue that can hold up to `capacity` values at once.
    pub fn create(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument);
        }
        let pool = SlabPool::create(capacity + 1)?;
        let sentinel = pool.alloc().expect("fresh pool has a free sentinel slot");
        unsafe {
            (*sentinel)
                .next
                .store(TaggedPtr::<QueueNode<V>>::null().to_usize(), Ordering::Relaxed);
        }
        Ok(Queue {
            pool,
            head: AtomicTaggedPtr::new(TaggedPtr::new(sentinel, 0)),
            tail: AtomicTaggedPtr::new(TaggedPtr::new(sentinel, 0)),
        })
    }

    /// Enqueues `value`. Returns [`Error::OutOfMemory`] if the queue is
    /// at capacity.
    pub fn enqueue(&self, value: V) -> Result<()> {
        let node = self.pool.alloc()?;
        unsafe {
            (*node)
                .next
                .store(TaggedPtr::<QueueNode<V>>::null().to_usize(), Ordering::Relaxed);
            (*node).value.get().write(MaybeUninit::new(value));
        }
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let tail_next_raw = unsafe { (*tail.ptr()).next.load(Ordering::Acquire) };
            let tail_next = TaggedPtr::<QueueNode<V>>::from_usize(tail_next_raw);
            if tail.to_usize() != self.tail.load(Ordering::Acquire).to_usize() {
                continue;
            }
            if tail_next.is_null() {
                let linked = TaggedPtr::new(node, tail_next.tag().wrapping_add(1));
                let cas_ok = unsafe {
                    (*tail.ptr())
                        .next
                        .compare_exchange_weak(
                            tail_next.to_usize(),
                            linked.to_usize(),
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                };
                if cas_ok {
                    let new_tail = TaggedPtr::new(node, tail.tag().wrapping_add(1));
                    let _ = self.tail.compare_exchange(
                        tail,
                        new_tail,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    return Ok(());
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

    /// Dequeues the oldest value. Returns [`Error::NotFound`] if the
    /// queue is empty.
    pub fn dequeue(&self) -> Result<V> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let head_next_raw = unsafe { (*head.ptr()).next.load(Ordering::Acquire) };
            let head_next = TaggedPtr::<QueueNode<V>>::from_usize(head_next_raw);

            if head.to_usize() != self.head.load(Ordering::Acquire).to_usize() {
                continue;
            }
            if head.ptr() == tail.ptr() {
                if head_next.is_null() {
                    return Err(Error::NotFound);
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
            if head_next.is_null() {
                // Tail lagging with no linked next yet: another thread
                // is mid-enqueue, retry.
                continue;
            }
            let value = unsafe { (*head_next.ptr()).value.get().read().assume_init() };
            let new_head = TaggedPtr::new(head_next.ptr(), head.tag().wrapping_add(1));
            if self
                .head
                .compare_exchange_weak(head, new_head, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                unsafe {
                    self.pool.free(head.ptr());
                }
                return Ok(value);
            }
            // Lost the CAS: another thread will advance head and return
            // this value instead. Forget our read without dropping it,
            // since the node is still linked and still owns it.
            std::mem::forget(value);
        }
    }

    /// Current number of values in the queue. Approximate under
    /// concurrent access.
    pub fn len(&self) -> usize {
        self.pool.capacity().saturating_sub(self.pool.freeable()).saturating_sub(1)
    }

    /// Whether the queue currently holds no values.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.ptr() == tail.ptr()
    }

    /// Maximum number of values this queue can hold at once.
    pub fn capacity(&self) -> usize {
        self.pool.capacity() - 1
    }
}
