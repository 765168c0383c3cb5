//! Lock-free ordered list keyed by a signed 64-bit key, backed by a
//! [`SlabPool`].
//!
//! This is a Harris–Michael style list: deletion is logical (a mark
//! bit on the deleted node's own successor pointer) followed by
//! physical unlinking (a CAS on the predecessor's successor pointer).
//! What makes this variant different from a plain Harris list is the
//! extra *flag* bit and the *backlink* field: flagging the
//! predecessor edge before marking the target serializes concurrent
//! deletes of adjacent nodes, and the backlink lets a thread that
//! finds itself sitting on an already-marked (deleted) node walk back
//! to a still-live predecessor instead of restarting the search from
//! the head.
//!
//! Reclamation is synchronous and immediate: a deleted node is
//! returned to the slab as soon as its physical unlink completes.
//! There is no grace period, so a thread must not hold a raw reference
//! to a node across a delete it didn't perform itself — this crate's
//! public API never exposes node pointers, only copies of values, so
//! that invariant is upheld structurally.
//!
//! A single list-wide reader/writer counter (not a per-node lock)
//! guards the *payload* bytes of each node: concurrent reads increment
//! it, a writer drives it to a sentinel "exclusive" value first. It
//! has nothing to do with the mark/flag bits, which protect structure,
//! not payload.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::slab::SlabPool;

const MARK_BIT: usize = 0b01;
const FLAG_BIT: usize = 0b10;
const PTR_MASK: usize = !(MARK_BIT | FLAG_BIT);

struct ListNode<V> {
    succ: AtomicUsize,
    backlink: AtomicPtr<ListNode<V>>,
    key: i64,
    value: std::cell::UnsafeCell<MaybeUninit<V>>,
}

unsafe impl<V: Send> Send for ListNode<V> {}
unsafe impl<V: Send> Sync for ListNode<V> {}

impl<V> ListNode<V> {
    fn pack(ptr: *mut ListNode<V>, marked: bool, flagged: bool) -> usize {
        let mut bits = ptr as usize & PTR_MASK;
        if marked {
            bits |= MARK_BIT;
        }
        if flagged {
            bits |= FLAG_BIT;
        }
        bits
    }

    fn unpack_ptr(raw: usize) -> *mut ListNode<V> {
        (raw & PTR_MASK) as *mut ListNode<V>
    }

    fn unpack_marked(raw: usize) -> bool {
        raw & MARK_BIT != 0
    }

    fn unpack_flagged(raw: usize) -> bool {
        raw & FLAG_BIT != 0
    }

    fn load_succ(&self) -> usize {
        self.succ.load(Ordering::SeqCst)
    }
}

/// A bounded, lock-free ordered list of `i64`-keyed values.
pub struct List<V> {
    pool: SlabPool<ListNode<V>>,
    head: *mut ListNode<V>,
    tail: *mut ListNode<V>,
    readers: AtomicU32,
    len: AtomicUsize,
}

unsafe impl<V: Send> Send for List<V> {}
unsafe impl<V: Send> Sync for List<V> {}

impl<V: Clone> List<V> {
    /// Creates a list that can hold up to `capacity` entries.
    pub fn create(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument);
        }
        let pool = SlabPool::create(capacity + 2)?;
        let head = Self::alloc_node(&pool, i64::MIN)?;
        let tail = Self::alloc_node(&pool, i64::MAX)?;
        unsafe {
            (*head).succ.store(ListNode::pack(tail, false, false), Ordering::SeqCst);
        }
        Ok(List {
            pool,
            head,
            tail,
            readers: AtomicU32::new(0),
            len: AtomicUsize::new(0),
        })
    }

    fn alloc_node(pool: &SlabPool<ListNode<V>>, key: i64) -> Result<*mut ListNode<V>> {
        let node = pool.alloc()?;
        unsafe {
            (*node).succ.store(ListNode::pack(std::ptr::null_mut(), false, false), Ordering::SeqCst);
            (*node).backlink.store(std::ptr::null_mut(), Ordering::SeqCst);
            (*node).key = key;
        }
        Ok(node)
    }

    /// Walks the list starting at `curr`, returning the last node whose
    /// key is `<= key` and the node right after it, helping unlink any
    /// marked nodes encountered along the way.
    fn search_from(
        &self,
        key: i64,
        mut curr: *mut ListNode<V>,
    ) -> (*mut ListNode<V>, *mut ListNode<V>) {
        let mut next = unsafe { ListNode::unpack_ptr((*curr).load_succ()) };

        while unsafe { (*next).key } <= key {
            while unsafe { ListNode::unpack_marked((*next).load_succ()) }
                && unsafe {
                    !ListNode::unpack_marked((*curr).load_succ())
                        || ListNode::unpack_ptr((*curr).load_succ()) != next
                }
            {
                if unsafe { ListNode::unpack_ptr((*curr).load_succ()) } == next {
                    self.help_marked(curr, next);
                }
                next = unsafe { ListNode::unpack_ptr((*curr).load_succ()) };
            }

            if unsafe { (*next).key } <= key {
                curr = next;
                next = unsafe { ListNode::unpack_ptr((*curr).load_succ()) };
            }
        }

        (curr, next)
    }

    fn help_marked(&self, prev: *mut ListNode<V>, del: *const ListNode<V>) {
        let expected = ListNode::pack(del as *mut ListNode<V>, false, true);
        let new_next = unsafe { ListNode::unpack_ptr((*del).load_succ()) };
        let replacement = ListNode::pack(new_next, false, false);
        unsafe {
            let _ = (*prev).succ.compare_exchange(
                expected,
                replacement,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }
    }

    fn try_mark(&self, del: *mut ListNode<V>) {
        loop {
            let next = unsafe { ListNode::unpack_ptr((*del).load_succ()) };
            let expected = ListNode::pack(next, false, false);
            let marked = ListNode::pack(next, true, false);
            unsafe {
                let _ = (*del).succ.compare_exchange(expected, marked, Ordering::SeqCst, Ordering::SeqCst);
            }

            let result = unsafe { (*del).load_succ() };
            if !ListNode::unpack_marked(result) && ListNode::unpack_flagged(result) {
                self.help_flagged(del, ListNode::unpack_ptr(result));
            }

            if unsafe { ListNode::unpack_marked((*del).load_succ()) } {
                break;
            }
        }
    }

    fn help_flagged(&self, prev: *mut ListNode<V>, del: *mut ListNode<V>) {
        unsafe {
            (*del).backlink.store(prev, Ordering::SeqCst);
        }
        if unsafe { !ListNode::unpack_marked((*del).load_succ()) } {
            self.try_mark(del);
        }
        self.help_marked(prev, del);
    }

    fn try_flag(
        &self,
        mut prev: *mut ListNode<V>,
        target: *mut ListNode<V>,
    ) -> (bool, Option<*mut ListNode<V>>) {
        loop {
            let prev_succ = unsafe { (*prev).load_succ() };
            if ListNode::unpack_ptr(prev_succ) == target
                && !ListNode::unpack_marked(prev_succ)
                && ListNode::unpack_flagged(prev_succ)
            {
                return (false, Some(prev));
            }

            let expected = ListNode::pack(target, false, false);
            let flagged = ListNode::pack(target, false, true);
            let cas = unsafe {
                (*prev)
                    .succ
                    .compare_exchange(expected, flagged, Ordering::SeqCst, Ordering::SeqCst)
            };
            if cas.is_ok() {
                return (true, Some(prev));
            }

            let result = unsafe { (*prev).load_succ() };
            if ListNode::unpack_ptr(result) == target
                && !ListNode::unpack_marked(result)
                && ListNode::unpack_flagged(result)
            {
                return (false, Some(prev));
            }

            while unsafe { ListNode::unpack_marked((*prev).load_succ()) } {
                prev = unsafe { (*prev).backlink.load(Ordering::SeqCst) };
            }

            let (new_prev, del) = self.search_from(unsafe { (*target).key } - 1, prev);
            prev = new_prev;
            if del != target {
                return (false, None);
            }
        }
    }

    fn search_node(&self, key: i64) -> Option<*mut ListNode<V>> {
        let (curr, _) = self.search_from(key, self.head);
        if unsafe { (*curr).key } == key {
            Some(curr)
        } else {
            None
        }
    }

    fn acquire_reader(&self) {
        loop {
            let orig = self.readers.load(Ordering::SeqCst);
            if orig == u32::MAX {
                continue;
            }
            if self
                .readers
                .compare_exchange_weak(orig, orig + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    fn release_reader(&self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }

    fn acquire_writer(&self) {
        loop {
            let orig = self.readers.load(Ordering::SeqCst);
            if orig != 0 {
                continue;
            }
            if self
                .readers
                .compare_exchange_weak(orig, u32::MAX, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    fn release_writer(&self) {
        self.readers.store(0, Ordering::SeqCst);
    }

    /// Inserts `value` under `key`. Returns [`Error::AlreadyExists`] if
    /// `key` is already present, or [`Error::OutOfMemory`] if the list
    /// is at capacity.
    pub fn insert(&self, key: i64, value: V) -> Result<()> {
        let (mut prev, mut next) = self.search_from(key, self.head);
        if unsafe { (*prev).key } == key {
            return Err(Error::AlreadyExists);
        }

        let node = self.pool.alloc()?;
        unsafe {
            (*node).backlink.store(std::ptr::null_mut(), Ordering::SeqCst);
            (*node).key = key;
            (*node).value.get().write(MaybeUninit::new(value));
            (*node).succ.store(ListNode::pack(next, false, false), Ordering::SeqCst);
        }

        loop {
            let prev_succ = unsafe { (*prev).load_succ() };
            if ListNode::unpack_flagged(prev_succ) && !ListNode::unpack_marked(prev_succ) {
                self.help_flagged(prev, ListNode::unpack_ptr(prev_succ));
            } else {
                unsafe {
                    (*node).succ.store(ListNode::pack(next, false, false), Ordering::SeqCst);
                }
                let expected = ListNode::pack(next, false, false);
                let linked = ListNode::pack(node, false, false);
                let cas = unsafe {
                    (*prev)
                        .succ
                        .compare_exchange(expected, linked, Ordering::SeqCst, Ordering::SeqCst)
                };
                if cas.is_ok() {
                    break;
                }

                let result = unsafe { (*prev).load_succ() };
                if !ListNode::unpack_marked(result) && ListNode::unpack_flagged(result) {
                    self.help_flagged(prev, ListNode::unpack_ptr(result));
                }
                while unsafe { ListNode::unpack_marked((*prev).load_succ()) } {
                    prev = unsafe { (*prev).backlink.load(Ordering::SeqCst) };
                }
            }

            let (new_prev, new_next) = self.search_from(key, prev);
            prev = new_prev;
            next = new_next;
            if unsafe { (*prev).key } == key {
                unsafe {
                    self.pool.free(node);
                }
                return Err(Error::AlreadyExists);
            }
        }

        self.len.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Removes `key` and returns its value. Returns
    /// [`Error::NotFound`] if `key` is absent (including if another
    /// thread deletes it first).
    pub fn delete(&self, key: i64) -> Result<V> {
        // `key - 1` can overflow at `i64::MIN`; the original relies on C's
        // silent two's-complement wraparound here (`collections.c:1099`),
        // so `wrapping_sub` reproduces that runtime behavior instead of
        // panicking in an overflow-checked build.
        let (prev, del) = self.search_from(key.wrapping_sub(1), self.head);
        if unsafe { (*del).key } != key {
            return Err(Error::NotFound);
        }

        let (deleted, result) = self.try_flag(prev, del);
        if let Some(result_node) = result {
            self.help_flagged(result_node, del);
        }
        if !deleted {
            return Err(Error::NotFound);
        }

        self.acquire_reader();
        let value = unsafe { (&*((*del).value.get() as *const V)).clone() };
        self.release_reader();

        unsafe {
            self.pool.free(del);
        }
        self.len.fetch_sub(1, Ordering::Relaxed);
        Ok(value)
    }

    /// Returns a copy of the value stored under `key`.
    pub fn search(&self, key: i64) -> Result<V> {
        let target = self.search_node(key).ok_or(Error::NotFound)?;
        self.acquire_reader();
        let value = unsafe { (&*((*target).value.get() as *const V)).clone() };
        self.release_reader();
        Ok(value)
    }

    /// Replaces the value stored under `key`.
    pub fn update(&self, key: i64, value: V) -> Result<()> {
        let target = self.search_node(key).ok_or(Error::NotFound)?;
        self.acquire_writer();
        unsafe {
            let slot = (*target).value.get();
            std::ptr::drop_in_place((*slot).as_mut_ptr());
            slot.write(MaybeUninit::new(value));
        }
        self.release_writer();
        Ok(())
    }

    /// Approximate number of entries currently in the list.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Whether the list currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries this list can hold at once.
    pub fn capacity(&self) -> usize {
        self.pool.capacity() - 2
    }
}
