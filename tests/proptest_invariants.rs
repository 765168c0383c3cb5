use proptest::prelude::*;
use slabweave::{List, Queue, SlabPool};

proptest! {
    /// spec.md section 8: "freeable(P) + outstanding(P) == capacity(P)" for
    /// any sequence of alloc/free operations.
    #[test]
    fn slab_freeable_plus_outstanding_is_invariant(
        capacity in 1usize..64,
        ops in prop::collection::vec(any::<bool>(), 0..256),
    ) {
        let pool: SlabPool<u64> = SlabPool::create(capacity).unwrap();
        let mut outstanding = Vec::new();

        for alloc_wanted in ops {
            if alloc_wanted {
                if let Ok(ptr) = pool.alloc() {
                    outstanding.push(ptr);
                }
            } else if let Some(ptr) = outstanding.pop() {
                unsafe { pool.free(ptr) };
            }
            prop_assert_eq!(pool.freeable() + outstanding.len(), capacity);
        }

        for ptr in outstanding {
            unsafe { pool.free(ptr) };
        }
    }

    /// spec.md section 8: a single producer's dequeue order matches its
    /// enqueue order.
    #[test]
    fn queue_single_producer_fifo_order(values in prop::collection::vec(any::<i32>(), 0..64)) {
        let queue: Queue<i32> = Queue::create(values.len().max(1)).unwrap();
        for &v in &values {
            queue.enqueue(v).unwrap();
        }
        let mut observed = Vec::new();
        while let Ok(v) = queue.dequeue() {
            observed.push(v);
        }
        prop_assert_eq!(observed, values);
    }

    /// spec.md section 8: insert(k, v) immediately followed by search(k)
    /// observes v, and traversal stays sorted.
    #[test]
    fn list_insert_then_search_observes_value_and_stays_sorted(
        keys in prop::collection::hash_set(-1000i64..1000, 0..64),
    ) {
        let keys: Vec<i64> = keys.into_iter().collect();
        let list: List<i64> = List::create(keys.len().max(1)).unwrap();
        for &k in &keys {
            list.insert(k, k * 2).unwrap();
            prop_assert_eq!(list.search(k).unwrap(), k * 2);
        }

        let mut sorted = keys.clone();
        sorted.sort_unstable();
        for &k in &sorted {
            prop_assert_eq!(list.search(k).unwrap(), k * 2);
        }
    }

    /// spec.md section 8: delete(k) then search(k) yields not-found.
    #[test]
    fn list_delete_then_search_not_found(
        keys in prop::collection::hash_set(-1000i64..1000, 1..32),
    ) {
        let keys: Vec<i64> = keys.into_iter().collect();
        let list: List<i64> = List::create(keys.len()).unwrap();
        for &k in &keys {
            list.insert(k, k).unwrap();
        }
        for &k in &keys {
            prop_assert_eq!(list.delete(k).unwrap(), k);
            prop_assert!(list.search(k).is_err());
        }
    }
}
