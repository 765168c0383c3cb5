use slabweave::SlabPool;

#[test]
fn freeable_plus_outstanding_equals_capacity() {
    let pool: SlabPool<[u8; 4]> = SlabPool::create(10).unwrap();
    assert_eq!(pool.freeable(), 10);

    let mut outstanding = Vec::new();
    for _ in 0..5 {
        outstanding.push(pool.alloc().unwrap());
    }
    assert_eq!(pool.freeable(), 5);
    assert_eq!(pool.freeable() + outstanding.len(), pool.capacity());

    for ptr in outstanding.drain(..) {
        unsafe {
            pool.free(ptr);
        }
    }
    assert_eq!(pool.freeable(), 10);

    let mut reallocated = Vec::new();
    for _ in 0..10 {
        let ptr = pool.alloc().unwrap();
        assert!(pool.contains(ptr));
        reallocated.push(ptr);
    }
    assert_eq!(pool.freeable(), 0);
    assert!(pool.alloc().is_err());
}

#[test]
fn zero_capacity_is_rejected() {
    let result: Result<SlabPool<u8>, _> = SlabPool::create(0);
    assert!(result.is_err());
}

#[test]
fn clear_reclaims_every_slot() {
    let pool: SlabPool<u64> = SlabPool::create(4).unwrap();
    for _ in 0..4 {
        pool.alloc().unwrap();
    }
    assert_eq!(pool.freeable(), 0);
    pool.clear();
    assert_eq!(pool.freeable(), 4);
}
