use slabweave::Promise;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn set_then_get_observes_value() {
    let promise: Promise<i32> = Promise::new();
    let future = promise.get_future();
    promise.set_value(999);
    assert_eq!(future.get_value(), 999);
}

#[test]
fn has_value_is_non_blocking() {
    let promise: Promise<i32> = Promise::new();
    let future = promise.get_future();
    assert!(!future.has_value());
    promise.set_value(1);
    assert!(future.has_value());
}

#[test]
fn second_set_overwrites_and_resignals() {
    let promise: Promise<i32> = Promise::new();
    let future = promise.get_future();
    promise.set_value(1);
    promise.set_value(2);
    assert_eq!(future.get_value(), 2);
}

#[test]
fn get_value_blocks_until_set_from_another_thread() {
    let promise: Promise<i32> = Promise::new();
    let future = promise.get_future();
    let set_happened = Arc::new(AtomicBool::new(false));

    let setter = {
        let set_happened = Arc::clone(&set_happened);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            set_happened.store(true, Ordering::SeqCst);
            promise.set_value(999);
        })
    };

    // This is the happens-before edge from spec.md section 8: get_value
    // cannot return before the setter thread has actually run.
    let observed = future.get_value();
    assert!(set_happened.load(Ordering::SeqCst));
    assert_eq!(observed, 999);

    setter.join().unwrap();
}

#[test]
fn multiple_futures_share_one_promise() {
    let promise: Promise<i32> = Promise::new();
    let a = promise.get_future();
    let b = promise.get_future();
    promise.set_value(7);
    assert_eq!(a.get_value(), 7);
    assert_eq!(b.get_value(), 7);
}
