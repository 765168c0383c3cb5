use slabweave::error::Error;
use slabweave::thread;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn create_runs_func_and_join_returns_its_result() {
    let handle = thread::create(|| 42).unwrap();
    let result = thread::join(handle).unwrap();
    assert_eq!(result, 42);
}

#[test]
fn current_is_equal_to_itself_and_not_to_a_child() {
    let here = thread::current();
    assert!(thread::equal(here, here));

    let observed = Arc::new(AtomicI64::new(0));
    let observed_clone = Arc::clone(&observed);
    let handle = thread::create(move || {
        observed_clone.store(thread::current() as i64, Ordering::SeqCst);
        0
    })
    .unwrap();
    thread::join(handle).unwrap();

    assert!(!thread::equal(here, observed.load(Ordering::SeqCst) as thread::ThreadHandle));
}

#[test]
fn set_name_then_get_name_round_trips() {
    let handle = thread::create(|| {
        thread::sleep(Duration::from_millis(200));
        0
    })
    .unwrap();

    thread::set_name(handle, "probe-thread").unwrap();
    assert_eq!(thread::get_name(handle).unwrap(), "probe-thread");

    thread::join(handle).unwrap();
}

#[test]
fn name_longer_than_fifteen_chars_is_truncated() {
    let handle = thread::create(|| {
        thread::sleep(Duration::from_millis(200));
        0
    })
    .unwrap();

    thread::set_name(handle, "a-name-well-over-fifteen-characters-long").unwrap();
    let got = thread::get_name(handle).unwrap();
    assert!(got.len() <= 15);

    thread::join(handle).unwrap();
}

#[test]
fn get_name_on_unknown_handle_is_not_found() {
    // A handle value that was never registered (the dead child from the
    // previous test, post-join, still satisfies this since its TCB was
    // removed by the finalizer on exit).
    let handle = thread::create(|| 0).unwrap();
    thread::join(handle).unwrap();
    assert!(matches!(thread::get_name(handle), Err(Error::NotFound)));
}

#[test]
fn suspend_then_resume_blocks_the_target_thread() {
    let uptime = Arc::new(AtomicI64::new(0));
    let uptime_clone = Arc::clone(&uptime);

    let handle = thread::create(move || {
        let start = Instant::now();
        thread::sleep(Duration::from_secs(1));
        uptime_clone.store(start.elapsed().as_millis() as i64, Ordering::SeqCst);
        0
    })
    .unwrap();

    // Give the child a moment to land inside its sleep before suspending it.
    thread::sleep(Duration::from_millis(100));
    thread::suspend(handle).unwrap();
    thread::sleep(Duration::from_secs(1));
    thread::resume(handle).unwrap();

    thread::join(handle).unwrap();
    let elapsed = uptime.load(Ordering::SeqCst);
    assert!(elapsed > 1900, "expected >1.9s elapsed, got {elapsed}ms");
}

#[test]
fn cancelled_thread_still_releases_its_tcb_and_semaphore() {
    // Regression test for the TCB/semaphore leak on pthread_cancel:
    // the registry cleanup used to be plain code after job(), which a
    // cancelled thread's job() (an unconditional loop) never reaches.
    let handle = thread::create(|| {
        loop {
            thread::sleep(Duration::from_millis(50));
        }
    })
    .unwrap();

    thread::set_name(handle, "cancel-me").unwrap();
    assert_eq!(thread::get_name(handle).unwrap(), "cancel-me");

    thread::cancel(handle).unwrap();
    thread::join(handle).unwrap();

    // The TCB guard's Drop must have fired during the cancellation
    // unwind, freeing both the registry slot and the suspend semaphore.
    assert!(matches!(thread::get_name(handle), Err(Error::NotFound)));
}

#[test]
fn many_cancelled_threads_do_not_exhaust_the_registry() {
    // The registry and suspend-semaphore slabs both cap out at 256
    // (thread/mod.rs MAX_THREADS). If cancellation leaked a TCB per
    // thread, this loop would start failing with Error::OutOfMemory
    // well before 300 iterations.
    for _ in 0..300 {
        let handle = thread::create(|| {
            loop {
                thread::sleep(Duration::from_millis(10));
            }
        })
        .unwrap();
        thread::cancel(handle).unwrap();
        thread::join(handle).unwrap();
    }
}

#[test]
fn priority_and_affinity_accessors_are_not_supported() {
    let handle = thread::current();
    assert!(matches!(
        thread::set_priority(handle, 1),
        Err(Error::NotSupported)
    ));
    assert!(matches!(
        thread::get_priority(handle),
        Err(Error::NotSupported)
    ));
    assert!(matches!(
        thread::set_affinity(handle, &[0]),
        Err(Error::NotSupported)
    ));
    assert!(matches!(
        thread::get_affinity(handle),
        Err(Error::NotSupported)
    ));
}
