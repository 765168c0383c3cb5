//! OS thread primitives: create / current / detach / join / sleep /
//! yield / suspend / resume / cancel / raise / kill / name, plus a
//! process-wide thread control block (TCB) registry.
//!
//! Every live thread created through [`create`] registers itself in a
//! registry keyed by its own `pthread_t`, implemented with the
//! lock-free ordered [`List`](crate::list::List) from this crate.
//! Suspend/resume is implemented with a real `SIGURG` signal: the
//! signal handler blocks on a per-thread semaphore, so a suspended
//! thread is genuinely parked wherever it happened to be (including
//! inside a blocking syscall like `nanosleep`), not merely paused at
//! the next cooperative checkpoint.
//!
//! Thread creation goes through raw `pthread_create` rather than
//! `std::thread::spawn`: callers need the new thread's `pthread_t`
//! handle back immediately (to suspend/resume/cancel/name it later),
//! and the standard library does not expose that handle.

use std::cell::Cell;
use std::ffi::CString;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::list::List;
use crate::promise::Promise;
use crate::slab::SlabPool;

/// Opaque OS thread handle (a `pthread_t`).
pub type ThreadHandle = libc::pthread_t;

const MAX_THREADS: usize = 256;
const NAME_MAX: usize = 16;

#[derive(Clone, Copy)]
struct Tcb {
    tid: libc::pid_t,
    parent_handle: ThreadHandle,
    handle: ThreadHandle,
    name: [u8; NAME_MAX],
    suspend: *mut libc::sem_t,
}

unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

struct Registry {
    tcbs: List<Tcb>,
    suspends: SlabPool<libc::sem_t>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        tcbs: List::create(MAX_THREADS).expect("tcb registry capacity"),
        suspends: SlabPool::create(MAX_THREADS).expect("suspend semaphore pool capacity"),
    })
}

fn key_of(handle: ThreadHandle) -> i64 {
    handle as i64
}

thread_local! {
    static SUSPEND_SEM: Cell<*mut libc::sem_t> = Cell::new(std::ptr::null_mut());
}

type BoxedJob = Box<dyn FnOnce() -> isize + Send + 'static>;

struct StartupBucket {
    job: BoxedJob,
    promise: Promise<isize>,
    parent_handle: ThreadHandle,
    name: [u8; NAME_MAX],
}

extern "C" fn internal_signaled(_sig: libc::c_int) {
    SUSPEND_SEM.with(|cell| {
        let sem = cell.get();
        if !sem.is_null() {
            unsafe {
                libc::sem_wait(sem);
            }
        }
    });
}

fn install_sigurg_handler() -> Result<()> {
    unsafe {
        let mut act: libc::sigaction = std::mem::zeroed();
        act.sa_sigaction = internal_signaled as usize;
        act.sa_flags = libc::SA_RESTART | libc::SA_ONSTACK;
        libc::sigemptyset(&mut act.sa_mask);
        if libc::sigaction(libc::SIGURG, &act, std::ptr::null_mut()) != 0 {
            return Err(Error::from_errno());
        }
    }
    Ok(())
}

/// Removes this thread's TCB from the registry and returns its suspend
/// semaphore to the slab when the thread exits, whichever way that
/// happens: a normal return from `job()`, an early return from
/// `trampoline` itself, or the forced unwind `pthread_cancel`'s
/// deferred cancellation drives through this frame. Constructed right
/// after the TCB is inserted so its `Drop` always runs — the Rust-side
/// equivalent of the original's `pthread_key_create` TSD destructor
/// (`internal_task_finalizer` in `threads_posix.c`), which the C
/// library relies on for the same any-exit guarantee.
struct TcbGuard {
    handle: ThreadHandle,
}

impl Drop for TcbGuard {
    fn drop(&mut self) {
        if let Ok(tcb) = registry().tcbs.delete(key_of(self.handle)) {
            unsafe {
                registry().suspends.free(tcb.suspend);
            }
        }
    }
}

extern "C" fn trampoline(arg: *mut libc::c_void) -> *mut libc::c_void {
    let bucket = unsafe { Box::from_raw(arg as *mut StartupBucket) };
    let StartupBucket {
        job,
        promise,
        parent_handle,
        name,
    } = *bucket;

    let handle = unsafe { libc::pthread_self() };
    let tid = unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t };

    let suspend = match registry().suspends.alloc() {
        Ok(sem) => sem,
        Err(_) => {
            promise.set_value(-(libc::ENOMEM as isize));
            return std::ptr::null_mut();
        }
    };
    if unsafe { libc::sem_init(suspend, 0, 0) } != 0 {
        let code = Error::from_errno().os_code();
        unsafe {
            registry().suspends.free(suspend);
        }
        promise.set_value(-(code as isize));
        return std::ptr::null_mut();
    }

    let tcb = Tcb {
        tid,
        parent_handle,
        handle,
        name,
        suspend,
    };
    if registry().tcbs.insert(key_of(handle), tcb).is_err() {
        unsafe {
            registry().suspends.free(suspend);
        }
        promise.set_value(-(libc::ENOMEM as isize));
        return std::ptr::null_mut();
    }

    let _tcb_guard = TcbGuard { handle };

    SUSPEND_SEM.with(|cell| cell.set(suspend));
    if let Err(err) = install_sigurg_handler() {
        promise.set_value(-(err.os_code() as isize));
        return std::ptr::null_mut();
    }

    promise.set_value(0);

    let result = job();

    result as usize as *mut libc::c_void
}

/// Spawns a new OS thread running `func`, blocking until the thread has
/// finished registering itself (or failed to).
///
/// Returns the new thread's handle, usable with [`suspend`],
/// [`resume`], [`cancel`], [`set_name`], and [`join`].
pub fn create<F>(func: F) -> Result<ThreadHandle>
where
    F: FnOnce() -> isize + Send + 'static,
{
    let promise = Promise::new();
    let future = promise.get_future();
    let bucket = Box::new(StartupBucket {
        job: Box::new(func),
        promise,
        parent_handle: unsafe { libc::pthread_self() },
        name: [0u8; NAME_MAX],
    });
    let raw = Box::into_raw(bucket);

    let mut handle: ThreadHandle = unsafe { std::mem::zeroed() };
    let err = unsafe {
        libc::pthread_create(&mut handle, std::ptr::null(), trampoline, raw as *mut libc::c_void)
    };
    if err != 0 {
        unsafe {
            drop(Box::from_raw(raw));
        }
        return Err(Error::Os(err));
    }

    let status = future.get_value();
    if status < 0 {
        let err = Error::Os((-status) as i32);
        tracing::warn!(error = ?err, "thread failed to start");
        return Err(err);
    }
    tracing::debug!(handle = handle as usize, "thread created");
    Ok(handle)
}

/// Returns the calling thread's own handle.
pub fn current() -> ThreadHandle {
    unsafe { libc::pthread_self() }
}

/// Detaches `thr`, releasing its resources automatically on exit.
pub fn detach(thr: ThreadHandle) -> Result<()> {
    let err = unsafe { libc::pthread_detach(thr) };
    if err != 0 {
        return Err(Error::Os(err));
    }
    Ok(())
}

/// Whether `a` and `b` refer to the same thread.
pub fn equal(a: ThreadHandle, b: ThreadHandle) -> bool {
    unsafe { libc::pthread_equal(a, b) != 0 }
}

/// Terminates the calling thread with exit code `res`. Never returns.
pub fn exit(res: isize) -> ! {
    tracing::debug!(handle = current() as usize, res, "thread exiting");
    unsafe {
        libc::pthread_exit(res as usize as *mut libc::c_void);
    }
    unreachable!("pthread_exit does not return")
}

/// Waits for `thr` to finish, returning its exit code.
pub fn join(thr: ThreadHandle) -> Result<isize> {
    let mut status: *mut libc::c_void = std::ptr::null_mut();
    let err = unsafe { libc::pthread_join(thr, &mut status) };
    if err != 0 {
        return Err(Error::Os(err));
    }
    Ok(status as isize)
}

/// Sleeps for `duration`, resuming with the remaining time if
/// interrupted (e.g. by a [`suspend`]/[`resume`] cycle).
pub fn sleep(duration: Duration) {
    let mut ts = libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as i64,
    };
    loop {
        let mut rem: libc::timespec = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &ts, &mut rem) };
        if ret != libc::EINTR {
            break;
        }
        ts = rem;
    }
}

/// Yields the remainder of the calling thread's time slice.
pub fn yield_now() {
    unsafe {
        libc::sched_yield();
    }
}

/// Forces `thr` to block on its suspend semaphore via `SIGURG`,
/// wherever it currently is (including inside a blocking syscall).
pub fn suspend(thr: ThreadHandle) -> Result<()> {
    let err = unsafe { libc::pthread_kill(thr, libc::SIGURG) };
    if err != 0 {
        let err = Error::Os(err);
        tracing::warn!(handle = thr as usize, error = ?err, "thread suspend failed");
        return Err(err);
    }
    tracing::debug!(handle = thr as usize, "thread suspended");
    Ok(())
}

/// Wakes a thread parked by [`suspend`].
pub fn resume(thr: ThreadHandle) -> Result<()> {
    let tcb = registry().tcbs.search(key_of(thr)).map_err(|_| {
        tracing::warn!(handle = thr as usize, "resume target not found in registry");
        Error::NotFound
    })?;
    unsafe {
        libc::sem_post(tcb.suspend);
    }
    tracing::debug!(handle = thr as usize, "thread resumed");
    Ok(())
}

/// Requests cancellation of `thr`.
pub fn cancel(thr: ThreadHandle) -> Result<()> {
    let err = unsafe { libc::pthread_cancel(thr) };
    if err != 0 {
        return Err(Error::Os(err));
    }
    Ok(())
}

/// Raises `sig` in the calling thread.
pub fn raise(sig: libc::c_int) -> Result<()> {
    let err = unsafe { libc::raise(sig) };
    if err != 0 {
        return Err(Error::Os(err));
    }
    Ok(())
}

/// Sends `sig` to `thr`.
pub fn kill(thr: ThreadHandle, sig: libc::c_int) -> Result<()> {
    let err = unsafe { libc::pthread_kill(thr, sig) };
    if err != 0 {
        return Err(Error::Os(err));
    }
    Ok(())
}

/// Sets `thr`'s name (truncated to 15 bytes + NUL).
pub fn set_name(thr: ThreadHandle, name: &str) -> Result<()> {
    let key = key_of(thr);
    let mut tcb = registry().tcbs.search(key).map_err(|_| Error::NotFound)?;

    let bytes = name.as_bytes();
    let n = bytes.len().min(NAME_MAX - 1);
    tcb.name = [0u8; NAME_MAX];
    tcb.name[..n].copy_from_slice(&bytes[..n]);

    if let Ok(cname) = CString::new(&tcb.name[..n]) {
        unsafe {
            libc::pthread_setname_np(tcb.handle, cname.as_ptr());
        }
    }

    registry().tcbs.update(key, tcb)?;
    Ok(())
}

/// Returns `thr`'s name.
pub fn get_name(thr: ThreadHandle) -> Result<String> {
    let tcb = registry().tcbs.search(key_of(thr)).map_err(|_| Error::NotFound)?;
    let end = tcb.name.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
    Ok(String::from_utf8_lossy(&tcb.name[..end]).into_owned())
}

/// Not supported on this platform; always returns
/// [`Error::NotSupported`].
pub fn set_priority(_thr: ThreadHandle, _priority: i32) -> Result<()> {
    Err(Error::NotSupported)
}

/// Not supported on this platform; always returns
/// [`Error::NotSupported`].
pub fn get_priority(_thr: ThreadHandle) -> Result<i32> {
    Err(Error::NotSupported)
}

/// Not supported on this platform; always returns
/// [`Error::NotSupported`].
pub fn set_affinity(_thr: ThreadHandle, _cpus: &[usize]) -> Result<()> {
    Err(Error::NotSupported)
}

/// Not supported on this platform; always returns
/// [`Error::NotSupported`].
pub fn get_affinity(_thr: ThreadHandle) -> Result<Vec<usize>> {
    Err(Error::NotSupported)
}
