//! Work-stealing thread pool.
//!
//! Pool creation spawns `num_workers` OS threads. Worker 0 doubles as
//! the *creator*: it spawns workers `1..num_workers-1` itself, signals
//! the pool's startup promise once they're launched, and then enters
//! the same worker loop as everyone else. [`Pool::submit`] enqueues
//! into the submitting thread's own local queue when called from
//! inside a running job (tracked through a thread-local, exactly like
//! a worker looks itself up), and into the global queue otherwise.
//! Idle workers steal round-robin from their colleagues before falling
//! back to the global queue.

use std::cell::Cell;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::queue::Queue;
use crate::thread::{self, ThreadHandle};

const MAX_JOBS: usize = 32;
const JOB_NAME_MAX: usize = 32;

struct Job {
    #[allow(dead_code)]
    id: u64,
    name: [u8; JOB_NAME_MAX],
    func: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    fn has_name(&self) -> bool {
        self.name[0] != 0
    }

    fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(JOB_NAME_MAX);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

/// Pool-wide counters, read through [`Pool::metrics`].
#[derive(Default)]
pub struct PoolMetrics {
    pub jobs_submitted: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_stolen: AtomicU64,
    pub active_workers: AtomicUsize,
    /// Cumulative nanoseconds spent running job bodies, across every
    /// worker, over the pool's lifetime.
    pub total_job_nanos: AtomicU64,
}

/// Minimal raw pthread mutex/condvar pair used for the seek wait.
///
/// This intentionally does not use `parking_lot`: `thrd_cancel`
/// (`pthread_cancel`) only takes effect at a genuine POSIX
/// cancellation point, and `pthread_cond_wait` is one. A futex-backed
/// condvar would silently swallow cancellation requests delivered
/// while a worker is parked waiting for work.
struct SeekSync {
    mtx: UnsafeCell<libc::pthread_mutex_t>,
    cnd: UnsafeCell<libc::pthread_cond_t>,
}

unsafe impl Send for SeekSync {}
unsafe impl Sync for SeekSync {}

impl SeekSync {
    fn new() -> Self {
        SeekSync {
            mtx: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
            cnd: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
        }
    }

    fn lock(&self) {
        unsafe {
            libc::pthread_mutex_lock(self.mtx.get());
        }
    }

    fn unlock(&self) {
        unsafe {
            libc::pthread_mutex_unlock(self.mtx.get());
        }
    }

    fn wait(&self) {
        unsafe {
            libc::pthread_cond_wait(self.cnd.get(), self.mtx.get());
        }
    }

    fn broadcast(&self) {
        unsafe {
            libc::pthread_cond_broadcast(self.cnd.get());
        }
    }
}

struct WorkerSlot {
    wid: i64,
    local: Option<Queue<Job>>,
    thr: OnceLock<ThreadHandle>,
}

struct PoolShared {
    num_workers: usize,
    global: Queue<Job>,
    seek: SeekSync,
    num_active: AtomicUsize,
    num_local_jobs: AtomicUsize,
    workers: Vec<WorkerSlot>,
    juid: AtomicU64,
    metrics: PoolMetrics,
}

thread_local! {
    /// The calling thread's own local job queue, if it is a worker.
    /// Mirrors the original's single thread-local `ctx` pointer: it is
    /// not scoped to a particular pool, so a worker of pool A that
    /// submits to pool B still routes into pool A's local queue. This
    /// is a faithful reproduction of that behavior, not a new bug.
    static CTX: Cell<*const Queue<Job>> = Cell::new(std::ptr::null());
}

/// A bounded work-stealing thread pool.
pub struct Pool {
    shared: Arc<PoolShared>,
    startup: crate::promise::Future<isize>,
}

impl Pool {
    /// Creates a pool of `num_workers` worker threads.
    pub fn create(num_workers: usize) -> Result<Pool> {
        if num_workers == 0 {
            return Err(Error::InvalidArgument);
        }

        let mut workers = Vec::with_capacity(num_workers + 1);
        for i in 0..num_workers {
            workers.push(WorkerSlot {
                wid: (i + 1) as i64,
                local: Some(Queue::create(MAX_JOBS)?),
                thr: OnceLock::new(),
            });
        }
        workers.push(WorkerSlot {
            wid: -1,
            local: None,
            thr: OnceLock::new(),
        });

        let shared = Arc::new(PoolShared {
            num_workers,
            global: Queue::create(MAX_JOBS)?,
            seek: SeekSync::new(),
            num_active: AtomicUsize::new(0),
            num_local_jobs: AtomicUsize::new(0),
            workers,
            juid: AtomicU64::new(0),
            metrics: PoolMetrics::default(),
        });

        let promise: Promise<isize> = Promise::new();
        let startup = promise.get_future();

        let creator_shared = Arc::clone(&shared);
        let handle = thread::create(move || {
            run_creator(creator_shared, promise);
            0
        })?;
        let _ = shared.workers[0].thr.set(handle);

        Ok(Pool { shared, startup })
    }

    /// Submits `func` for execution. If called from inside a running
    /// job, the job is pushed onto the calling worker's own local
    /// queue; otherwise it goes on the pool's global queue.
    pub fn submit(&self, name: Option<&str>, func: impl FnOnce() + Send + 'static) -> Result<()> {
        let id = self.shared.juid.fetch_add(1, Ordering::Relaxed);
        let mut job_name = [0u8; JOB_NAME_MAX];
        if let Some(n) = name {
            let bytes = n.as_bytes();
            let len = bytes.len().min(JOB_NAME_MAX - 1);
            job_name[..len].copy_from_slice(&bytes[..len]);
        }
        let job = Job {
            id,
            name: job_name,
            func: Box::new(func),
        };

        self.shared.seek.lock();
        let shared = &self.shared;
        let result = CTX.with(|c| {
            let ptr = c.get();
            if !ptr.is_null() {
                let local = unsafe { &*ptr };
                let r = local.enqueue(job);
                if r.is_ok() {
                    shared.num_local_jobs.fetch_add(1, Ordering::SeqCst);
                }
                r
            } else {
                shared.global.enqueue(job)
            }
        });
        self.shared.seek.broadcast();
        self.shared.seek.unlock();

        if result.is_ok() {
            self.shared.metrics.jobs_submitted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(job_id = id, "job submitted");
        }
        result
    }

    /// Returns a snapshot view of the pool's metrics.
    pub fn metrics(&self) -> &PoolMetrics {
        &self.shared.metrics
    }

    /// Number of worker threads in this pool.
    pub fn num_workers(&self) -> usize {
        self.shared.num_workers
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Creator-phase work (spawning the rest of the workers) must
        // be complete before we start cancelling threads.
        let _ = self.startup.get_value();

        for i in (0..self.shared.num_workers).rev() {
            if let Some(&handle) = self.shared.workers[i].thr.get() {
                if thread::cancel(handle).is_ok() {
                    let _ = thread::join(handle);
                }
            }
        }
        tracing::info!(workers = self.shared.num_workers, "pool destroyed");
    }
}

fn run_creator(shared: Arc<PoolShared>, promise: Promise<isize>) {
    for i in 1..shared.num_workers {
        let worker_shared = Arc::clone(&shared);
        match thread::create(move || {
            run_worker(worker_shared, i);
            0
        }) {
            Ok(handle) => {
                let _ = shared.workers[i].thr.set(handle);
            }
            Err(err) => {
                tracing::warn!(worker = i, error = ?err, "worker failed to start");
            }
        }
    }
    promise.set_value(0);
    run_worker(shared, 0);
}

fn run_worker(shared: Arc<PoolShared>, idx: usize) {
    let local_ptr = shared.workers[idx]
        .local
        .as_ref()
        .expect("non-sentinel worker has a local queue") as *const Queue<Job>;
    CTX.with(|c| c.set(local_ptr));

    let base_name = format!("worker[{}]", shared.workers[idx].wid);
    let _ = thread::set_name(thread::current(), &base_name);
    tracing::debug!(worker = shared.workers[idx].wid, "worker started");

    loop {
        unsafe {
            libc::pthread_testcancel();
        }

        shared.seek.lock();
        let job = loop {
            if let Some(job) = job_seeking(&shared, idx) {
                break job;
            }
            shared.seek.wait();
        };
        shared.seek.unlock();

        if job.has_name() {
            let _ = thread::set_name(thread::current(), job.name_str());
        }

        shared.metrics.active_workers.fetch_add(1, Ordering::Relaxed);
        shared.num_active.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        (job.func)();
        let elapsed = start.elapsed();
        shared
            .metrics
            .total_job_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        shared.num_active.fetch_sub(1, Ordering::SeqCst);
        shared.metrics.active_workers.fetch_sub(1, Ordering::Relaxed);
        shared.metrics.jobs_completed.fetch_add(1, Ordering::Relaxed);

        if job.has_name() {
            let _ = thread::set_name(thread::current(), &base_name);
        }
    }
}

fn job_seeking(shared: &PoolShared, idx: usize) -> Option<Job> {
    if shared.num_local_jobs.load(Ordering::SeqCst) > 0 {
        let own = shared.workers[idx]
            .local
            .as_ref()
            .and_then(|q| q.dequeue().ok());
        let found = own.or_else(|| work_steal(shared, idx));
        if let Some(job) = found {
            shared.num_local_jobs.fetch_sub(1, Ordering::SeqCst);
            return Some(job);
        }
    }
    shared.global.dequeue().ok()
}

fn work_steal(shared: &PoolShared, idx: usize) -> Option<Job> {
    let my_wid = shared.workers[idx].wid;
    for slot in shared.workers.iter() {
        if slot.wid == -1 {
            break;
        }
        if slot.wid != my_wid {
            if let Some(job) = slot.local.as_ref().and_then(|q| q.dequeue().ok()) {
                shared.metrics.jobs_stolen.fetch_add(1, Ordering::Relaxed);
                return Some(job);
            }
        }
    }
    None
}
