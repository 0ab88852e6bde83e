//! Fixed-size worker pool: `spawn(task, fn, args…)` / `join(task)`.
//!
//! Per-worker mailbox + mutex + atomic has-job flag, one pool-wide
//! availability mutex, no blocking waits (workers and `join` both
//! yield-spin). A single lock-free queue would be simpler but would lose
//! the fixed-capacity fallback-to-inline semantics the Rewriter assumes, so
//! the per-worker mailbox model stays.

use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::error::{RuntimeError, RuntimeResult};

/// An opaque pointer argument, exactly as the adapter ABI produces.
pub type RawArg = *mut c_void;

const MAX_ARGS: usize = 8;

/// A runnable unit of work: a raw function pointer plus its argument count
/// and packed opaque-pointer arguments, the same shape `Opcode::Spawn`
/// carries in the rewritten IR.
struct Job {
    func: *const (),
    argc: u8,
    args: [RawArg; MAX_ARGS],
}

// Safety: the embedder (Rewriter's generated code) guarantees `func` and
// every argument pointer remain valid and non-aliased for the lifetime of
// the job, which is bounded by the matching `join` call. The pool itself
// never inspects or retains them past dispatch.
unsafe impl Send for Job {}

impl Job {
    /// Dispatch by argument count, exactly mirroring the runtime's `switch`
    /// over 0-8 opaque-pointer signatures.
    ///
    /// # Safety
    /// `func` must actually have the `unsafe extern "C" fn(...)` signature
    /// matching `argc`, and every slot in `args[..argc]` must be a valid
    /// pointer for that signature's corresponding parameter.
    unsafe fn dispatch(&self) {
        macro_rules! call {
            ($fn_ty:ty $(, $idx:tt)*) => {{
                let f: $fn_ty = std::mem::transmute(self.func);
                f($(self.args[$idx]),*)
            }};
        }
        match self.argc {
            0 => call!(unsafe extern "C" fn()),
            1 => call!(unsafe extern "C" fn(RawArg), 0),
            2 => call!(unsafe extern "C" fn(RawArg, RawArg), 0, 1),
            3 => call!(unsafe extern "C" fn(RawArg, RawArg, RawArg), 0, 1, 2),
            4 => call!(unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg), 0, 1, 2, 3),
            5 => call!(unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg), 0, 1, 2, 3, 4),
            6 => call!(unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg, RawArg), 0, 1, 2, 3, 4, 5),
            7 => call!(
                unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg, RawArg, RawArg),
                0,
                1,
                2,
                3,
                4,
                5,
                6
            ),
            8 => call!(
                unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg, RawArg, RawArg, RawArg),
                0,
                1,
                2,
                3,
                4,
                5,
                6,
                7
            ),
            n => unreachable!("argc {n} validated at spawn time to be 0-8"),
        }
    }
}

struct Mailbox {
    job: Option<Job>,
    stop: bool,
}

struct Worker {
    mailbox: Mutex<Mailbox>,
    has_job: AtomicBool,
}

/// Returned by `assign_job` when every worker is busy; the caller's
/// `spawn_n` falls back to running the job inline.
const SATURATED: Option<usize> = None;

/// State shared with every worker thread. Kept separate from `ThreadPool`
/// itself so worker threads hold only this `Arc`, never one to the pool —
/// if they held `Arc<ThreadPool>` the pool's `Drop` (which tells them to
/// stop) would never run, since it only fires once every clone is gone.
struct PoolInner {
    workers: Vec<Worker>,
    availability: Mutex<Vec<bool>>,
}

pub struct ThreadPool {
    inner: std::sync::Arc<PoolInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool").field("num_threads", &self.inner.workers.len()).finish()
    }
}

/// Default worker count for [`global`]. An embedder that wants a different
/// size constructs its own `ThreadPool` directly instead.
pub const NUM_THREADS: usize = 4;

static DEFAULT_POOL: once_cell::sync::Lazy<ThreadPool> =
    once_cell::sync::Lazy::new(|| ThreadPool::new(NUM_THREADS).expect("NUM_THREADS is nonzero"));

/// The process-wide pool Rewriter-generated spawn/join pairs target by
/// default, initialized on first use.
pub fn global() -> &'static ThreadPool {
    &DEFAULT_POOL
}

thread_local! {
    /// Per-OS-thread bookkeeping: every `(task, worker_id)` this thread has
    /// outstanding. `join(task)` drains the matching entries.
    static OUTSTANDING: RefCell<Vec<(u32, usize)>> = RefCell::new(Vec::new());
}

impl ThreadPool {
    pub fn new(num_threads: usize) -> RuntimeResult<Self> {
        if num_threads == 0 {
            return Err(RuntimeError::InvalidPoolSize(num_threads));
        }

        let workers = (0..num_threads)
            .map(|_| Worker {
                mailbox: Mutex::new(Mailbox { job: None, stop: false }),
                has_job: AtomicBool::new(false),
            })
            .collect::<Vec<_>>();

        let inner = std::sync::Arc::new(PoolInner {
            workers,
            availability: Mutex::new(vec![true; num_threads]),
        });

        let mut handles = Vec::with_capacity(num_threads);
        for idx in 0..num_threads {
            let inner = std::sync::Arc::clone(&inner);
            handles.push(std::thread::spawn(move || worker_loop(inner, idx)));
        }

        Ok(Self {
            inner,
            handles: Mutex::new(handles),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.inner.workers.len()
    }

    fn assign_job(&self, job: Job) -> Option<usize> {
        let mut availability = self.inner.availability.lock().unwrap();
        let idx = availability.iter().position(|&idle| idle)?;
        let mut mailbox: MutexGuard<'_, Mailbox> = self.inner.workers[idx].mailbox.lock().unwrap();
        mailbox.job = Some(job);
        self.inner.workers[idx].has_job.store(true, Ordering::Release);
        availability[idx] = false;
        Some(idx)
    }

    /// Spin until worker `idx` clears its has-job flag, then mark it idle.
    fn join_worker(&self, idx: usize) {
        while self.inner.workers[idx].has_job.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
        self.inner.availability.lock().unwrap()[idx] = true;
    }

    fn spawn_raw(&self, task: u32, func: *const (), argc: u8, args: [RawArg; MAX_ARGS]) {
        let job = Job { func, argc, args };
        match self.assign_job(job) {
            Some(idx) => {
                OUTSTANDING.with(|o| o.borrow_mut().push((task, idx)));
            }
            SATURATED => {
                log::debug!("pool saturated, running task {task} inline");
                // Safety: same contract as `Job::dispatch` — the caller of
                // `spawn_n` already upholds it for this exact (func, argc).
                unsafe { Job { func, argc, args }.dispatch() };
            }
        }
    }

    /// Await every outstanding spawn made on the current thread under
    /// `task`. Jobs that fell back to inline execution left no entry, so
    /// this correctly does nothing for them.
    pub fn join(&self, task: u32) {
        let matching: Vec<usize> = OUTSTANDING.with(|o| {
            let mut list = o.borrow_mut();
            let mut idxs = Vec::new();
            list.retain(|&(t, idx)| {
                if t == task {
                    idxs.push(idx);
                    false
                } else {
                    true
                }
            });
            idxs
        });
        for idx in matching {
            self.join_worker(idx);
        }
    }

    pub fn spawn0(&self, task: u32, f: unsafe extern "C" fn()) {
        self.spawn_raw(task, f as *const (), 0, [std::ptr::null_mut(); MAX_ARGS]);
    }

    pub fn spawn1(&self, task: u32, f: unsafe extern "C" fn(RawArg), a0: RawArg) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        self.spawn_raw(task, f as *const (), 1, args);
    }

    pub fn spawn2(&self, task: u32, f: unsafe extern "C" fn(RawArg, RawArg), a0: RawArg, a1: RawArg) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        args[1] = a1;
        self.spawn_raw(task, f as *const (), 2, args);
    }

    pub fn spawn3(&self, task: u32, f: unsafe extern "C" fn(RawArg, RawArg, RawArg), a0: RawArg, a1: RawArg, a2: RawArg) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        args[1] = a1;
        args[2] = a2;
        self.spawn_raw(task, f as *const (), 3, args);
    }

    pub fn spawn4(
        &self,
        task: u32,
        f: unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg),
        a0: RawArg,
        a1: RawArg,
        a2: RawArg,
        a3: RawArg,
    ) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        args[1] = a1;
        args[2] = a2;
        args[3] = a3;
        self.spawn_raw(task, f as *const (), 4, args);
    }

    pub fn spawn5(
        &self,
        task: u32,
        f: unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg),
        a0: RawArg,
        a1: RawArg,
        a2: RawArg,
        a3: RawArg,
        a4: RawArg,
    ) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        args[1] = a1;
        args[2] = a2;
        args[3] = a3;
        args[4] = a4;
        self.spawn_raw(task, f as *const (), 5, args);
    }

    pub fn spawn6(
        &self,
        task: u32,
        f: unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg, RawArg),
        a0: RawArg,
        a1: RawArg,
        a2: RawArg,
        a3: RawArg,
        a4: RawArg,
        a5: RawArg,
    ) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        args[1] = a1;
        args[2] = a2;
        args[3] = a3;
        args[4] = a4;
        args[5] = a5;
        self.spawn_raw(task, f as *const (), 6, args);
    }

    pub fn spawn7(
        &self,
        task: u32,
        f: unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg, RawArg, RawArg),
        a0: RawArg,
        a1: RawArg,
        a2: RawArg,
        a3: RawArg,
        a4: RawArg,
        a5: RawArg,
        a6: RawArg,
    ) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        args[1] = a1;
        args[2] = a2;
        args[3] = a3;
        args[4] = a4;
        args[5] = a5;
        args[6] = a6;
        self.spawn_raw(task, f as *const (), 7, args);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn spawn8(
        &self,
        task: u32,
        f: unsafe extern "C" fn(RawArg, RawArg, RawArg, RawArg, RawArg, RawArg, RawArg, RawArg),
        a0: RawArg,
        a1: RawArg,
        a2: RawArg,
        a3: RawArg,
        a4: RawArg,
        a5: RawArg,
        a6: RawArg,
        a7: RawArg,
    ) {
        let mut args = [std::ptr::null_mut(); MAX_ARGS];
        args[0] = a0;
        args[1] = a1;
        args[2] = a2;
        args[3] = a3;
        args[4] = a4;
        args[5] = a5;
        args[6] = a6;
        args[7] = a7;
        self.spawn_raw(task, f as *const (), 8, args);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        for worker in &self.inner.workers {
            worker.mailbox.lock().unwrap().stop = true;
        }
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: std::sync::Arc<PoolInner>, idx: usize) {
    let worker = &inner.workers[idx];
    loop {
        let mut mailbox = worker.mailbox.lock().unwrap();
        if mailbox.stop {
            return;
        }
        if worker.has_job.load(Ordering::Acquire) {
            let job = mailbox.job.take();
            drop(mailbox);
            if let Some(job) = job {
                // Safety: `assign_job` only ever stores jobs built by
                // `spawn_n`, which upholds `Job::dispatch`'s contract.
                unsafe { job.dispatch() };
            }
            worker.has_job.store(false, Ordering::Release);
        } else {
            drop(mailbox);
            std::thread::yield_now();
        }
    }
}
