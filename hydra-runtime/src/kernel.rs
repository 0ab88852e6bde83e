//! Kernel-thread backend: one OS thread per accepted call, explicit
//! `join` + `dtor` rather than a pool. Grounded on the same `Job`/dispatch
//! shape [`pool`](crate::pool) uses for the light-thread model — the two
//! backends share an ABI, not an implementation, since a kernel thread has
//! no mailbox to saturate.
//!
//! The signature this mirrors is `ctor(thread*, fn*, arg**, …)`: the first
//! argument is an out-pointer the caller owns storage for (the Rewriter's
//! kernel-mode `Alloca` slot), every following argument is itself an
//! opaque-pointer *address* rather than the pointer directly, matching the
//! extra indirection kernel mode's ABI table specifies over light mode's.

use std::ffi::c_void;
use std::thread::JoinHandle;

use crate::error::{RuntimeError, RuntimeResult};

pub type RawArg = *mut c_void;

const MAX_ARGS: usize = 8;

struct Job {
    func: *const (),
    argc: u8,
    args: [RawArg; MAX_ARGS],
}

unsafe impl Send for Job {}

impl Job {
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

/// A live kernel thread handle. The Rewriter's kernel-mode `Alloca` slot
/// stores a `KernelThreads`-assigned index into a table the embedder owns;
/// here the handle is simply the `JoinHandle` itself, kept alive until
/// `join` or `dtor` consumes it.
#[derive(Debug, Default)]
pub struct KernelThreads;

impl KernelThreads {
    pub fn new() -> Self {
        Self
    }

    /// `ctor`: spawn an OS thread running `func` with `argc` opaque-pointer
    /// arguments dereferenced one level from `args` (each entry in `args`
    /// is itself the address of the opaque pointer, per the kernel-mode
    /// ABI's extra indirection).
    ///
    /// # Safety
    /// `func` must have the `unsafe extern "C" fn(...)` signature matching
    /// `argc`, and every `args[..argc]` must point to a live opaque pointer
    /// for the duration of the spawned thread.
    pub unsafe fn ctor(&self, func: *const (), argc: u8, args: &[*mut RawArg]) -> RuntimeResult<JoinHandle<()>> {
        if argc as usize > MAX_ARGS {
            return Err(RuntimeError::TooManyArguments(argc as usize));
        }
        let mut flat = [std::ptr::null_mut(); MAX_ARGS];
        for i in 0..argc as usize {
            flat[i] = *args[i];
        }
        let job = Job { func, argc, args: flat };
        Ok(std::thread::spawn(move || {
            // Safety: upheld by this function's caller.
            unsafe { job.dispatch() };
        }))
    }

    /// Explicit `join`: block until the thread completes. Kernel-thread
    /// mode never spins, unlike the light-thread pool — there is no
    /// fixed-capacity saturation path to avoid blocking for.
    pub fn join(&self, handle: JoinHandle<()>) {
        let _ = handle.join();
    }

    /// `dtor`: kernel-thread builds collapse every join to the spawn
    /// block's terminator, so `join` and `dtor` happen back to back with
    /// nothing outstanding in between. Kept as a distinct call to mirror
    /// the ABI table's separate `join` + `dtor` step, even though this
    /// backend has no separate resource to release once `join` returns.
    pub fn dtor(&self, _handle: ()) {}
}
