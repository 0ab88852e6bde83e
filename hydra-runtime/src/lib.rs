//! The runtime backing Rewriter-generated spawn/join pairs.
//!
//! `hydra` never links against this crate directly — it emits IR that
//! *calls into* a runtime shaped like this one. The crate exists so the
//! adapter ABI and pool semantics the Rewriter assumes are pinned down
//! somewhere concrete, and so tests can actually execute a rewritten
//! program's spawn/join pairs end to end.
//!
//! Two threading models, one per Cargo feature, mirror `hydra::ThreadModel`:
//! `light-threads` (default) is the fixed-size worker pool in [`pool`];
//! `kernel-threads` spawns one OS thread per accepted call and joins it
//! explicitly.

#![cfg_attr(not(any(feature = "light-threads", feature = "kernel-threads")), allow(dead_code))]

mod error;
#[cfg(feature = "kernel-threads")]
mod kernel;
#[cfg(feature = "light-threads")]
mod pool;

pub use error::{RuntimeError, RuntimeResult};
#[cfg(feature = "kernel-threads")]
pub use kernel::KernelThreads;
#[cfg(feature = "light-threads")]
pub use pool::{global, RawArg, ThreadPool, NUM_THREADS};
