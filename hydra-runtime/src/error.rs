//! Runtime error types.
//!
//! The pool itself has almost no fallible surface — saturation falls back to
//! inline execution rather than erroring. `RuntimeError` exists for the
//! handful of embedder-facing construction checks (pool size, arity) that
//! are better reported than panicked on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("pool size must be at least 1 worker, got {0}")]
    InvalidPoolSize(usize),

    #[error("spawn called with {0} arguments, runtime supports 0-8")]
    TooManyArguments(usize),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
