//! Error taxonomy for Hydra.
//!
//! Most "failures" here aren't: a missing analysis result is a conservative
//! default, not an error, and a
//! precondition violation is a bug in an earlier pass that we'd rather catch
//! with a `debug_assert!` during development. `HydraError` exists for the
//! handful of call sites — mainly the pipeline driver and any embedder that
//! wants a `Result` instead of a panic — that need to report a precondition
//! violation without aborting the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HydraError {
    /// A call site reached the Rewriter without the adapter MakeSpawnable
    /// should already have synthesized for it.
    #[error("no adapter synthesized for accepted callee {0}")]
    MissingAdapter(hydra_ir::FuncId),

    /// `JoinPoints` returned (or was asked to act on) an empty join set.
    #[error("call site {0} has an empty join set")]
    EmptyJoinSet(hydra_ir::InstId),

    /// A pass was asked to act on a call site whose callee was not already
    /// proven Functional.
    #[error("callee {0} of call site {1} is not Functional")]
    CalleeNotFunctional(hydra_ir::FuncId, hydra_ir::InstId),

    /// Generic precondition violation, for bugs that don't fit the above.
    #[error("precondition violation: {0}")]
    Precondition(String),
}

pub type HydraResult<T> = Result<T, HydraError>;
