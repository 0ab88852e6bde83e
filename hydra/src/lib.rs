//! Whole-module automatic parallelization pass for a low-level SSA IR.
//!
//! Five compile-time passes run in sequence over a [`hydra_ir::Module`]:
//! Fitness proves which functions are safe to run off the calling thread,
//! Profitability prices every function's body, JoinPoints finds where a
//! spawned call's result is first needed, Decider weighs spawn overhead
//! against the cost saved, and MakeSpawnable + Rewriter turn every accepted
//! call into a spawn/join pair against a runtime thread pool. [`pipeline::run`]
//! drives all five in order; the individual pass modules are public for
//! callers that want to inspect or re-run a single stage.

pub mod config;
pub mod decider;
pub mod error;
pub mod fitness;
pub mod joinpoints;
pub mod pipeline;
pub mod profitability;
pub mod rewriter;
pub mod spawnable;

pub use config::{Aggregator, HydraConfig, ThreadModel};
pub use decider::{decide, Decision, DeciderResult};
pub use error::{HydraError, HydraResult};
pub use fitness::{compute_fitness, FitnessResult, FunType};
pub use joinpoints::{compute_join_points, CallSiteRecord, JoinSet};
pub use pipeline::{run, PipelineReport};
pub use profitability::{compute_profitability, FunStats, ProfitabilityResult};
pub use rewriter::{rewrite, RewriteState, TaskIdSource};
pub use spawnable::{make_spawnable, Adapter, ParamBridge, SpawnableResult};
