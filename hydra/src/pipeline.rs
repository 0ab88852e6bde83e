//! Driver: sequence the five passes over a module and report what happened
//! to every call site. Each stage runs to completion, hands its result to
//! the next, and releases it once no later stage needs it.

use std::collections::HashMap;

use hydra_ir::{CallGraph, FuncId, InstId, LoopForest, Module};

use crate::config::{HydraConfig, ThreadModel};
use crate::decider::{self, DeciderResult};
use crate::error::{HydraError, HydraResult};
use crate::fitness::{self, FitnessResult};
use crate::joinpoints::{self, CallSiteRecord};
use crate::profitability;
use crate::rewriter::{self, RewriteState, TaskIdSource};
use crate::spawnable;

/// Final disposition of every call site JoinPoints considered, keyed by its
/// [`RewriteState`] — everything a caller might want to print or assert on
/// without re-deriving it from the four intermediate results.
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub states: HashMap<InstId, RewriteState>,
}

impl PipelineReport {
    pub fn state_of(&self, call: InstId) -> RewriteState {
        self.states.get(&call).copied().unwrap_or(RewriteState::Candidate)
    }

    pub fn accepted_count(&self) -> usize {
        self.states.values().filter(|s| matches!(s, RewriteState::Rewritten)).count()
    }
}

/// Run Fitness, Profitability, JoinPoints, Decider, MakeSpawnable, and
/// Rewriter over `module` in order, mutating it in place with every
/// accepted call site turned into a spawn/join pair.
///
/// `task_id_seed` seeds the Rewriter's task-id generator; pass a fixed value
/// for reproducible output in tests, anything embedder-supplied otherwise.
///
/// Returns `Err` if an earlier pass's invariant didn't hold going into a
/// later one (an empty join set, a callee JoinPoints recorded that Fitness
/// never cleared, an accepted callee MakeSpawnable didn't adapt) — these
/// never trigger given the passes above, but an embedder calling the passes
/// out of order gets a reported error instead of a panic partway through a
/// mutation.
pub fn run(module: &mut Module, config: &HydraConfig, task_id_seed: u64) -> HydraResult<PipelineReport> {
    log::info!("hydra: analyzing module {:?}", module.name);
    let call_graph = CallGraph::build(module);

    log::debug!("pass A: fitness");
    let fitness = fitness::compute_fitness(module, &call_graph);

    log::debug!("pass B: profitability");
    let loops = compute_loop_forests(module);
    let mut profitability = profitability::compute_profitability(module, &fitness, &call_graph, &loops);

    log::debug!("pass C: join points");
    let records = joinpoints::compute_join_points(module, &fitness, &call_graph, config.thread_model);
    check_records(module, &fitness, &records)?;

    log::debug!("pass D: decider");
    let decision = decider::decide(module, &records, &mut profitability, config);

    let report = build_report(module, &records, &decision);

    log::debug!("pass E: make spawnable");
    let accepted: Vec<FuncId> = decision
        .accepted_calls()
        .filter_map(|call| match &module.inst(call).opcode {
            hydra_ir::Opcode::Call { callee, .. } => Some(*callee),
            _ => None,
        })
        .collect();
    let spawnable = spawnable::make_spawnable(module, accepted);
    check_adapters(module, &decision, &spawnable)?;

    log::debug!("pass F: rewriter");
    let mut task_ids = TaskIdSource::new(task_id_seed);
    rewriter::rewrite(module, &records, &decision, &spawnable, config.thread_model, &mut task_ids);

    // Release step: the per-pass maps above go out of scope here, matching
    // the explicit release the concurrency model calls for between stages —
    // nothing downstream of `run` holds onto them.
    let mut report = report;
    for call in decision.accepted_calls() {
        report.states.insert(call, RewriteState::Rewritten);
    }

    log::info!("hydra: {} call site(s) rewritten into spawn/join pairs", report.accepted_count());
    Ok(report)
}

fn check_records(module: &Module, fitness: &FitnessResult, records: &[CallSiteRecord]) -> HydraResult<()> {
    for record in records {
        if record.joins.is_empty() {
            return Err(HydraError::EmptyJoinSet(record.call));
        }
        let hydra_ir::Opcode::Call { callee, .. } = &module.inst(record.call).opcode else {
            return Err(HydraError::Precondition(format!("{:?} is not a call instruction", record.call)));
        };
        if !fitness.is_functional(*callee) {
            return Err(HydraError::CalleeNotFunctional(*callee, record.call));
        }
    }
    Ok(())
}

fn check_adapters(module: &Module, decision: &DeciderResult, spawnable: &spawnable::SpawnableResult) -> HydraResult<()> {
    for call in decision.accepted_calls() {
        let hydra_ir::Opcode::Call { callee, .. } = &module.inst(call).opcode else {
            continue;
        };
        if !spawnable.contains(*callee) {
            return Err(HydraError::MissingAdapter(*callee));
        }
    }
    Ok(())
}

fn compute_loop_forests(module: &Module) -> HashMap<FuncId, LoopForest> {
    module.function_ids().filter(|&f| module.func(f).has_body).map(|f| (f, LoopForest::compute(module, f))).collect()
}

/// Reconstruct each call site's rewrite-state lineage from the three passes'
/// outputs: a call JoinPoints never saw was rejected at Fitness
/// (`RejectedUnknown`); every call JoinPoints did see reached
/// `JoinsComputed`, then either `RejectedUnprofitable` or `DecidedAccept`
/// depending on Decider's verdict.
fn build_report(module: &Module, records: &[CallSiteRecord], decision: &DeciderResult) -> PipelineReport {
    let mut states = HashMap::new();

    for func in module.function_ids() {
        for &block in &module.func(func).blocks {
            for &inst_id in module.block_insts(block) {
                if matches!(module.inst(inst_id).opcode, hydra_ir::Opcode::Call { .. }) {
                    states.insert(inst_id, RewriteState::RejectedUnknown);
                }
            }
        }
    }

    for record in records {
        states.insert(record.call, RewriteState::JoinsComputed);
    }

    for record in records {
        let Some(d) = decision.decision(record.call) else { continue };
        states.insert(record.call, if d.accepted { RewriteState::DecidedAccept } else { RewriteState::RejectedUnprofitable });
    }

    PipelineReport { states }
}
