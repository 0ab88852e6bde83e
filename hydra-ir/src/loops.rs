//! Natural-loop detection and trip-count bookkeeping.
//!
//! Scalar-evolution/trip-count analysis is an external collaborator's job;
//! Hydra only *reads* `Option<u32>` trip counts. This module exists so
//! there is somewhere for a caller (or a test) to put that number: it finds
//! natural loops via a dominator tree and back edges, and leaves every
//! loop's trip count unset until the caller supplies one.

use crate::entities::{BlockId, FuncId};
use crate::module::Module;
use std::collections::{HashMap, HashSet};

#[derive(Debug)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: HashSet<BlockId>,
    pub trip_count: Option<u32>,
}

#[derive(Debug, Default)]
pub struct LoopForest {
    loops: Vec<Loop>,
    block_to_loop: HashMap<BlockId, usize>,
}

impl LoopForest {
    pub fn compute(module: &Module, func: FuncId) -> Self {
        let f = module.func(func);
        let blocks = &f.blocks;
        let Some(entry) = f.entry else {
            return Self::default();
        };

        let preds = predecessors(module, blocks);
        let doms = dominators(blocks, entry, &preds);

        let mut loops = Vec::new();
        let mut block_to_loop = HashMap::new();

        for &b in blocks {
            for succ in module.successors(b) {
                // A back edge b -> succ exists when succ dominates b.
                if dominates(&doms, succ, b) {
                    let body = natural_loop_body(module, succ, b);
                    let idx = loops.len();
                    for &member in &body {
                        block_to_loop.insert(member, idx);
                    }
                    loops.push(Loop {
                        header: succ,
                        blocks: body,
                        trip_count: None,
                    });
                }
            }
        }

        Self { loops, block_to_loop }
    }

    pub fn loop_containing(&self, block: BlockId) -> Option<&Loop> {
        self.block_to_loop.get(&block).map(|&i| &self.loops[i])
    }

    pub fn set_trip_count(&mut self, header: BlockId, count: u32) {
        if let Some(l) = self.loops.iter_mut().find(|l| l.header == header) {
            l.trip_count = Some(count);
        }
    }

    /// Statically-known trip count of the innermost loop containing `block`,
    /// if any.
    pub fn trip_count_for_block(&self, block: BlockId) -> Option<u32> {
        self.loop_containing(block).and_then(|l| l.trip_count)
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }
}

fn predecessors(module: &Module, blocks: &[BlockId]) -> HashMap<BlockId, Vec<BlockId>> {
    let mut preds: HashMap<BlockId, Vec<BlockId>> = blocks.iter().map(|&b| (b, Vec::new())).collect();
    for &b in blocks {
        for succ in module.successors(b) {
            preds.entry(succ).or_default().push(b);
        }
    }
    preds
}

/// Classic iterative dominator computation (Cooper/Harvey/Kennedy style,
/// simplified to a fixed-point over reverse postorder) — O(n^2) worst case,
/// which is fine at the function sizes Hydra deals with.
fn dominators(
    blocks: &[BlockId],
    entry: BlockId,
    preds: &HashMap<BlockId, Vec<BlockId>>,
) -> HashMap<BlockId, HashSet<BlockId>> {
    let all: HashSet<BlockId> = blocks.iter().copied().collect();
    let mut dom: HashMap<BlockId, HashSet<BlockId>> = blocks
        .iter()
        .map(|&b| {
            if b == entry {
                (b, HashSet::from([b]))
            } else {
                (b, all.clone())
            }
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &b in blocks {
            if b == entry {
                continue;
            }
            let p = &preds[&b];
            let mut new_dom = if let Some(&first) = p.first() {
                dom[&first].clone()
            } else {
                HashSet::new()
            };
            for &pred in p.iter().skip(1) {
                new_dom = new_dom.intersection(&dom[&pred]).copied().collect();
            }
            new_dom.insert(b);
            if new_dom != dom[&b] {
                dom.insert(b, new_dom);
                changed = true;
            }
        }
    }
    dom
}

fn dominates(dom: &HashMap<BlockId, HashSet<BlockId>>, a: BlockId, b: BlockId) -> bool {
    dom.get(&b).is_some_and(|set| set.contains(&a))
}

/// Blocks reachable from `latch` walking predecessors backward, without
/// crossing `header`, plus `header` itself — the standard natural-loop body
/// for a header/latch back edge pair.
fn natural_loop_body(module: &Module, header: BlockId, latch: BlockId) -> HashSet<BlockId> {
    let mut body = HashSet::from([header, latch]);
    let mut worklist = vec![latch];
    // Need predecessor info local to this walk; recompute cheaply.
    let preds = predecessors(module, &all_reachable(module, header));
    while let Some(b) = worklist.pop() {
        for &p in preds.get(&b).into_iter().flatten() {
            if body.insert(p) {
                worklist.push(p);
            }
        }
    }
    body
}

fn all_reachable(module: &Module, start: BlockId) -> Vec<BlockId> {
    let mut seen = HashSet::from([start]);
    let mut stack = vec![start];
    let mut order = Vec::new();
    while let Some(b) = stack.pop() {
        order.push(b);
        for succ in module.successors(b) {
            if seen.insert(succ) {
                stack.push(succ);
            }
        }
    }
    order
}
