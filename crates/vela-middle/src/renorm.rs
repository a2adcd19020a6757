//! Renormalize hoisting
//!
//! `RenormArr(arr, i)` refreshes array metadata so elements up to `i` can be
//! accessed cheaply. Inside a counted loop whose index is the induction
//! variable and whose array is allocated outside the loop and never touched
//! by it, the refresh computes the same thing every iteration; one refresh
//! against the loop limit in a pre-header does the same job.

use rustc_hash::FxHashSet;
use vela_ir::{BasicBlock, BlockId, Cmd, Function, Value, VarId};

use crate::dataflow::{self, Direction, GenKill, SetAnalysis, SetOp};

/// Forward must-analysis of "this var names an array allocated outside the
/// loop that has not been touched since".
///
/// Array reads, writes, and renormalizes keep the array in the set; any
/// other use may alias or resize it and kills it.
struct OutsideArrays {
    body_first: BlockId,
    body_last: BlockId,
    all_vars: Vec<VarId>,
}

impl OutsideArrays {
    fn in_body(&self, block: BlockId) -> bool {
        self.body_first <= block && block <= self.body_last
    }
}

impl SetAnalysis for OutsideArrays {
    type Elem = VarId;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn op(&self) -> SetOp {
        SetOp::Intersection
    }

    fn universe(&self) -> FxHashSet<VarId> {
        self.all_vars.iter().copied().collect()
    }

    fn boundary(&self) -> FxHashSet<VarId> {
        FxHashSet::default()
    }

    fn transfer(&self, block: BlockId, _i: usize, cmd: &Cmd, gk: &mut GenKill<VarId>) {
        match cmd {
            Cmd::RenormArr { .. } | Cmd::GetArr { .. } | Cmd::SetArr { .. } => {}
            _ => {
                for src in cmd.sources() {
                    if let Value::LocalVar(v) = src {
                        gk.kill(*v);
                    }
                }
            }
        }
        for dst in cmd.destinations() {
            gk.kill(dst);
        }
        if !self.in_body(block) {
            if let Cmd::NewArr { dst, .. } = cmd {
                gk.gen(*dst);
            }
        }
    }
}

/// Hoist loop-invariant renormalizes in every counted loop of the function.
/// Returns the number of per-iteration renormalizes eliminated.
pub fn run(func: &mut Function) -> u32 {
    let mut count = 0;
    for li in 0..func.for_loops.len() {
        count += hoist_loop(func, li);
    }
    count
}

fn hoist_loop(func: &mut Function, loop_index: usize) -> u32 {
    let lp = func.for_loops[loop_index].clone();
    if !lp.step_is_positive {
        return 0;
    }

    let body_blocks =
        || (lp.body_first.as_u32()..=lp.body_last.as_u32()).map(BlockId::new);

    // A body write to the induction variable outside the loop's own stepping
    // makes the index unpredictable; give up on the whole loop.
    for id in body_blocks() {
        for cmd in &func.block(id).cmds {
            if matches!(cmd, Cmd::ForStep { .. }) {
                continue;
            }
            if cmd.destinations().contains(&lp.iter_var) {
                return 0;
            }
        }
    }

    let analysis = OutsideArrays {
        body_first: lp.body_first,
        body_last: lp.body_last,
        all_vars: func.var_ids().collect(),
    };
    let flows = dataflow::solve_sets(func, &analysis);

    let mut cannot_optimize: FxHashSet<VarId> = FxHashSet::default();
    for id in body_blocks() {
        for (i, cmd) in func.block(id).cmds.iter().enumerate() {
            let Cmd::RenormArr { src_arr, src_i, .. } = cmd else {
                continue;
            };
            let Some(arr) = src_arr.as_local() else {
                continue;
            };
            let index_is_iter = *src_i == Value::LocalVar(lp.iter_var);
            let tracked = flows[id.index()].before[i].contains(&arr);
            if !index_is_iter || !tracked {
                cannot_optimize.insert(arr);
            }
        }
    }

    let mut arrays_to_optimize: Vec<VarId> = Vec::new();
    let mut count = 0;
    for id in body_blocks() {
        for cmd in &mut func.block_mut(id).cmds {
            let Cmd::RenormArr { src_arr, .. } = cmd else {
                continue;
            };
            let Some(arr) = src_arr.as_local() else {
                continue;
            };
            if cannot_optimize.contains(&arr) {
                continue;
            }
            if !arrays_to_optimize.contains(&arr) {
                arrays_to_optimize.push(arr);
            }
            *cmd = Cmd::Nop;
            count += 1;
        }
    }

    if arrays_to_optimize.is_empty() {
        return 0;
    }

    // The pre-header goes right after the prep block; existing ids from
    // there on (the body included) shift one up.
    let header_id = BlockId::new(lp.prep_block.as_u32() + 1);
    let mut header = BasicBlock::new();
    for arr in &arrays_to_optimize {
        header.push(Cmd::RenormArr {
            loc: lp.loc,
            src_arr: Value::LocalVar(*arr),
            src_i: lp.limit.clone(),
        });
    }
    header.push(Cmd::Jmp {
        target: BlockId::new(lp.body_first.as_u32() + 1),
    });
    func.insert_block(header_id, header);

    match func.block_mut(lp.prep_block).cmds.last_mut() {
        Some(Cmd::JmpIf { target_true, .. }) => *target_true = header_id,
        _ => unreachable!("counted loop prep block must end in a conditional jump"),
    }

    count
}
