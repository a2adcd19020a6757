//! Initialization analysis
//!
//! Detects reads of locals that may happen before any write, and functions
//! with return values that control can fall out of. These are the only
//! middle-end findings reported to the user; a module with any of them is
//! rejected before the transform passes run.

use rustc_hash::FxHashSet;
use vela_ir::{BlockId, Cmd, Function, Module, Value, VarId};

use crate::dataflow::{self, Direction, GenKill, SetAnalysis, SetOp};
use crate::error::AnalysisError;

/// Forward may-analysis of "not yet written on some path".
///
/// Writes remove the destination from the set. The one wrinkle is captured
/// mutable variables: allocating the upvalue box (`NewRecord` of a box type)
/// does not initialize the variable that holds it; the first `SetField` into
/// the box is the real initializer.
struct MaybeUninit<'a> {
    func: &'a Function,
}

impl SetAnalysis for MaybeUninit<'_> {
    type Elem = VarId;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn op(&self) -> SetOp {
        SetOp::Union
    }

    fn boundary(&self) -> FxHashSet<VarId> {
        self.func
            .var_ids()
            .filter(|id| !self.func.is_param(*id))
            .collect()
    }

    fn transfer(&self, _block: BlockId, _i: usize, cmd: &Cmd, gk: &mut GenKill<VarId>) {
        match cmd {
            Cmd::NewRecord { rec_typ, .. } if rec_typ.is_upvalue_box => {
                // Allocating the box leaves the boxed value uninitialized.
            }
            Cmd::SetField {
                src_rec, rec_typ, ..
            } if rec_typ.is_upvalue_box => {
                if let Some(v) = src_rec.as_local() {
                    gk.kill(v);
                }
            }
            _ => {
                for dst in cmd.destinations() {
                    gk.kill(dst);
                }
            }
        }
    }
}

/// The sources of a command that count as reads for this analysis.
///
/// A `SetField` into an upvalue box writes `src_rec`, so only the stored
/// value is a read there.
fn read_values(cmd: &Cmd) -> Vec<&Value> {
    match cmd {
        Cmd::SetField {
            src_v, rec_typ, ..
        } if rec_typ.is_upvalue_box => vec![src_v],
        _ => cmd.sources(),
    }
}

/// Check a single function, appending any findings to `errors`
pub fn check(func: &Function, errors: &mut Vec<AnalysisError>) {
    let analysis = MaybeUninit { func };
    let flows = dataflow::solve_sets(func, &analysis);

    let mut reported: FxHashSet<VarId> = FxHashSet::default();
    for id in func.block_ids() {
        let flow = &flows[id.index()];
        for (i, cmd) in func.block(id).cmds.iter().enumerate() {
            for value in read_values(cmd) {
                let Some(v) = value.as_local() else { continue };
                if flow.before[i].contains(&v) && reported.insert(v) {
                    errors.push(AnalysisError::UseBeforeInit {
                        name: func.var(v).name.clone(),
                        loc: cmd.loc(),
                    });
                }
            }
        }
    }

    if !func.typ.ret_types.is_empty() {
        if let Some(ret0) = func.ret_vars.first() {
            let exit = &flows[func.exit_block_id().index()];
            if exit.after_last.contains(ret0) {
                errors.push(AnalysisError::MissingReturn { loc: func.loc });
            }
        }
    }
}

/// Check every function of a module. A non-empty result rejects the module.
pub fn check_module(module: &Module) -> Vec<AnalysisError> {
    let mut errors = Vec::new();
    for func in &module.functions {
        check(func, &mut errors);
    }
    errors
}
