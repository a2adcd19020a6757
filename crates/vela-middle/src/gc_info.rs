//! GC rooting information
//!
//! The host runtime's collector scans its own value stack, not Vela's C
//! locals. The emitter therefore needs to know, for every point where the
//! collector may run (a call or an explicit check), which GC-managed locals
//! are live there, which stack slot each one mirrors to, and which writes
//! must be mirrored because they reach such a point.

use rustc_hash::{FxHashMap, FxHashSet};
use vela_ir::{BlockId, Cmd, Function, Span, Value, VarId};

use crate::dataflow::{self, Direction, GenKill, SetAnalysis, SetOp};

/// Per-function GC tables handed to the C emitter
#[derive(Debug, Clone, Default)]
pub struct GcInfo {
    /// GC-typed locals live at each command, indexed `[block][cmd]`.
    /// Populated (sorted) only for GC-safe commands; empty elsewhere.
    pub live_gc_vars: Vec<Vec<Vec<VarId>>>,
    /// One past the largest mirror slot in use (0 when no local needs one)
    pub max_frame_size: u32,
    /// Mirror slot assigned to each GC-typed local that needs one
    pub slot_of_var: FxHashMap<VarId, u32>,
    /// Writes whose value reaches a GC-safe command, indexed `[block][cmd]`:
    /// the vars written there that must also be written to the host stack
    pub vars_to_mirror: Vec<Vec<FxHashSet<VarId>>>,
}

/// Backward liveness restricted to GC-typed locals
struct GcLiveness<'a> {
    func: &'a Function,
    gc: Vec<bool>,
}

impl<'a> GcLiveness<'a> {
    fn new(func: &'a Function) -> Self {
        let gc = func.vars.iter().map(|v| v.typ.is_gc()).collect();
        Self { func, gc }
    }
}

impl SetAnalysis for GcLiveness<'_> {
    type Elem = VarId;

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn op(&self) -> SetOp {
        SetOp::Union
    }

    fn boundary(&self) -> FxHashSet<VarId> {
        self.func
            .ret_vars
            .iter()
            .copied()
            .filter(|v| self.gc[v.index()])
            .collect()
    }

    fn transfer(&self, _block: BlockId, _i: usize, cmd: &Cmd, gk: &mut GenKill<VarId>) {
        for dst in cmd.destinations() {
            if self.gc[dst.index()] {
                gk.kill(dst);
            }
        }
        for src in cmd.sources() {
            if let Value::LocalVar(v) = src {
                if self.gc[v.index()] {
                    gk.gen(*v);
                }
            }
        }
    }
}

/// A write to a GC-typed local
#[derive(Debug, Clone, Copy)]
struct Definition {
    block: BlockId,
    cmd: usize,
    var: VarId,
}

/// Index into the function's definition list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DefId(u32);

/// Forward reaching-definitions over GC-typed writes
struct ReachingDefs<'a> {
    gc: &'a [bool],
    defs_of_var: FxHashMap<VarId, Vec<DefId>>,
    defs_at: FxHashMap<(BlockId, usize), Vec<DefId>>,
}

impl SetAnalysis for ReachingDefs<'_> {
    type Elem = DefId;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn op(&self) -> SetOp {
        SetOp::Union
    }

    fn boundary(&self) -> FxHashSet<DefId> {
        FxHashSet::default()
    }

    fn transfer(&self, block: BlockId, i: usize, cmd: &Cmd, gk: &mut GenKill<DefId>) {
        for dst in cmd.destinations() {
            if !self.gc[dst.index()] {
                continue;
            }
            if let Some(defs) = self.defs_of_var.get(&dst) {
                for d in defs {
                    gk.kill(*d);
                }
            }
        }
        if let Some(defs) = self.defs_at.get(&(block, i)) {
            for d in defs {
                gk.gen(*d);
            }
        }
    }
}

/// Compute the GC tables for one function.
///
/// Run [`move_gc_checks`] first; fewer check sites mean fewer recorded live
/// sets and less interference.
pub fn compute(func: &Function) -> GcInfo {
    let liveness = GcLiveness::new(func);
    let live_flows = dataflow::solve_sets(func, &liveness);

    // (a) live GC vars at each safe point. The pre-command set: everything
    // the command reads plus everything needed on some path below it, which
    // is what must survive a collection during the command.
    let mut live_gc_vars: Vec<Vec<Vec<VarId>>> = Vec::with_capacity(func.blocks.len());
    for id in func.block_ids() {
        let flow = &live_flows[id.index()];
        let mut per_cmd = Vec::with_capacity(func.block(id).cmds.len());
        for (i, cmd) in func.block(id).cmds.iter().enumerate() {
            if cmd.is_gc_safe_point() {
                let mut live: Vec<VarId> = flow.before[i].iter().copied().collect();
                live.sort();
                per_cmd.push(live);
            } else {
                per_cmd.push(Vec::new());
            }
        }
        live_gc_vars.push(per_cmd);
    }

    // (b) interference and slot assignment
    let mut interference: FxHashMap<VarId, FxHashSet<VarId>> = FxHashMap::default();
    for per_cmd in &live_gc_vars {
        for live in per_cmd {
            for v1 in live {
                let row = interference.entry(*v1).or_default();
                row.extend(live.iter().copied());
            }
        }
    }

    let mut slot_of_var: FxHashMap<VarId, u32> = FxHashMap::default();
    let mut max_frame_size = 0;
    for v in func.var_ids() {
        let Some(row) = interference.get(&v) else {
            continue;
        };
        let taken: FxHashSet<u32> = row
            .iter()
            .filter_map(|other| slot_of_var.get(other))
            .copied()
            .collect();
        let mut slot = 0;
        while taken.contains(&slot) {
            slot += 1;
        }
        slot_of_var.insert(v, slot);
        max_frame_size = max_frame_size.max(slot + 1);
    }

    // (c) reaching definitions of GC writes
    let gc: Vec<bool> = func.vars.iter().map(|v| v.typ.is_gc()).collect();
    let mut defs: Vec<Definition> = Vec::new();
    let mut defs_of_var: FxHashMap<VarId, Vec<DefId>> = FxHashMap::default();
    let mut defs_at: FxHashMap<(BlockId, usize), Vec<DefId>> = FxHashMap::default();
    for id in func.block_ids() {
        for (i, cmd) in func.block(id).cmds.iter().enumerate() {
            for dst in cmd.destinations() {
                if !gc[dst.index()] {
                    continue;
                }
                let def_id = DefId(defs.len() as u32);
                defs.push(Definition {
                    block: id,
                    cmd: i,
                    var: dst,
                });
                defs_of_var.entry(dst).or_default().push(def_id);
                defs_at.entry((id, i)).or_default().push(def_id);
            }
        }
    }

    let reaching = ReachingDefs {
        gc: &gc,
        defs_of_var,
        defs_at,
    };
    let def_flows = dataflow::solve_sets(func, &reaching);

    let mut vars_to_mirror: Vec<Vec<FxHashSet<VarId>>> = func
        .blocks
        .iter()
        .map(|b| vec![FxHashSet::default(); b.cmds.len()])
        .collect();
    for id in func.block_ids() {
        let flow = &def_flows[id.index()];
        for (i, cmd) in func.block(id).cmds.iter().enumerate() {
            if !cmd.is_gc_safe_point() {
                continue;
            }
            for def_id in &flow.before[i] {
                let def = defs[def_id.0 as usize];
                vars_to_mirror[def.block.index()][def.cmd].insert(def.var);
            }
        }
    }

    GcInfo {
        live_gc_vars,
        max_frame_size,
        slot_of_var,
        vars_to_mirror,
    }
}

/// Coalesce each block's GC checks.
///
/// All `CheckGC` commands are removed; if any were seen, a single one is
/// re-inserted before the next call or terminator, or at the block's end.
/// Checks swallowed by a following call disappear entirely, since calls are
/// already safe points. Returns `(moved, removed)` counts for diagnostics.
pub fn move_gc_checks(func: &mut Function) -> (u32, u32) {
    let mut moved = 0;
    let mut removed = 0;

    for block in &mut func.blocks {
        let mut out = Vec::with_capacity(block.cmds.len());
        let mut pending: u32 = 0;
        let mut pending_loc = Span::none();

        for cmd in block.cmds.drain(..) {
            match cmd {
                Cmd::CheckGC { loc } => {
                    if pending == 0 {
                        pending_loc = loc;
                    }
                    pending += 1;
                }
                cmd if cmd.is_barrier() => {
                    if pending > 0 {
                        if cmd.is_gc_safe_point() {
                            removed += pending;
                        } else {
                            out.push(Cmd::CheckGC { loc: pending_loc });
                            moved += 1;
                            removed += pending - 1;
                        }
                        pending = 0;
                    }
                    out.push(cmd);
                }
                cmd => out.push(cmd),
            }
        }
        if pending > 0 {
            out.push(Cmd::CheckGC { loc: pending_loc });
            moved += 1;
            removed += pending - 1;
        }
        block.cmds = out;
    }

    (moved, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ir::{FunctionBuilder, FunctionType, Type, Value};

    fn str_mv(dst: VarId, s: &str) -> Cmd {
        Cmd::Move {
            loc: Span::none(),
            dst,
            src: Value::String(s.to_string()),
        }
    }

    #[test]
    fn test_live_vars_and_slots_at_check() {
        // x = "a"; y = "b"; check_gc; use x, y
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let x = b.local("x", Type::String);
        let y = b.local("y", Type::String);
        let z = b.local("z", Type::String);
        b.begin_block();
        b.push(str_mv(x, "a"));
        b.push(str_mv(y, "b"));
        b.push(Cmd::CheckGC { loc: Span::none() });
        b.push(Cmd::Binop {
            loc: Span::none(),
            dst: z,
            op: vela_ir::BinOp::Concat,
            src1: Value::LocalVar(x),
            src2: Value::LocalVar(y),
        });
        let func = b.finish();

        let info = compute(&func);
        assert_eq!(info.live_gc_vars[0][2], vec![x, y]);
        // Moves are not safe points.
        assert!(info.live_gc_vars[0][0].is_empty());

        // Simultaneously live vars get distinct slots.
        assert_ne!(info.slot_of_var[&x], info.slot_of_var[&y]);
        assert_eq!(info.max_frame_size, 2);
        // z is dead at the check and needs no slot.
        assert!(!info.slot_of_var.contains_key(&z));
    }

    #[test]
    fn test_non_gc_locals_are_ignored() {
        let typ = FunctionType::new(vec![], vec![Type::Integer]);
        let mut b = FunctionBuilder::new("f", typ);
        let x = b.local("x", Type::Integer);
        b.begin_block();
        b.push(Cmd::Move {
            loc: Span::none(),
            dst: x,
            src: Value::Integer(1),
        });
        b.push(Cmd::CheckGC { loc: Span::none() });
        b.ret_vars(vec![x]);
        let func = b.finish();

        let info = compute(&func);
        assert!(info.live_gc_vars[0][1].is_empty());
        assert_eq!(info.max_frame_size, 0);
        assert!(info.slot_of_var.is_empty());
    }

    #[test]
    fn test_dead_after_check_not_live() {
        // x = "a"; check_gc; x = "b"; use x  -- the first write is dead at
        // the check.
        let typ = FunctionType::new(vec![], vec![Type::String]);
        let mut b = FunctionBuilder::new("f", typ);
        let x = b.local("x", Type::String);
        b.begin_block();
        b.push(str_mv(x, "a"));
        b.push(Cmd::CheckGC { loc: Span::none() });
        b.push(str_mv(x, "b"));
        b.ret_vars(vec![x]);
        let func = b.finish();

        let info = compute(&func);
        assert!(info.live_gc_vars[0][1].is_empty());
    }

    #[test]
    fn test_call_arguments_live_at_the_call() {
        // x is consumed by the call and never used again; it must still
        // survive a collection during the call.
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let f = b.local(
            "f",
            Type::Function(FunctionType::new(vec![Type::String], vec![])),
        );
        let x = b.local("x", Type::String);
        b.begin_block();
        b.push(str_mv(x, "a"));
        b.push(Cmd::CallDyn {
            loc: Span::none(),
            dsts: vec![],
            src_f: Value::LocalVar(f),
            srcs: vec![Value::LocalVar(x)],
        });
        let func = b.finish();

        let info = compute(&func);
        assert!(info.live_gc_vars[0][1].contains(&x));
        assert!(info.live_gc_vars[0][1].contains(&f));
    }

    #[test]
    fn test_vars_to_mirror() {
        // x = "a" reaches the call; the write must be mirrored.
        let typ = FunctionType::new(vec![], vec![Type::String]);
        let mut b = FunctionBuilder::new("f", typ);
        let f = b.local(
            "f",
            Type::Function(FunctionType::new(vec![], vec![])),
        );
        let x = b.local("x", Type::String);
        b.begin_block();
        b.push(str_mv(x, "a"));
        b.push(Cmd::CallDyn {
            loc: Span::none(),
            dsts: vec![],
            src_f: Value::LocalVar(f),
            srcs: vec![],
        });
        b.ret_vars(vec![x]);
        let func = b.finish();

        let info = compute(&func);
        assert!(info.vars_to_mirror[0][0].contains(&x));
        // The call itself defines nothing here.
        assert!(info.vars_to_mirror[0][1].is_empty());
    }

    #[test]
    fn test_move_gc_checks_coalesces() {
        // Three checks in a row become one at the block end.
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        b.begin_block();
        b.push(Cmd::CheckGC { loc: Span::none() });
        b.push(Cmd::CheckGC { loc: Span::none() });
        b.push(Cmd::CheckGC { loc: Span::none() });
        let mut func = b.finish();

        let (moved, removed) = move_gc_checks(&mut func);
        assert_eq!(moved, 1);
        assert_eq!(removed, 2);
        assert_eq!(func.blocks[0].cmds.len(), 1);
        assert!(matches!(func.blocks[0].cmds[0], Cmd::CheckGC { .. }));
    }

    #[test]
    fn test_call_absorbs_checks() {
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let f = b.local(
            "f",
            Type::Function(FunctionType::new(vec![], vec![])),
        );
        b.begin_block();
        b.push(Cmd::CheckGC { loc: Span::none() });
        b.push(Cmd::CallDyn {
            loc: Span::none(),
            dsts: vec![],
            src_f: Value::LocalVar(f),
            srcs: vec![],
        });
        let mut func = b.finish();

        let (moved, removed) = move_gc_checks(&mut func);
        assert_eq!(moved, 0);
        assert_eq!(removed, 1);
        assert_eq!(func.blocks[0].cmds.len(), 1);
        assert!(matches!(func.blocks[0].cmds[0], Cmd::CallDyn { .. }));
    }

    #[test]
    fn test_check_moves_before_terminator() {
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let x = b.local("x", Type::Integer);
        b.begin_block();
        b.push(Cmd::CheckGC { loc: Span::none() });
        b.push(Cmd::Move {
            loc: Span::none(),
            dst: x,
            src: Value::Integer(1),
        });
        b.push(Cmd::Jmp {
            target: vela_ir::BlockId::new(2),
        });
        b.begin_block();
        let mut func = b.finish();

        let (moved, removed) = move_gc_checks(&mut func);
        assert_eq!(moved, 1);
        assert_eq!(removed, 0);
        let cmds = &func.blocks[0].cmds;
        assert!(matches!(cmds[0], Cmd::Move { .. }));
        assert!(matches!(cmds[1], Cmd::CheckGC { .. }));
        assert!(matches!(cmds[2], Cmd::Jmp { .. }));
    }
}
