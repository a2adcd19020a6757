//! Static-call inlining
//!
//! Splices the blocks of a statically-resolved callee into the caller at the
//! call site. Callee variables and upvalue slots are appended to the
//! caller's tables with renumbering; callee jumps land inside the spliced
//! region and caller jumps past the call site shift to make room. Scanning
//! resumes after the spliced return moves, so a freshly inlined body is not
//! re-expanded, and calls to a function currently being expanded (the caller
//! itself included) are left alone.

use rustc_hash::FxHashSet;
use vela_ir::{BlockId, Cmd, FunId, Module, UpvalueId, Value, VarId};

/// Inline every resolvable, non-recursive static call in the module.
/// Returns the number of calls expanded.
pub fn run(module: &mut Module) -> u32 {
    let mut count = 0;
    for fi in 0..module.functions.len() as u32 {
        count += inline_function(module, FunId::new(fi));
    }
    count
}

/// The callee of a static call, when the caller can resolve it
fn resolve_callee(module: &Module, caller_id: FunId, cmd: &Cmd) -> Option<FunId> {
    let Cmd::CallStatic { src_f, .. } = cmd else {
        return None;
    };
    let caller = module.function(caller_id);
    match src_f {
        Value::LocalVar(v) => caller.f_id_of_local.get(v).copied(),
        Value::Upvalue(u) => caller.f_id_of_upvalue.get(u).copied(),
        _ => None,
    }
}

fn inline_function(module: &mut Module, caller_id: FunId) -> u32 {
    let mut count = 0;
    let mut stack: FxHashSet<FunId> = FxHashSet::default();
    stack.insert(caller_id);

    let mut block_i: u32 = 1;
    let mut cmd_i: usize = 0;
    while (block_i as usize) <= module.function(caller_id).blocks.len() {
        let block_id = BlockId::new(block_i);
        if cmd_i >= module.function(caller_id).block(block_id).cmds.len() {
            block_i += 1;
            cmd_i = 0;
            continue;
        }

        let callee_id =
            resolve_callee(module, caller_id, &module.function(caller_id).block(block_id).cmds[cmd_i]);
        match callee_id {
            Some(callee_id) if !stack.contains(&callee_id) => {
                let (next_block, next_cmd) = splice(module, caller_id, block_id, cmd_i, callee_id);
                count += 1;
                block_i = next_block.as_u32();
                cmd_i = next_cmd;
            }
            _ => cmd_i += 1,
        }
    }
    count
}

/// Splice `callee_id`'s blocks into the caller in place of the `CallStatic`
/// at (`call_block`, `call_cmd`). Returns the position immediately after the
/// last inserted command.
fn splice(
    module: &mut Module,
    caller_id: FunId,
    call_block: BlockId,
    call_cmd: usize,
    callee_id: FunId,
) -> (BlockId, usize) {
    // Structural copies of everything the splice needs; the clone also
    // guarantees repeated inlinings of one callee share no IR nodes.
    let callee = module.function(callee_id);
    let callee_vars = callee.vars.clone();
    let callee_upvalues = callee.captured_vars.clone();
    let mut callee_blocks = callee.blocks.clone();
    let callee_ret_vars = callee.ret_vars.clone();
    let callee_f_of_local = callee.f_id_of_local.clone();
    let callee_f_of_upvalue = callee.f_id_of_upvalue.clone();
    debug_assert!(
        callee_blocks.last().unwrap().terminator().is_none(),
        "callee exit block must not end in a jump"
    );

    let num_callee_blocks = callee_blocks.len() as u32;
    let delta = num_callee_blocks - 1;

    let caller = module.function_mut(caller_id);
    let var_offset = caller.vars.len() as u32;
    let upvalue_offset = caller.captured_vars.len() as u32;
    caller.vars.extend(callee_vars);
    caller.captured_vars.extend(callee_upvalues);
    for (v, f) in callee_f_of_local {
        caller
            .f_id_of_local
            .insert(VarId::new(v.as_u32() + var_offset), f);
    }
    for (u, f) in callee_f_of_upvalue {
        caller
            .f_id_of_upvalue
            .insert(UpvalueId::new(u.as_u32() + upvalue_offset), f);
    }

    // Make room in the caller's block numbering. Targets at the call block
    // itself stay: they now enter the first spliced block, which starts with
    // the call block's original leading commands.
    if delta > 0 {
        for block in &mut caller.blocks {
            for target in block.cmds.iter_mut().flat_map(Cmd::jump_targets_mut) {
                if *target > call_block {
                    *target = BlockId::new(target.as_u32() + delta);
                }
            }
        }
        for lp in &mut caller.for_loops {
            // A loop region with the call inside it stretches over the
            // spliced blocks; blocks whose terminator defines the region
            // boundary (prep, body_last) follow the splice when they are the
            // call block itself.
            if lp.prep_block >= call_block {
                lp.prep_block = BlockId::new(lp.prep_block.as_u32() + delta);
            }
            if lp.body_first > call_block {
                lp.body_first = BlockId::new(lp.body_first.as_u32() + delta);
            }
            if lp.body_last >= call_block {
                lp.body_last = BlockId::new(lp.body_last.as_u32() + delta);
            }
        }
    }

    // Take the call block apart.
    let mut before_cmds = std::mem::take(&mut caller.blocks[call_block.index()].cmds);
    let after_cmds = before_cmds.split_off(call_cmd + 1);
    let call = before_cmds.pop().unwrap();
    let Cmd::CallStatic {
        loc: call_loc,
        dsts: call_dsts,
        srcs: call_srcs,
        ..
    } = call
    else {
        unreachable!("splice target must be a static call");
    };

    // Renumber the callee copy into the caller's id spaces.
    let block_shift = call_block.as_u32() - 1;
    for block in &mut callee_blocks {
        for cmd in &mut block.cmds {
            for dst in cmd.destinations_mut() {
                *dst = VarId::new(dst.as_u32() + var_offset);
            }
            for src in cmd.sources_mut() {
                match src {
                    Value::LocalVar(v) => *v = VarId::new(v.as_u32() + var_offset),
                    Value::Upvalue(u) => *u = UpvalueId::new(u.as_u32() + upvalue_offset),
                    _ => {}
                }
            }
            for target in cmd.jump_targets_mut() {
                *target = BlockId::new(target.as_u32() + block_shift);
            }
        }
    }

    // First spliced block: leading caller commands, then one move per
    // argument into the renumbered parameters, then the callee entry.
    for (i, src) in call_srcs.into_iter().enumerate() {
        before_cmds.push(Cmd::Move {
            loc: call_loc,
            dst: VarId::new(i as u32 + 1 + var_offset),
            src,
        });
    }
    before_cmds.extend(std::mem::take(&mut callee_blocks[0].cmds));
    callee_blocks[0].cmds = before_cmds;

    // Last spliced block: one move per return value, then the caller
    // commands that followed the call.
    let last = callee_blocks.last_mut().unwrap();
    for (k, dst) in call_dsts.into_iter().enumerate() {
        last.cmds.push(Cmd::Move {
            loc: call_loc,
            dst,
            src: Value::LocalVar(VarId::new(callee_ret_vars[k].as_u32() + var_offset)),
        });
    }
    let resume_cmd = last.cmds.len();
    last.cmds.extend(after_cmds);

    caller
        .blocks
        .splice(call_block.index()..=call_block.index(), callee_blocks);

    (BlockId::new(call_block.as_u32() + delta), resume_cmd)
}
