//! Constant propagation
//!
//! Forward lattice analysis over scalar locals (Undef ⊏ Constant ⊏ Nac).
//! Sources whose variable is a known constant are rewritten into fresh
//! literals, upvalue slots that every closure-creation site feeds the same
//! literal are rewritten across functions, and operations left with only
//! literal operands are folded into plain moves.

use rustc_hash::FxHashMap;
use vela_ir::{BinOp, BlockId, Cmd, Function, Module, UnOp, UpvalueId, Value};

use crate::dataflow::{self, Analysis, Direction};

/// Per-variable lattice element
#[derive(Debug, Clone, PartialEq)]
enum Lattice {
    /// No path has written the variable yet
    Undef,
    /// Every path so far writes this one literal
    Constant(Value),
    /// Not a constant
    Nac,
}

impl Lattice {
    fn join(&mut self, other: &Lattice) {
        match (&*self, other) {
            (_, Lattice::Undef) => {}
            (Lattice::Undef, _) => *self = other.clone(),
            (Lattice::Nac, _) => {}
            (_, Lattice::Nac) => *self = Lattice::Nac,
            (Lattice::Constant(a), Lattice::Constant(b)) => {
                if a != b {
                    *self = Lattice::Nac;
                }
            }
        }
    }
}

struct ConstAnalysis<'a> {
    func: &'a Function,
    /// Whether each variable's type admits literals
    scalar: Vec<bool>,
}

impl<'a> ConstAnalysis<'a> {
    fn new(func: &'a Function) -> Self {
        let scalar = func.vars.iter().map(|v| v.typ.is_scalar()).collect();
        Self { func, scalar }
    }

    fn transfer_cmd(&self, cmd: &Cmd, fact: &mut Vec<Lattice>) {
        if let Cmd::Move { dst, src, .. } = cmd {
            fact[dst.index()] = if !self.scalar[dst.index()] {
                Lattice::Nac
            } else {
                match src {
                    Value::Upvalue(_) => Lattice::Nac,
                    Value::LocalVar(v) => fact[v.index()].clone(),
                    literal => Lattice::Constant(literal.clone()),
                }
            };
        } else {
            for dst in cmd.destinations() {
                fact[dst.index()] = Lattice::Nac;
            }
        }
    }
}

impl Analysis for ConstAnalysis<'_> {
    type Fact = Vec<Lattice>;

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn bottom(&self) -> Self::Fact {
        vec![Lattice::Undef; self.func.vars.len()]
    }

    fn boundary(&self) -> Self::Fact {
        self.func
            .var_ids()
            .map(|id| {
                if self.func.is_param(id) {
                    Lattice::Nac
                } else {
                    Lattice::Undef
                }
            })
            .collect()
    }

    fn join_into(&self, acc: &mut Self::Fact, from: &Self::Fact) {
        for (a, b) in acc.iter_mut().zip(from) {
            a.join(b);
        }
    }

    fn transfer_block(&self, _id: BlockId, block: &vela_ir::BasicBlock, fact: &mut Self::Fact) {
        for cmd in &block.cmds {
            self.transfer_cmd(cmd, fact);
        }
    }
}

/// Constant values of a function's upvalue slots, gathered from the
/// `InitUpvalues` commands of the functions that create its closures.
/// `None` marks a slot fed conflicting or non-constant values.
type ConstantUpvalues = FxHashMap<UpvalueId, Option<Value>>;

/// Replace upvalue reads whose slot has a known constant value
fn rewrite_upvalues(func: &mut Function, constants: &ConstantUpvalues) {
    for block in &mut func.blocks {
        for cmd in &mut block.cmds {
            for src in cmd.sources_mut() {
                if let Value::Upvalue(u) = src {
                    if let Some(Some(value)) = constants.get(u) {
                        *src = value.clone();
                    }
                }
            }
        }
    }
}

/// Propagate constants within one function and rewrite known-constant
/// sources into literals
fn propagate(func: &mut Function) {
    let result = {
        let analysis = ConstAnalysis::new(func);
        dataflow::solve(func, &analysis)
    };
    let scalar: Vec<bool> = func.vars.iter().map(|v| v.typ.is_scalar()).collect();

    let mut fact = vec![Lattice::Undef; func.vars.len()];
    for bi in 0..func.blocks.len() {
        fact.clone_from(&result.start[bi]);
        for cmd in &mut func.blocks[bi].cmds {
            for src in cmd.sources_mut() {
                if let Value::LocalVar(v) = src {
                    if let Lattice::Constant(value) = &fact[v.index()] {
                        *src = value.clone();
                    }
                }
            }
            transfer_after_rewrite(cmd, &scalar, &mut fact);
        }
    }
}

/// Same lattice step as [`ConstAnalysis::transfer_cmd`], replayed over the
/// already-rewritten command during the rewrite sweep
fn transfer_after_rewrite(cmd: &Cmd, scalar: &[bool], fact: &mut [Lattice]) {
    if let Cmd::Move { dst, src, .. } = cmd {
        fact[dst.index()] = if !scalar[dst.index()] {
            Lattice::Nac
        } else {
            match src {
                Value::Upvalue(_) => Lattice::Nac,
                Value::LocalVar(v) => fact[v.index()].clone(),
                literal => Lattice::Constant(literal.clone()),
            }
        };
    } else {
        for dst in cmd.destinations() {
            fact[dst.index()] = Lattice::Nac;
        }
    }
}

/// Fold operations whose operands are all literals into moves.
///
/// Only exact cases fold: wrapping integer arithmetic, float arithmetic,
/// same-type comparisons, boolean connectives, string concatenation.
/// Division and modulo are left to the host's semantics.
fn fold_literal_ops(func: &mut Function) {
    for block in &mut func.blocks {
        for cmd in &mut block.cmds {
            let folded = match cmd {
                Cmd::Binop {
                    loc,
                    dst,
                    op,
                    src1,
                    src2,
                } if src1.is_constant() && src2.is_constant() => {
                    fold_binop(*op, src1, src2).map(|value| Cmd::Move {
                        loc: *loc,
                        dst: *dst,
                        src: value,
                    })
                }
                Cmd::Unop { loc, dst, op, src } if src.is_constant() => {
                    fold_unop(*op, src).map(|value| Cmd::Move {
                        loc: *loc,
                        dst: *dst,
                        src: value,
                    })
                }
                _ => None,
            };
            if let Some(mv) = folded {
                *cmd = mv;
            }
        }
    }
}

fn fold_binop(op: BinOp, a: &Value, b: &Value) -> Option<Value> {
    use Value::*;
    match (op, a, b) {
        (BinOp::Add, Integer(x), Integer(y)) => Some(Integer(x.wrapping_add(*y))),
        (BinOp::Sub, Integer(x), Integer(y)) => Some(Integer(x.wrapping_sub(*y))),
        (BinOp::Mul, Integer(x), Integer(y)) => Some(Integer(x.wrapping_mul(*y))),
        (BinOp::Add, Float(x), Float(y)) => Some(Float(x + y)),
        (BinOp::Sub, Float(x), Float(y)) => Some(Float(x - y)),
        (BinOp::Mul, Float(x), Float(y)) => Some(Float(x * y)),
        (BinOp::Eq, Integer(x), Integer(y)) => Some(Bool(x == y)),
        (BinOp::Neq, Integer(x), Integer(y)) => Some(Bool(x != y)),
        (BinOp::Lt, Integer(x), Integer(y)) => Some(Bool(x < y)),
        (BinOp::Le, Integer(x), Integer(y)) => Some(Bool(x <= y)),
        (BinOp::Gt, Integer(x), Integer(y)) => Some(Bool(x > y)),
        (BinOp::Ge, Integer(x), Integer(y)) => Some(Bool(x >= y)),
        (BinOp::And, Bool(x), Bool(y)) => Some(Bool(*x && *y)),
        (BinOp::Or, Bool(x), Bool(y)) => Some(Bool(*x || *y)),
        (BinOp::Concat, String(x), String(y)) => {
            let mut s = x.clone();
            s.push_str(y);
            Some(String(s))
        }
        _ => None,
    }
}

fn fold_unop(op: UnOp, v: &Value) -> Option<Value> {
    match (op, v) {
        (UnOp::Neg, Value::Integer(x)) => Some(Value::Integer(x.wrapping_neg())),
        (UnOp::Neg, Value::Float(x)) => Some(Value::Float(-x)),
        (UnOp::Not, Value::Bool(x)) => Some(Value::Bool(!x)),
        _ => None,
    }
}

/// Record the constants a function's `InitUpvalues` commands feed into its
/// callees' upvalue slots. Conflicting sites poison the slot.
fn collect_constant_upvalues(func: &Function, constants: &mut Vec<ConstantUpvalues>) {
    for block in &func.blocks {
        for cmd in &block.cmds {
            let Cmd::InitUpvalues { f_id, srcs, .. } = cmd else {
                continue;
            };
            for (i, src) in srcs.iter().enumerate() {
                let slot = UpvalueId::new(i as u32 + 1);
                let recorded = if src.is_constant() {
                    Some(src.clone())
                } else {
                    None
                };
                let map = &mut constants[f_id.index()];
                match map.get(&slot) {
                    None => {
                        map.insert(slot, recorded);
                    }
                    Some(existing) if *existing != recorded => {
                        map.insert(slot, None);
                    }
                    Some(_) => {}
                }
            }
        }
    }
}

/// Run constant propagation over a whole module.
///
/// Functions are visited in declaration order, so each function's
/// closure-creation sites record constant upvalues before its callees are
/// processed (cyclic creation chains simply miss some rewrites; the result
/// stays sound).
pub fn run(module: &mut Module) {
    let mut constants: Vec<ConstantUpvalues> = vec![FxHashMap::default(); module.functions.len()];
    for fi in 0..module.functions.len() {
        let func = &mut module.functions[fi];
        rewrite_upvalues(func, &constants[fi]);
        propagate(func);
        fold_literal_ops(func);
        collect_constant_upvalues(&module.functions[fi], &mut constants);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ir::{FunId, FunctionBuilder, FunctionType, Span, Type, VarId};

    fn mv(dst: VarId, src: Value) -> Cmd {
        Cmd::Move {
            loc: Span::none(),
            dst,
            src,
        }
    }

    #[test]
    fn test_straight_line_propagation() {
        // x = 1; y = x; z = y  =>  all sources become literals
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let x = b.local("x", Type::Integer);
        let y = b.local("y", Type::Integer);
        let z = b.local("z", Type::Integer);
        b.begin_block();
        b.push(mv(x, Value::Integer(1)));
        b.push(mv(y, Value::LocalVar(x)));
        b.push(mv(z, Value::LocalVar(y)));
        let func = b.finish();

        let mut module = Module::new();
        module.add_function(func);
        run(&mut module);

        let cmds = &module.functions[0].blocks[0].cmds;
        assert!(matches!(&cmds[1], Cmd::Move { src: Value::Integer(1), .. }));
        assert!(matches!(&cmds[2], Cmd::Move { src: Value::Integer(1), .. }));
    }

    #[test]
    fn test_params_are_not_constants() {
        let typ = FunctionType::new(vec![Type::Integer], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let a = b.param("a");
        let y = b.local("y", Type::Integer);
        b.begin_block();
        b.push(mv(y, Value::LocalVar(a)));
        let func = b.finish();

        let mut module = Module::new();
        module.add_function(func);
        run(&mut module);

        assert!(matches!(
            &module.functions[0].blocks[0].cmds[0],
            Cmd::Move { src: Value::LocalVar(_), .. }
        ));
    }

    #[test]
    fn test_conflicting_paths_do_not_propagate() {
        // b1: jmp_if c -> b2 / b3;  b2: x = 1, jmp b4;  b3: x = 2, jmp b4
        // b4: y = x  -- x is 1 or 2 depending on the path
        let typ = FunctionType::new(vec![Type::Boolean], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let c = b.param("c");
        let x = b.local("x", Type::Integer);
        let y = b.local("y", Type::Integer);
        b.begin_block();
        b.push(Cmd::JmpIf {
            loc: Span::none(),
            src_cond: Value::LocalVar(c),
            target_true: vela_ir::BlockId::new(2),
            target_false: vela_ir::BlockId::new(3),
        });
        b.begin_block();
        b.push(mv(x, Value::Integer(1)));
        b.push(Cmd::Jmp {
            target: vela_ir::BlockId::new(4),
        });
        b.begin_block();
        b.push(mv(x, Value::Integer(2)));
        b.push(Cmd::Jmp {
            target: vela_ir::BlockId::new(4),
        });
        b.begin_block();
        b.push(mv(y, Value::LocalVar(x)));
        let func = b.finish();

        let mut module = Module::new();
        module.add_function(func);
        run(&mut module);

        assert!(matches!(
            &module.functions[0].blocks[3].cmds[0],
            Cmd::Move { src: Value::LocalVar(_), .. }
        ));
    }

    #[test]
    fn test_agreeing_paths_propagate() {
        // Both branches write 7; the join still knows the constant.
        let typ = FunctionType::new(vec![Type::Boolean], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let c = b.param("c");
        let x = b.local("x", Type::Integer);
        let y = b.local("y", Type::Integer);
        b.begin_block();
        b.push(Cmd::JmpIf {
            loc: Span::none(),
            src_cond: Value::LocalVar(c),
            target_true: vela_ir::BlockId::new(2),
            target_false: vela_ir::BlockId::new(3),
        });
        b.begin_block();
        b.push(mv(x, Value::Integer(7)));
        b.push(Cmd::Jmp {
            target: vela_ir::BlockId::new(4),
        });
        b.begin_block();
        b.push(mv(x, Value::Integer(7)));
        b.push(Cmd::Jmp {
            target: vela_ir::BlockId::new(4),
        });
        b.begin_block();
        b.push(mv(y, Value::LocalVar(x)));
        let func = b.finish();

        let mut module = Module::new();
        module.add_function(func);
        run(&mut module);

        assert!(matches!(
            &module.functions[0].blocks[3].cmds[0],
            Cmd::Move { src: Value::Integer(7), .. }
        ));
    }

    #[test]
    fn test_call_destinations_become_nac() {
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let f = b.local("f", Type::Function(FunctionType::new(vec![], vec![Type::Integer])));
        let x = b.local("x", Type::Integer);
        let y = b.local("y", Type::Integer);
        b.begin_block();
        b.push(mv(x, Value::Integer(1)));
        b.push(Cmd::CallDyn {
            loc: Span::none(),
            dsts: vec![x],
            src_f: Value::LocalVar(f),
            srcs: vec![],
        });
        b.push(mv(y, Value::LocalVar(x)));
        let func = b.finish();

        let mut module = Module::new();
        module.add_function(func);
        run(&mut module);

        assert!(matches!(
            &module.functions[0].blocks[0].cmds[2],
            Cmd::Move { src: Value::LocalVar(_), .. }
        ));
    }

    #[test]
    fn test_constant_upvalue_rewrite() {
        // fn0 feeds Integer(3) into fn1's only upvalue slot; fn1's read of
        // that slot becomes a literal.
        let mut module = Module::new();

        let typ0 = FunctionType::new(vec![], vec![]);
        let mut b0 = FunctionBuilder::new("outer", typ0);
        b0.begin_block();
        b0.push(Cmd::InitUpvalues {
            loc: Span::none(),
            f_id: FunId::new(1),
            srcs: vec![Value::Integer(3)],
        });
        module.add_function(b0.finish());

        let typ1 = FunctionType::new(vec![], vec![Type::Integer]);
        let mut b1 = FunctionBuilder::new("inner", typ1);
        let r = b1.local("r", Type::Integer);
        let u = b1.capture("n", Type::Integer);
        b1.begin_block();
        b1.push(mv(r, Value::Upvalue(u)));
        b1.ret_vars(vec![r]);
        module.add_function(b1.finish());

        run(&mut module);

        assert!(matches!(
            &module.functions[1].blocks[0].cmds[0],
            Cmd::Move { src: Value::Integer(3), .. }
        ));
    }

    #[test]
    fn test_conflicting_upvalue_sites_poison_slot() {
        let mut module = Module::new();

        let typ0 = FunctionType::new(vec![], vec![]);
        let mut b0 = FunctionBuilder::new("outer", typ0);
        b0.begin_block();
        b0.push(Cmd::InitUpvalues {
            loc: Span::none(),
            f_id: FunId::new(1),
            srcs: vec![Value::Integer(3)],
        });
        b0.push(Cmd::InitUpvalues {
            loc: Span::none(),
            f_id: FunId::new(1),
            srcs: vec![Value::Integer(4)],
        });
        module.add_function(b0.finish());

        let typ1 = FunctionType::new(vec![], vec![Type::Integer]);
        let mut b1 = FunctionBuilder::new("inner", typ1);
        let r = b1.local("r", Type::Integer);
        let u = b1.capture("n", Type::Integer);
        b1.begin_block();
        b1.push(mv(r, Value::Upvalue(u)));
        b1.ret_vars(vec![r]);
        module.add_function(b1.finish());

        run(&mut module);

        assert!(matches!(
            &module.functions[1].blocks[0].cmds[0],
            Cmd::Move { src: Value::Upvalue(_), .. }
        ));
    }

    #[test]
    fn test_binop_folding() {
        // x = 3; y = 4; z = x + y  =>  z = 7
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let x = b.local("x", Type::Integer);
        let y = b.local("y", Type::Integer);
        let z = b.local("z", Type::Integer);
        b.begin_block();
        b.push(mv(x, Value::Integer(3)));
        b.push(mv(y, Value::Integer(4)));
        b.push(Cmd::Binop {
            loc: Span::none(),
            dst: z,
            op: BinOp::Add,
            src1: Value::LocalVar(x),
            src2: Value::LocalVar(y),
        });
        let func = b.finish();

        let mut module = Module::new();
        module.add_function(func);
        run(&mut module);

        assert!(matches!(
            &module.functions[0].blocks[0].cmds[2],
            Cmd::Move { src: Value::Integer(7), .. }
        ));
    }

    #[test]
    fn test_division_is_not_folded() {
        let typ = FunctionType::new(vec![], vec![]);
        let mut b = FunctionBuilder::new("f", typ);
        let z = b.local("z", Type::Integer);
        b.begin_block();
        b.push(Cmd::Binop {
            loc: Span::none(),
            dst: z,
            op: BinOp::Div,
            src1: Value::Integer(1),
            src2: Value::Integer(0),
        });
        let func = b.finish();

        let mut module = Module::new();
        module.add_function(func);
        run(&mut module);

        assert!(matches!(
            &module.functions[0].blocks[0].cmds[0],
            Cmd::Binop { .. }
        ));
    }
}
