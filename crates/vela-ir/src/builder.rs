//! Helper for constructing IR functions
//!
//! The front end's lowering and the middle-end's own tests both assemble
//! functions command by command; the builder keeps the id bookkeeping
//! (1-based vars, parameters first, blocks in order) in one place.

use std::rc::Rc;

use crate::block::{BasicBlock, BlockId};
use crate::cmd::{Cmd, FunId};
use crate::function::{ForLoop, Function, Upvalue, Var};
use crate::span::Span;
use crate::types::{FunctionType, Type};
use crate::value::{UpvalueId, VarId};

/// Builder for a single IR function
pub struct FunctionBuilder {
    func: Function,
}

impl FunctionBuilder {
    /// Start building a function of the given type
    pub fn new(name: impl Into<String>, typ: Rc<FunctionType>) -> Self {
        Self {
            func: Function::new(name, typ, Span::none()),
        }
    }

    /// Declare the next parameter. Parameters must be declared first and in
    /// order; the type comes from the function type.
    pub fn param(&mut self, name: impl Into<String>) -> VarId {
        let index = self.func.vars.len();
        assert!(
            index < self.func.arg_count(),
            "more parameters declared than the function type has"
        );
        let typ = self.func.typ.arg_types[index].clone();
        self.func.add_var(Var {
            name: name.into(),
            typ,
            loc: Span::none(),
        })
    }

    /// Declare a local variable
    pub fn local(&mut self, name: impl Into<String>, typ: Type) -> VarId {
        assert!(
            self.func.vars.len() >= self.func.arg_count(),
            "declare all parameters before locals"
        );
        self.func.add_var(Var {
            name: name.into(),
            typ,
            loc: Span::none(),
        })
    }

    /// Declare a captured-variable slot
    pub fn capture(&mut self, name: impl Into<String>, typ: Type) -> UpvalueId {
        self.func.add_captured(Upvalue {
            name: name.into(),
            typ,
            loc: Span::none(),
        })
    }

    /// Open a new basic block; subsequent [`FunctionBuilder::push`] calls
    /// append to it
    pub fn begin_block(&mut self) -> BlockId {
        self.func.blocks.push(BasicBlock::new());
        BlockId::new(self.func.blocks.len() as u32)
    }

    /// Append a command to the current block
    pub fn push(&mut self, cmd: Cmd) {
        self.func
            .blocks
            .last_mut()
            .expect("no block opened")
            .push(cmd);
    }

    /// Set the locals the exit block returns from
    pub fn ret_vars(&mut self, vars: Vec<VarId>) {
        self.func.ret_vars = vars;
    }

    /// Record a counted-loop descriptor
    pub fn for_loop(&mut self, lp: ForLoop) {
        self.func.for_loops.push(lp);
    }

    /// Record that a local holds the closure of a module function
    pub fn resolve_local(&mut self, var: VarId, f_id: FunId) {
        self.func.f_id_of_local.insert(var, f_id);
    }

    /// Record that an upvalue slot holds the closure of a module function
    pub fn resolve_upvalue(&mut self, upvalue: UpvalueId, f_id: FunId) {
        self.func.f_id_of_upvalue.insert(upvalue, f_id);
    }

    /// Finish the function
    pub fn finish(self) -> Function {
        debug_assert!(
            self.func.vars.len() >= self.func.arg_count(),
            "not all parameters were declared"
        );
        debug_assert!(!self.func.blocks.is_empty(), "function has no blocks");
        debug_assert!(
            self.func.blocks.last().unwrap().terminator().is_none(),
            "the exit block must not end in a jump"
        );
        self.func
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_params_come_first() {
        let typ = FunctionType::new(vec![Type::Integer, Type::Integer], vec![Type::Integer]);
        let mut b = FunctionBuilder::new("add", typ);
        let x = b.param("x");
        let y = b.param("y");
        let t = b.local("t", Type::Integer);
        assert_eq!(x, VarId::new(1));
        assert_eq!(y, VarId::new(2));
        assert_eq!(t, VarId::new(3));

        b.begin_block();
        b.push(Cmd::Binop {
            loc: Span::none(),
            dst: t,
            op: crate::cmd::BinOp::Add,
            src1: Value::LocalVar(x),
            src2: Value::LocalVar(y),
        });
        b.ret_vars(vec![t]);

        let func = b.finish();
        assert_eq!(func.arg_count(), 2);
        assert!(func.is_param(x));
        assert!(!func.is_param(t));
        assert_eq!(func.blocks.len(), 1);
    }
}
