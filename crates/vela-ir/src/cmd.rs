//! IR commands
//!
//! The command set of the Vela IR: straight-line operations plus the two
//! jump forms. A basic block holds a sequence of commands; at most the last
//! one may be a terminator.

use std::rc::Rc;

use crate::block::BlockId;
use crate::span::Span;
use crate::types::RecordType;
use crate::value::{Value, VarId};

/// Function identifier in a module (0-based, dense)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunId(pub u32);

impl FunId {
    /// Create a new function id
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Index into the module's `functions` vector
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Concat,
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Concat => "..",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Numeric negation
    Neg,
    /// Logical not
    Not,
}

impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "not"),
        }
    }
}

/// An IR command
#[derive(Debug, Clone)]
pub enum Cmd {
    /// Copy a value into a local: `dst = src`
    Move { loc: Span, dst: VarId, src: Value },

    /// Unary operation: `dst = op src`
    Unop {
        loc: Span,
        dst: VarId,
        op: UnOp,
        src: Value,
    },

    /// Binary operation: `dst = src1 op src2`
    Binop {
        loc: Span,
        dst: VarId,
        op: BinOp,
        src1: Value,
        src2: Value,
    },

    /// Call of a statically-resolvable Vela function
    CallStatic {
        loc: Span,
        dsts: Vec<VarId>,
        src_f: Value,
        srcs: Vec<Value>,
    },

    /// Call through a first-class function value
    CallDyn {
        loc: Span,
        dsts: Vec<VarId>,
        src_f: Value,
        srcs: Vec<Value>,
    },

    /// Allocate an array: `dst = new array(size)`
    NewArr {
        loc: Span,
        dst: VarId,
        src_size: Value,
    },

    /// Read an array element: `dst = src_arr[src_i]`
    GetArr {
        loc: Span,
        dst: VarId,
        src_arr: Value,
        src_i: Value,
    },

    /// Write an array element: `src_arr[src_i] = src_v`
    SetArr {
        loc: Span,
        src_arr: Value,
        src_i: Value,
        src_v: Value,
    },

    /// Refresh array metadata so elements up to `src_i` can be accessed
    /// without further bounds preparation
    RenormArr {
        loc: Span,
        src_arr: Value,
        src_i: Value,
    },

    /// Allocate a record: `dst = new rec_typ`
    ///
    /// When `rec_typ` is an upvalue box this does not count as initializing
    /// `dst`; the first `SetField` into the box does.
    NewRecord {
        loc: Span,
        dst: VarId,
        rec_typ: Rc<RecordType>,
    },

    /// Read a record field: `dst = src_rec.field`
    GetField {
        loc: Span,
        dst: VarId,
        src_rec: Value,
        rec_typ: Rc<RecordType>,
        field: String,
    },

    /// Write a record field: `src_rec.field = src_v`
    SetField {
        loc: Span,
        src_rec: Value,
        src_v: Value,
        rec_typ: Rc<RecordType>,
        field: String,
    },

    /// Create the closure of a module function: `dst = closure f_id`
    NewClosure {
        loc: Span,
        dst: VarId,
        f_id: FunId,
    },

    /// Initialize the upvalue slots of a module function's closure
    InitUpvalues {
        loc: Span,
        f_id: FunId,
        srcs: Vec<Value>,
    },

    /// Advance a counted loop's induction variable
    ForStep {
        loc: Span,
        dst_i: VarId,
        src_i: Value,
        src_limit: Value,
        src_step: Value,
    },

    /// Point at which the host garbage collector may run
    CheckGC { loc: Span },

    /// Unconditional jump (terminator)
    Jmp { target: BlockId },

    /// Conditional jump (terminator)
    JmpIf {
        loc: Span,
        src_cond: Value,
        target_true: BlockId,
        target_false: BlockId,
    },

    /// No operation (left behind by transforms)
    Nop,
}

impl Cmd {
    /// The values this command reads
    pub fn sources(&self) -> Vec<&Value> {
        match self {
            Cmd::Move { src, .. } => vec![src],
            Cmd::Unop { src, .. } => vec![src],
            Cmd::Binop { src1, src2, .. } => vec![src1, src2],
            Cmd::CallStatic { src_f, srcs, .. } | Cmd::CallDyn { src_f, srcs, .. } => {
                let mut out = vec![src_f];
                out.extend(srcs.iter());
                out
            }
            Cmd::NewArr { src_size, .. } => vec![src_size],
            Cmd::GetArr { src_arr, src_i, .. } => vec![src_arr, src_i],
            Cmd::SetArr {
                src_arr,
                src_i,
                src_v,
                ..
            } => vec![src_arr, src_i, src_v],
            Cmd::RenormArr { src_arr, src_i, .. } => vec![src_arr, src_i],
            Cmd::NewRecord { .. } | Cmd::NewClosure { .. } => vec![],
            Cmd::GetField { src_rec, .. } => vec![src_rec],
            Cmd::SetField { src_rec, src_v, .. } => vec![src_rec, src_v],
            Cmd::InitUpvalues { srcs, .. } => srcs.iter().collect(),
            Cmd::ForStep {
                src_i,
                src_limit,
                src_step,
                ..
            } => vec![src_i, src_limit, src_step],
            Cmd::JmpIf { src_cond, .. } => vec![src_cond],
            Cmd::CheckGC { .. } | Cmd::Jmp { .. } | Cmd::Nop => vec![],
        }
    }

    /// Mutable references to the values this command reads
    pub fn sources_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Cmd::Move { src, .. } => vec![src],
            Cmd::Unop { src, .. } => vec![src],
            Cmd::Binop { src1, src2, .. } => vec![src1, src2],
            Cmd::CallStatic { src_f, srcs, .. } | Cmd::CallDyn { src_f, srcs, .. } => {
                let mut out = vec![src_f];
                out.extend(srcs.iter_mut());
                out
            }
            Cmd::NewArr { src_size, .. } => vec![src_size],
            Cmd::GetArr { src_arr, src_i, .. } => vec![src_arr, src_i],
            Cmd::SetArr {
                src_arr,
                src_i,
                src_v,
                ..
            } => vec![src_arr, src_i, src_v],
            Cmd::RenormArr { src_arr, src_i, .. } => vec![src_arr, src_i],
            Cmd::NewRecord { .. } | Cmd::NewClosure { .. } => vec![],
            Cmd::GetField { src_rec, .. } => vec![src_rec],
            Cmd::SetField { src_rec, src_v, .. } => vec![src_rec, src_v],
            Cmd::InitUpvalues { srcs, .. } => srcs.iter_mut().collect(),
            Cmd::ForStep {
                src_i,
                src_limit,
                src_step,
                ..
            } => vec![src_i, src_limit, src_step],
            Cmd::JmpIf { src_cond, .. } => vec![src_cond],
            Cmd::CheckGC { .. } | Cmd::Jmp { .. } | Cmd::Nop => vec![],
        }
    }

    /// The locals this command writes
    pub fn destinations(&self) -> Vec<VarId> {
        match self {
            Cmd::Move { dst, .. }
            | Cmd::Unop { dst, .. }
            | Cmd::Binop { dst, .. }
            | Cmd::NewArr { dst, .. }
            | Cmd::GetArr { dst, .. }
            | Cmd::NewRecord { dst, .. }
            | Cmd::NewClosure { dst, .. }
            | Cmd::GetField { dst, .. } => vec![*dst],
            Cmd::CallStatic { dsts, .. } | Cmd::CallDyn { dsts, .. } => dsts.clone(),
            Cmd::ForStep { dst_i, .. } => vec![*dst_i],
            Cmd::SetArr { .. }
            | Cmd::SetField { .. }
            | Cmd::RenormArr { .. }
            | Cmd::InitUpvalues { .. }
            | Cmd::CheckGC { .. }
            | Cmd::Jmp { .. }
            | Cmd::JmpIf { .. }
            | Cmd::Nop => vec![],
        }
    }

    /// Mutable references to the locals this command writes
    pub fn destinations_mut(&mut self) -> Vec<&mut VarId> {
        match self {
            Cmd::Move { dst, .. }
            | Cmd::Unop { dst, .. }
            | Cmd::Binop { dst, .. }
            | Cmd::NewArr { dst, .. }
            | Cmd::GetArr { dst, .. }
            | Cmd::NewRecord { dst, .. }
            | Cmd::NewClosure { dst, .. }
            | Cmd::GetField { dst, .. } => vec![dst],
            Cmd::CallStatic { dsts, .. } | Cmd::CallDyn { dsts, .. } => dsts.iter_mut().collect(),
            Cmd::ForStep { dst_i, .. } => vec![dst_i],
            Cmd::SetArr { .. }
            | Cmd::SetField { .. }
            | Cmd::RenormArr { .. }
            | Cmd::InitUpvalues { .. }
            | Cmd::CheckGC { .. }
            | Cmd::Jmp { .. }
            | Cmd::JmpIf { .. }
            | Cmd::Nop => vec![],
        }
    }

    /// The block-ids this command may jump to
    pub fn jump_targets(&self) -> Vec<BlockId> {
        match self {
            Cmd::Jmp { target } => vec![*target],
            Cmd::JmpIf {
                target_true,
                target_false,
                ..
            } => vec![*target_true, *target_false],
            _ => vec![],
        }
    }

    /// Mutable references to the block-ids this command may jump to
    pub fn jump_targets_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            Cmd::Jmp { target } => vec![target],
            Cmd::JmpIf {
                target_true,
                target_false,
                ..
            } => vec![target_true, target_false],
            _ => vec![],
        }
    }

    /// Whether this command ends a basic block
    pub fn is_terminator(&self) -> bool {
        matches!(self, Cmd::Jmp { .. } | Cmd::JmpIf { .. })
    }

    /// Whether the host garbage collector may run at this command
    pub fn is_gc_safe_point(&self) -> bool {
        matches!(
            self,
            Cmd::CallStatic { .. } | Cmd::CallDyn { .. } | Cmd::CheckGC { .. }
        )
    }

    /// Whether a pending GC check cannot be pushed past this command
    pub fn is_barrier(&self) -> bool {
        matches!(self, Cmd::CallStatic { .. } | Cmd::CallDyn { .. }) || self.is_terminator()
    }

    /// The source location of this command, if it has one
    pub fn loc(&self) -> Span {
        match self {
            Cmd::Move { loc, .. }
            | Cmd::Unop { loc, .. }
            | Cmd::Binop { loc, .. }
            | Cmd::CallStatic { loc, .. }
            | Cmd::CallDyn { loc, .. }
            | Cmd::NewArr { loc, .. }
            | Cmd::GetArr { loc, .. }
            | Cmd::SetArr { loc, .. }
            | Cmd::RenormArr { loc, .. }
            | Cmd::NewRecord { loc, .. }
            | Cmd::NewClosure { loc, .. }
            | Cmd::GetField { loc, .. }
            | Cmd::SetField { loc, .. }
            | Cmd::InitUpvalues { loc, .. }
            | Cmd::ForStep { loc, .. }
            | Cmd::CheckGC { loc }
            | Cmd::JmpIf { loc, .. } => *loc,
            Cmd::Jmp { .. } | Cmd::Nop => Span::none(),
        }
    }
}
