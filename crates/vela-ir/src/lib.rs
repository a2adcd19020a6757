//! Vela IR - Typed Intermediate Representation
//!
//! The IR the Vela front end lowers to and the middle-end operates on.
//!
//! # Architecture
//!
//! A [`Module`] holds the functions of one source file. Each [`Function`]
//! owns its variables and a control-flow graph of [`BasicBlock`]s; blocks
//! hold [`Cmd`]s and reference each other by dense 1-based [`BlockId`]s
//! (pointer-free, so the cyclic CFG needs no shared ownership). The last
//! block of every function is its unique exit and carries no terminator.
//!
//! The middle-end rewrites this IR in place; the C emitter consumes the
//! result together with the GC tables computed by `vela-middle`.

pub mod block;
pub mod builder;
pub mod cmd;
pub mod function;
pub mod module;
pub mod pretty;
pub mod span;
pub mod types;
pub mod value;

pub use block::{BasicBlock, BlockId};
pub use builder::FunctionBuilder;
pub use cmd::{BinOp, Cmd, FunId, UnOp};
pub use function::{ForLoop, Function, Upvalue, Var};
pub use module::Module;
pub use pretty::PrettyPrint;
pub use span::Span;
pub use types::{Field, FunctionType, RecordType, Type};
pub use value::{UpvalueId, Value, VarId};
