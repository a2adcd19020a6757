//! Pretty-printing for IR
//!
//! Provides human-readable output for debugging IR structures.

use std::fmt::Write;

use crate::block::BasicBlock;
use crate::cmd::Cmd;
use crate::function::Function;
use crate::module::Module;

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

impl PrettyPrint for Module {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        for (i, func) in self.functions.iter().enumerate() {
            writeln!(output, "; fn{}", i).unwrap();
            output.push_str(&func.pretty_print());
            writeln!(output).unwrap();
        }
        output
    }
}

impl PrettyPrint for Function {
    fn pretty_print(&self) -> String {
        let mut output = String::new();
        writeln!(output, "function {} {} {{", self.name, self.typ).unwrap();

        for (i, var) in self.vars.iter().enumerate() {
            writeln!(output, "  ; v{}: {} {}", i + 1, var.name, var.typ).unwrap();
        }
        for (i, upvalue) in self.captured_vars.iter().enumerate() {
            writeln!(output, "  ; u{}: {} {}", i + 1, upvalue.name, upvalue.typ).unwrap();
        }

        for (i, block) in self.blocks.iter().enumerate() {
            writeln!(output, "  b{}:", i + 1).unwrap();
            output.push_str(&block.pretty_print_indented(4));
        }

        writeln!(output, "}}").unwrap();
        output
    }
}

impl BasicBlock {
    fn pretty_print_indented(&self, indent: usize) -> String {
        let mut output = String::new();
        let prefix = " ".repeat(indent);
        for cmd in &self.cmds {
            writeln!(output, "{}{}", prefix, format_cmd(cmd)).unwrap();
        }
        output
    }
}

fn format_values(values: &[crate::value::Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_cmd(cmd: &Cmd) -> String {
    match cmd {
        Cmd::Move { dst, src, .. } => format!("{} = {}", dst, src),
        Cmd::Unop { dst, op, src, .. } => format!("{} = {} {}", dst, op, src),
        Cmd::Binop {
            dst,
            op,
            src1,
            src2,
            ..
        } => format!("{} = {} {} {}", dst, src1, op, src2),
        Cmd::CallStatic {
            dsts, src_f, srcs, ..
        } => {
            let dsts_str = dsts
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} = call_static {}({})", dsts_str, src_f, format_values(srcs))
        }
        Cmd::CallDyn {
            dsts, src_f, srcs, ..
        } => {
            let dsts_str = dsts
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{} = call_dyn {}({})", dsts_str, src_f, format_values(srcs))
        }
        Cmd::NewArr { dst, src_size, .. } => format!("{} = new_arr({})", dst, src_size),
        Cmd::GetArr {
            dst, src_arr, src_i, ..
        } => format!("{} = {}[{}]", dst, src_arr, src_i),
        Cmd::SetArr {
            src_arr,
            src_i,
            src_v,
            ..
        } => format!("{}[{}] = {}", src_arr, src_i, src_v),
        Cmd::RenormArr { src_arr, src_i, .. } => format!("renorm_arr {}, {}", src_arr, src_i),
        Cmd::NewRecord { dst, rec_typ, .. } => format!("{} = new_record {}", dst, rec_typ.name),
        Cmd::NewClosure { dst, f_id, .. } => format!("{} = new_closure {}", dst, f_id),
        Cmd::GetField {
            dst, src_rec, field, ..
        } => format!("{} = {}.{}", dst, src_rec, field),
        Cmd::SetField {
            src_rec,
            src_v,
            field,
            ..
        } => format!("{}.{} = {}", src_rec, field, src_v),
        Cmd::InitUpvalues { f_id, srcs, .. } => {
            format!("init_upvalues {}({})", f_id, format_values(srcs))
        }
        Cmd::ForStep {
            dst_i,
            src_i,
            src_limit,
            src_step,
            ..
        } => format!("{} = for_step {}, {}, {}", dst_i, src_i, src_limit, src_step),
        Cmd::CheckGC { .. } => "check_gc".to_string(),
        Cmd::Jmp { target } => format!("jmp {}", target),
        Cmd::JmpIf {
            src_cond,
            target_true,
            target_false,
            ..
        } => format!("jmp_if {} ? {} : {}", src_cond, target_true, target_false),
        Cmd::Nop => "nop".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockId;
    use crate::span::Span;
    use crate::value::{Value, VarId};

    #[test]
    fn test_format_move() {
        let cmd = Cmd::Move {
            loc: Span::none(),
            dst: VarId::new(1),
            src: Value::Integer(42),
        };
        assert_eq!(format_cmd(&cmd), "v1 = 42");
    }

    #[test]
    fn test_format_jmp_if() {
        let cmd = Cmd::JmpIf {
            loc: Span::none(),
            src_cond: Value::LocalVar(VarId::new(2)),
            target_true: BlockId::new(2),
            target_false: BlockId::new(3),
        };
        assert_eq!(format_cmd(&cmd), "jmp_if v2 ? b2 : b3");
    }
}
