//! Basic blocks

use std::fmt;

use crate::cmd::Cmd;

/// Identifier of a basic block within a function.
///
/// Block-ids are 1-based and dense; id 1 is the entry block, and the highest
/// id is the function's unique exit block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The entry block of every function
    pub const ENTRY: BlockId = BlockId(1);

    /// Create a new block-id
    pub fn new(id: u32) -> Self {
        debug_assert!(id >= 1, "block-ids are 1-based");
        Self(id)
    }

    /// Get the raw id value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Index into the owning function's `blocks` vector
    pub fn index(&self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A maximal straight-line sequence of commands.
///
/// At most one command is a terminator (`Jmp` or `JmpIf`), and if present it
/// must be the last. An un-terminated block falls through to the next block,
/// except the exit block, which ends the function.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    /// The commands of this block, in execution order
    pub cmds: Vec<Cmd>,
}

impl BasicBlock {
    /// Create an empty block
    pub fn new() -> Self {
        Self { cmds: Vec::new() }
    }

    /// Append a command
    pub fn push(&mut self, cmd: Cmd) {
        debug_assert!(
            !self.cmds.last().map(Cmd::is_terminator).unwrap_or(false),
            "cannot append past a terminator"
        );
        self.cmds.push(cmd);
    }

    /// The block's terminator, if it has one
    pub fn terminator(&self) -> Option<&Cmd> {
        self.cmds.last().filter(|cmd| cmd.is_terminator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;
    use crate::value::{Value, VarId};

    #[test]
    fn test_terminator() {
        let mut block = BasicBlock::new();
        assert!(block.terminator().is_none());

        block.push(Cmd::Move {
            loc: Span::none(),
            dst: VarId::new(1),
            src: Value::Integer(0),
        });
        assert!(block.terminator().is_none());

        block.push(Cmd::Jmp {
            target: BlockId::new(2),
        });
        assert!(block.terminator().is_some());
    }
}
