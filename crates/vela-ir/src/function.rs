//! IR functions and their control-flow graphs
//!
//! A function owns its variables, captured-variable slots, and basic blocks.
//! Jumps reference blocks by dense integer id rather than by pointer, so the
//! cyclic CFG needs no shared ownership.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::block::{BasicBlock, BlockId};
use crate::cmd::{Cmd, FunId};
use crate::span::Span;
use crate::types::{FunctionType, Type};
use crate::value::{UpvalueId, Value, VarId};

/// A local variable declaration
#[derive(Debug, Clone)]
pub struct Var {
    /// Source name
    pub name: String,
    /// Declared type
    pub typ: Type,
    /// Declaration site
    pub loc: Span,
}

/// A captured-variable slot declaration
#[derive(Debug, Clone)]
pub struct Upvalue {
    /// Source name of the captured variable
    pub name: String,
    /// Type of the captured value
    pub typ: Type,
    /// Capture site
    pub loc: Span,
}

/// Metadata for a counted `for` loop, produced by the front end.
#[derive(Debug, Clone)]
pub struct ForLoop {
    /// Block that initializes the counter and tests the bound
    pub prep_block: BlockId,
    /// First block of the loop body
    pub body_first: BlockId,
    /// Last block of the loop body
    pub body_last: BlockId,
    /// The induction variable
    pub iter_var: VarId,
    /// The loop bound
    pub limit: Value,
    /// Whether the step is a positive constant
    pub step_is_positive: bool,
    /// The loop statement's location
    pub loc: Span,
}

/// An IR function
#[derive(Debug, Clone)]
pub struct Function {
    /// Source name
    pub name: String,
    /// Function type; `vars[0..arg_count]` are the parameters, in order
    pub typ: Rc<FunctionType>,
    /// Local variables, indexed by 1-based `VarId`
    pub vars: Vec<Var>,
    /// Locals the exit block's return values are read from
    pub ret_vars: Vec<VarId>,
    /// Captured-variable slots, indexed by 1-based `UpvalueId`
    pub captured_vars: Vec<Upvalue>,
    /// Basic blocks, indexed by 1-based `BlockId`; block 1 is the entry and
    /// the last block is the unique, un-terminated exit
    pub blocks: Vec<BasicBlock>,
    /// Resolution of function-valued upvalues to module functions
    pub f_id_of_upvalue: FxHashMap<UpvalueId, FunId>,
    /// Resolution of function-valued locals to module functions
    pub f_id_of_local: FxHashMap<VarId, FunId>,
    /// Counted loops in this function
    pub for_loops: Vec<ForLoop>,
    /// Declaration site
    pub loc: Span,
}

impl Function {
    /// Create a function with no variables and no blocks
    pub fn new(name: impl Into<String>, typ: Rc<FunctionType>, loc: Span) -> Self {
        Self {
            name: name.into(),
            typ,
            vars: Vec::new(),
            ret_vars: Vec::new(),
            captured_vars: Vec::new(),
            blocks: Vec::new(),
            f_id_of_upvalue: FxHashMap::default(),
            f_id_of_local: FxHashMap::default(),
            for_loops: Vec::new(),
            loc,
        }
    }

    /// Number of parameters
    pub fn arg_count(&self) -> usize {
        self.typ.arg_types.len()
    }

    /// Whether the given var-id is a parameter
    pub fn is_param(&self, id: VarId) -> bool {
        id.index() < self.arg_count()
    }

    /// Declare a new local, returning its id
    pub fn add_var(&mut self, var: Var) -> VarId {
        self.vars.push(var);
        VarId::new(self.vars.len() as u32)
    }

    /// Declare a new captured-variable slot, returning its id
    pub fn add_captured(&mut self, upvalue: Upvalue) -> UpvalueId {
        self.captured_vars.push(upvalue);
        UpvalueId::new(self.captured_vars.len() as u32)
    }

    /// Look up a variable declaration
    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.index()]
    }

    /// Look up a block
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// Look up a block mutably
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// The id of the exit block (the highest block-id)
    pub fn exit_block_id(&self) -> BlockId {
        BlockId::new(self.blocks.len() as u32)
    }

    /// Iterate over all block-ids in ascending order
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (1..=self.blocks.len() as u32).map(BlockId::new)
    }

    /// Var-ids of all locals, in ascending order
    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (1..=self.vars.len() as u32).map(VarId::new)
    }

    /// The blocks control may reach directly from `id`: the jump targets of
    /// the terminator, or the next block when control falls through.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let block = self.block(id);
        match block.terminator() {
            Some(term) => term.jump_targets(),
            None if id != self.exit_block_id() => vec![BlockId::new(id.as_u32() + 1)],
            None => vec![],
        }
    }

    /// Successor lists for every block, indexed by block index
    pub fn successor_lists(&self) -> Vec<Vec<BlockId>> {
        self.block_ids().map(|id| self.successors(id)).collect()
    }

    /// Predecessor lists for every block, indexed by block index
    pub fn predecessor_lists(&self) -> Vec<Vec<BlockId>> {
        let mut preds = vec![Vec::new(); self.blocks.len()];
        for id in self.block_ids() {
            for succ in self.successors(id) {
                preds[succ.index()].push(id);
            }
        }
        preds
    }

    /// Blocks in reverse post-order of a depth-first walk over successors,
    /// starting at the entry. Iterating a forward analysis in this order
    /// visits a block's predecessors before the block wherever the CFG
    /// allows. Blocks unreachable from the entry are not included.
    pub fn forward_order(&self) -> Vec<BlockId> {
        depth_first_order(self.blocks.len(), BlockId::ENTRY, &self.successor_lists())
    }

    /// Blocks in reverse post-order of a depth-first walk over predecessors,
    /// starting at the exit. The mirror of [`Function::forward_order`] for
    /// backward analyses. Blocks that cannot reach the exit are not included.
    pub fn backward_order(&self) -> Vec<BlockId> {
        depth_first_order(
            self.blocks.len(),
            self.exit_block_id(),
            &self.predecessor_lists(),
        )
    }

    /// Insert `block` so that it gets id `at`, shifting every existing block
    /// at `at` or later one id up. Jump targets and loop descriptors that
    /// reference shifted blocks are updated; the inserted block's own
    /// commands are taken as already referring to post-insertion ids.
    pub fn insert_block(&mut self, at: BlockId, block: BasicBlock) {
        for existing in &mut self.blocks {
            for target in existing.cmds.iter_mut().flat_map(Cmd::jump_targets_mut) {
                if *target >= at {
                    *target = BlockId::new(target.as_u32() + 1);
                }
            }
        }
        for lp in &mut self.for_loops {
            for field in [&mut lp.prep_block, &mut lp.body_first, &mut lp.body_last] {
                if *field >= at {
                    *field = BlockId::new(field.as_u32() + 1);
                }
            }
        }
        self.blocks.insert(at.index(), block);
    }
}

/// Reverse post-order over `edges` from `start`; nodes not reachable through
/// `edges` are left out.
fn depth_first_order(num_blocks: usize, start: BlockId, edges: &[Vec<BlockId>]) -> Vec<BlockId> {
    let mut visited = vec![false; num_blocks];
    let mut post = Vec::with_capacity(num_blocks);
    let mut stack: Vec<(usize, usize)> = Vec::new();

    visited[start.index()] = true;
    stack.push((start.index(), 0));

    while let Some((node, edge_idx)) = stack.last_mut() {
        if let Some(next) = edges[*node].get(*edge_idx) {
            *edge_idx += 1;
            let next = next.index();
            if !visited[next] {
                visited[next] = true;
                stack.push((next, 0));
            }
        } else {
            post.push(BlockId::new(*node as u32 + 1));
            stack.pop();
        }
    }

    post.reverse();
    post
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_block_function() -> Function {
        // b1: jmp_if v1 -> b2 / b3;  b2: jmp b3;  b3: (exit)
        let typ = FunctionType::new(vec![], vec![]);
        let mut func = Function::new("test", typ, Span::none());
        func.add_var(Var {
            name: "c".to_string(),
            typ: Type::Boolean,
            loc: Span::none(),
        });

        let mut b1 = BasicBlock::new();
        b1.push(Cmd::JmpIf {
            loc: Span::none(),
            src_cond: Value::LocalVar(VarId::new(1)),
            target_true: BlockId::new(2),
            target_false: BlockId::new(3),
        });
        let mut b2 = BasicBlock::new();
        b2.push(Cmd::Jmp {
            target: BlockId::new(3),
        });
        func.blocks = vec![b1, b2, BasicBlock::new()];
        func
    }

    #[test]
    fn test_successors_and_predecessors() {
        let func = two_block_function();
        assert_eq!(
            func.successors(BlockId::new(1)),
            vec![BlockId::new(2), BlockId::new(3)]
        );
        assert_eq!(func.successors(BlockId::new(3)), vec![]);

        let preds = func.predecessor_lists();
        assert_eq!(preds[2], vec![BlockId::new(1), BlockId::new(2)]);
    }

    #[test]
    fn test_fallthrough_successor() {
        let typ = FunctionType::new(vec![], vec![]);
        let mut func = Function::new("test", typ, Span::none());
        func.blocks = vec![BasicBlock::new(), BasicBlock::new()];
        assert_eq!(func.successors(BlockId::new(1)), vec![BlockId::new(2)]);
    }

    #[test]
    fn test_forward_order_starts_at_entry() {
        let func = two_block_function();
        let order = func.forward_order();
        assert_eq!(order.first(), Some(&BlockId::ENTRY));
        assert_eq!(order.len(), 3);
        // b2 comes before b3 in reverse post-order
        let pos2 = order.iter().position(|b| *b == BlockId::new(2)).unwrap();
        let pos3 = order.iter().position(|b| *b == BlockId::new(3)).unwrap();
        assert!(pos2 < pos3);
    }

    #[test]
    fn test_backward_order_starts_at_exit() {
        let func = two_block_function();
        let order = func.backward_order();
        assert_eq!(order.first(), Some(&BlockId::new(3)));
    }

    #[test]
    fn test_insert_block_shifts_targets() {
        let mut func = two_block_function();
        // Insert a block between b1 and the old b2.
        let mut fresh = BasicBlock::new();
        fresh.push(Cmd::Jmp {
            target: BlockId::new(3),
        });
        func.insert_block(BlockId::new(2), fresh);

        assert_eq!(func.blocks.len(), 4);
        // b1's targets moved up past the insertion point.
        assert_eq!(
            func.block(BlockId::new(1)).terminator().unwrap().jump_targets(),
            vec![BlockId::new(3), BlockId::new(4)]
        );
        // The old b2 now jumps to the shifted exit.
        assert_eq!(
            func.block(BlockId::new(3)).terminator().unwrap().jump_targets(),
            vec![BlockId::new(4)]
        );
    }
}
