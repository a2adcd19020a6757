//! Dataflow analysis framework
//!
//! A generic worklist solver over a function's control-flow graph, plus a
//! convenience layer for the common case of set-valued analyses described by
//! per-command gen/kill pairs. The analyses in this crate (initialization,
//! constant propagation, GC liveness, reaching definitions, renormalize
//! tracking) are all instances of one of the two layers.

use std::hash::Hash;

use rustc_hash::FxHashSet;
use vela_ir::{BasicBlock, BlockId, Cmd, Function};

/// Direction of propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Facts flow from the entry block toward the exit
    Forward,
    /// Facts flow from the exit block toward the entry
    Backward,
}

/// A dataflow analysis over block-level facts.
///
/// Facts form a finite lattice and `transfer_block` must be monotone, which
/// bounds the solver at `O(blocks × lattice height)` merges.
pub trait Analysis {
    /// The lattice element attached to each block boundary
    type Fact: Clone + PartialEq;

    fn direction(&self) -> Direction;

    /// The identity element of `join_into`
    fn bottom(&self) -> Self::Fact;

    /// The fact seeded at the designated entry (the entry block for a
    /// forward analysis, the exit block for a backward one)
    fn boundary(&self) -> Self::Fact;

    /// Merge `from` into `acc`
    fn join_into(&self, acc: &mut Self::Fact, from: &Self::Fact);

    /// Propagate `fact` through the whole block, in direction order
    fn transfer_block(&self, id: BlockId, block: &BasicBlock, fact: &mut Self::Fact);
}

/// Per-block facts computed by [`solve`], indexed by block index.
///
/// `start` is the fact flowing into the block and `finish` the fact flowing
/// out of it, both in *direction* order: for a backward analysis `start` is
/// the state at the end of the block and `finish` the state at its head.
pub struct FlowResult<F> {
    pub start: Vec<F>,
    pub finish: Vec<F>,
}

/// Run `analysis` to its fixed point over `func`'s CFG.
///
/// Blocks are visited in the direction's topological order with per-block
/// dirty flags; a block's flag is cleared before its step so that a self-loop
/// which changes its own input is revisited. The scratch fact is reused
/// across iterations (`clone_from`) rather than reallocated.
pub fn solve<A: Analysis>(func: &Function, analysis: &A) -> FlowResult<A::Fact> {
    let num_blocks = func.blocks.len();
    let (order, entry) = match analysis.direction() {
        Direction::Forward => (func.forward_order(), BlockId::ENTRY),
        Direction::Backward => (func.backward_order(), func.exit_block_id()),
    };
    let succs = func.successor_lists();
    let preds = func.predecessor_lists();
    let (flow_preds, flow_succs) = match analysis.direction() {
        Direction::Forward => (&preds, &succs),
        Direction::Backward => (&succs, &preds),
    };

    let bottom = analysis.bottom();
    let mut start: Vec<A::Fact> = (0..num_blocks).map(|_| bottom.clone()).collect();
    let mut finish: Vec<A::Fact> = (0..num_blocks).map(|_| bottom.clone()).collect();
    start[entry.index()] = analysis.boundary();

    let mut dirty = vec![false; num_blocks];
    for b in &order {
        dirty[b.index()] = true;
    }

    let mut scratch = analysis.bottom();
    loop {
        let mut progressed = false;
        for &b in &order {
            let bi = b.index();
            if !dirty[bi] {
                continue;
            }
            progressed = true;
            // Cleared before the step: a self-loop that changes this block's
            // output must re-dirty it for the next sweep.
            dirty[bi] = false;

            if b == entry {
                scratch.clone_from(&start[bi]);
            } else {
                scratch.clone_from(&bottom);
            }
            for p in &flow_preds[bi] {
                analysis.join_into(&mut scratch, &finish[p.index()]);
            }
            if b != entry {
                start[bi].clone_from(&scratch);
            }

            analysis.transfer_block(b, func.block(b), &mut scratch);

            if scratch != finish[bi] {
                finish[bi].clone_from(&scratch);
                for s in &flow_succs[bi] {
                    dirty[s.index()] = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }

    FlowResult { start, finish }
}

/// Join operation of a set-valued analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// May-analysis: a fact holds if it holds on some path
    Union,
    /// Must-analysis: a fact holds only if it holds on every path
    Intersection,
}

/// The effect of one or more commands on a set-valued fact.
///
/// Generating an element cancels a pending kill of it and vice versa, so an
/// accumulator composes correctly when commands are replayed into it in
/// direction order; the two sets are disjoint by construction, which the
/// block transfer `set := (set ∪ gen) \ kill` relies on.
#[derive(Debug, Clone)]
pub struct GenKill<T> {
    gens: FxHashSet<T>,
    kills: FxHashSet<T>,
}

impl<T: Copy + Eq + Hash> GenKill<T> {
    pub fn new() -> Self {
        Self {
            gens: FxHashSet::default(),
            kills: FxHashSet::default(),
        }
    }

    /// Record that the element is generated
    pub fn gen(&mut self, x: T) {
        self.kills.remove(&x);
        self.gens.insert(x);
    }

    /// Record that the element is killed
    pub fn kill(&mut self, x: T) {
        self.gens.remove(&x);
        self.kills.insert(x);
    }

    /// Apply `set := (set ∪ gen) \ kill`
    pub fn apply_to(&self, set: &mut FxHashSet<T>) {
        for x in &self.gens {
            set.insert(*x);
        }
        for x in &self.kills {
            set.remove(x);
        }
    }

    pub fn clear(&mut self) {
        self.gens.clear();
        self.kills.clear();
    }
}

impl<T: Copy + Eq + Hash> Default for GenKill<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A set-valued analysis described one command at a time
pub trait SetAnalysis {
    /// Set element (var-ids, definition-ids, ...)
    type Elem: Copy + Eq + Hash;

    fn direction(&self) -> Direction;

    fn op(&self) -> SetOp;

    /// The identity element of an `Intersection` analysis (the full
    /// universe). Unused for `Union`.
    fn universe(&self) -> FxHashSet<Self::Elem> {
        FxHashSet::default()
    }

    /// The set seeded at the designated entry
    fn boundary(&self) -> FxHashSet<Self::Elem>;

    /// Record the command's gen/kill effect
    fn transfer(&self, block: BlockId, cmd_index: usize, cmd: &Cmd, gk: &mut GenKill<Self::Elem>);
}

/// Per-command sets computed by [`solve_sets`].
///
/// Both fields are in *program* order regardless of the analysis direction:
/// `before[i]` is the set at the point immediately before command `i`, and
/// `after_last` the set at the point after the block's last command (for a
/// backward analysis that is the set joined in from the block's successors).
pub struct BlockFlow<T> {
    pub before: Vec<FxHashSet<T>>,
    pub after_last: FxHashSet<T>,
}

struct SetAdapter<'a, A: SetAnalysis> {
    inner: &'a A,
    universe: FxHashSet<A::Elem>,
    summaries: Vec<GenKill<A::Elem>>,
}

impl<A: SetAnalysis> Analysis for SetAdapter<'_, A> {
    type Fact = FxHashSet<A::Elem>;

    fn direction(&self) -> Direction {
        self.inner.direction()
    }

    fn bottom(&self) -> Self::Fact {
        match self.inner.op() {
            SetOp::Union => FxHashSet::default(),
            SetOp::Intersection => self.universe.clone(),
        }
    }

    fn boundary(&self) -> Self::Fact {
        self.inner.boundary()
    }

    fn join_into(&self, acc: &mut Self::Fact, from: &Self::Fact) {
        match self.inner.op() {
            SetOp::Union => acc.extend(from.iter().copied()),
            SetOp::Intersection => acc.retain(|x| from.contains(x)),
        }
    }

    fn transfer_block(&self, id: BlockId, _block: &BasicBlock, fact: &mut Self::Fact) {
        self.summaries[id.index()].apply_to(fact);
    }
}

/// Run a set-valued analysis and expand the block-level fixed point into
/// per-command sets.
///
/// Each block's commands are summarized into a single gen/kill pair once, so
/// the worklist iteration costs one set operation per block visit; the
/// per-command expansion replays the commands one final time.
pub fn solve_sets<A: SetAnalysis>(func: &Function, analysis: &A) -> Vec<BlockFlow<A::Elem>> {
    let universe = match analysis.op() {
        SetOp::Union => FxHashSet::default(),
        SetOp::Intersection => analysis.universe(),
    };

    let summaries: Vec<GenKill<A::Elem>> = func
        .block_ids()
        .map(|id| {
            let block = func.block(id);
            let mut acc = GenKill::new();
            match analysis.direction() {
                Direction::Forward => {
                    for (i, cmd) in block.cmds.iter().enumerate() {
                        analysis.transfer(id, i, cmd, &mut acc);
                    }
                }
                Direction::Backward => {
                    for (i, cmd) in block.cmds.iter().enumerate().rev() {
                        analysis.transfer(id, i, cmd, &mut acc);
                    }
                }
            }
            acc
        })
        .collect();

    let adapter = SetAdapter {
        inner: analysis,
        universe,
        summaries,
    };
    let result = solve(func, &adapter);

    let mut gk = GenKill::new();
    func.block_ids()
        .map(|id| {
            let block = func.block(id);
            let num_cmds = block.cmds.len();
            match analysis.direction() {
                Direction::Forward => {
                    let mut cur = result.start[id.index()].clone();
                    let mut before = Vec::with_capacity(num_cmds);
                    for (i, cmd) in block.cmds.iter().enumerate() {
                        before.push(cur.clone());
                        gk.clear();
                        analysis.transfer(id, i, cmd, &mut gk);
                        gk.apply_to(&mut cur);
                    }
                    BlockFlow {
                        before,
                        after_last: cur,
                    }
                }
                Direction::Backward => {
                    let mut cur = result.start[id.index()].clone();
                    let after_last = cur.clone();
                    let mut before = vec![FxHashSet::default(); num_cmds];
                    for (i, cmd) in block.cmds.iter().enumerate().rev() {
                        gk.clear();
                        analysis.transfer(id, i, cmd, &mut gk);
                        gk.apply_to(&mut cur);
                        before[i] = cur.clone();
                    }
                    BlockFlow { before, after_last }
                }
            }
        })
        .collect()
}
