use std::collections::HashSet;

use tinyvec::TinyVec;

use crate::{
    block::BlockId,
    opcode::Opcode,
    phi_children::PhiChildren,
    procedure::Procedure,
    utils::index_set::{IndexMap, KeyIndex},
    value::ValueId,
};

/// The loop forest of a procedure. Loops live in an arena and refer to each other by [`LoopId`];
/// top-level loops and every list of sub-loops are kept in program order (by header block).
pub struct LoopAnalysis {
    loops: Vec<Loop>,
    top_level: Vec<LoopId>,
    inner_most: IndexMap<LoopId, BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub usize);

impl KeyIndex for LoopId {
    fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for LoopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loop{}", self.0)
    }
}

/// A loop in the control flow graph.
pub struct Loop {
    pub parent: Option<LoopId>,
    /// Header first.
    pub blocks: TinyVec<[BlockId; 4]>,
    pub subloops: Vec<LoopId>,
    pub block_set: HashSet<BlockId>,
}

impl LoopAnalysis {
    /// Builds the forest from the procedure's natural loops.
    pub fn new(proc: &mut Procedure) -> Self {
        let natural_loops = proc.natural_loops_or_compute();

        let mut order: Vec<usize> = (0..natural_loops.num_loops()).collect();
        order.sort_by_key(|index| natural_loops.loop_(*index).header());

        // Natural loop index -> LoopId.
        let mut ids = vec![LoopId(usize::MAX); natural_loops.num_loops()];
        for (position, index) in order.iter().enumerate() {
            ids[*index] = LoopId(position);
        }

        let mut loops = Vec::with_capacity(order.len());
        for index in order.iter().copied() {
            let natural = natural_loops.loop_(index);

            let mut blocks = TinyVec::new();
            blocks.push(natural.header());
            let mut rest: Vec<BlockId> = natural
                .body()
                .iter()
                .copied()
                .filter(|block| *block != natural.header())
                .collect();
            rest.sort();
            blocks.extend(rest);

            loops.push(Loop {
                parent: natural.outer_loop_index().map(|outer| ids[outer]),
                block_set: blocks.iter().copied().collect(),
                blocks,
                subloops: vec![],
            });
        }

        let mut top_level = vec![];
        for id in (0..loops.len()).map(LoopId) {
            match loops[id.0].parent {
                Some(parent) => loops[parent.0].subloops.push(id),
                None => top_level.push(id),
            }
        }

        let mut inner_most = IndexMap::new();
        for block in proc.block_ids() {
            if let Some(natural) = natural_loops.inner_most_loop_of(block) {
                inner_most.insert(block, ids[natural.index()]);
            }
        }

        Self {
            loops,
            top_level,
            inner_most,
        }
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn top_level_loops(&self) -> &[LoopId] {
        &self.top_level
    }

    pub fn at(&self, l: LoopId) -> &Loop {
        &self.loops[l.index()]
    }

    /// Return the nesting level of this loop.  An outer-most loop has depth 1,
    /// for consistency with loop depth values used for basic blocks, where depth
    /// 0 is used for blocks not inside any loops.
    pub fn get_loop_depth(&self, loop_: LoopId) -> usize {
        let mut d = 1;
        let mut cur_loop = self.get_parent(loop_);

        while let Some(loop_) = cur_loop {
            d += 1;
            cur_loop = self.get_parent(loop_);
        }

        d
    }

    pub fn get_header(&self, loop_: LoopId) -> BlockId {
        self.at(loop_).blocks[0]
    }

    /// Return the parent loop if it exists or None for top level loops.
    pub fn get_parent(&self, loop_: LoopId) -> Option<LoopId> {
        self.at(loop_).parent
    }

    /// Innermost loop containing `block`, if any.
    pub fn get_loop_for(&self, block: BlockId) -> Option<LoopId> {
        self.inner_most.get(&block).copied()
    }

    pub fn contains_loop(&self, loop_: LoopId, other: LoopId) -> bool {
        let mut current = Some(other);

        while let Some(l) = current {
            if l == loop_ {
                return true;
            }
            current = self.get_parent(l);
        }

        false
    }

    /// Return true if the specified basic block is in this loop.
    pub fn contains_block(&self, loop_: LoopId, block: BlockId) -> bool {
        self.at(loop_).block_set.contains(&block)
    }

    pub fn contains_value(&self, loop_: LoopId, proc: &Procedure, val: ValueId) -> bool {
        proc.value(val)
            .owner()
            .map_or(false, |owner| self.contains_block(loop_, owner))
    }

    pub fn get_sub_loops(&self, loop_: LoopId) -> &[LoopId] {
        &self.at(loop_).subloops
    }

    /// Return true if the loop does not contain any (natural) loops.
    pub fn is_innermost(&self, loop_: LoopId) -> bool {
        self.get_sub_loops(loop_).is_empty()
    }

    pub fn get_blocks(&self, loop_: LoopId) -> &[BlockId] {
        &self.at(loop_).blocks
    }

    /// True if terminator in the block can branch to another block that is
    /// outside of the current loop.
    pub fn is_loop_exiting(&self, proc: &Procedure, loop_: LoopId, block: BlockId) -> bool {
        proc.block(block)
            .successor_list()
            .iter()
            .any(|succ| !self.contains_block(loop_, *succ))
    }

    pub fn get_exiting_blocks(&self, proc: &Procedure, loop_: LoopId) -> Vec<BlockId> {
        self.get_blocks(loop_)
            .iter()
            .copied()
            .filter(|block| self.is_loop_exiting(proc, loop_, *block))
            .collect()
    }

    /// The only block that leaves the loop, or None when there are several or none.
    pub fn get_exiting_block(&self, proc: &Procedure, loop_: LoopId) -> Option<BlockId> {
        match self.get_exiting_blocks(proc, loop_).as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    pub fn get_loop_latches(&self, proc: &Procedure, loop_: LoopId) -> Vec<BlockId> {
        let header = self.get_header(loop_);

        proc.block(header)
            .predecessor_list()
            .iter()
            .copied()
            .filter(|pred| self.contains_block(loop_, *pred))
            .collect()
    }

    /// The single in-loop predecessor of the header.
    pub fn get_loop_latch(&self, proc: &Procedure, loop_: LoopId) -> Option<BlockId> {
        match self.get_loop_latches(proc, loop_).as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// A loop is rotated when its exit test is not in the header, so the body runs before the
    /// first test.
    pub fn is_rotated(&self, proc: &Procedure, loop_: LoopId) -> bool {
        self.get_exiting_block(proc, loop_) != Some(self.get_header(loop_))
    }

    pub fn get_inner_loops_in_pre_order(&self, loop_: LoopId) -> Vec<LoopId> {
        let mut worklist = Vec::<LoopId>::new();

        worklist.extend(self.get_sub_loops(loop_).iter().rev());
        let mut pre_order_loops = Vec::new();

        while let Some(l) = worklist.pop() {
            // Sub-loops are stored in forward program order, but will process the
            // worklist backwards so append them in reverse order.
            worklist.extend(self.get_sub_loops(l).iter().rev());
            pre_order_loops.push(l);
        }

        pre_order_loops
    }

    pub fn get_loops_in_pre_order(&self, l: LoopId) -> Vec<LoopId> {
        let mut pre_order_loops = vec![l];
        pre_order_loops.extend(self.get_inner_loops_in_pre_order(l));
        pre_order_loops
    }

    /// Diagnostic name: the header block's name, or `BB<n>`.
    pub fn name(&self, proc: &Procedure, loop_: LoopId) -> String {
        proc.block_name(self.get_header(loop_))
    }

    /// The header Phi that starts at zero and steps by one on every trip around the loop:
    ///
    /// ```text
    /// preheader:  Upsilon($0, ^iv)
    /// header:     @iv = Phi()
    /// latch:      @next = Add(@iv, $1)
    ///             Upsilon(@next, ^iv)
    /// ```
    pub fn canonical_induction_variable(
        &self,
        proc: &Procedure,
        phi_children: &PhiChildren,
        loop_: LoopId,
    ) -> Option<ValueId> {
        let header = self.get_header(loop_);

        proc.block(header).iter().copied().find(|value| {
            let phi = proc.value(*value);
            if !phi.is_phi() || !phi.typ().is_int() {
                return false;
            }

            let mut starts = 0;
            let mut steps = 0;

            for (upsilon, incoming) in phi_children.incoming(*value, proc) {
                if self.contains_value(loop_, proc, upsilon) {
                    if is_increment_of(proc, incoming, *value) {
                        steps += 1;
                    } else {
                        return false;
                    }
                } else if proc.value(incoming).is_int_of(0) {
                    starts += 1;
                } else {
                    return false;
                }
            }

            starts == 1 && steps == 1
        })
    }
}

fn is_increment_of(proc: &Procedure, value: ValueId, phi: ValueId) -> bool {
    let value = proc.value(value);
    if value.opcode() != Opcode::Add {
        return false;
    }

    let (lhs, rhs) = (value.child(0), value.child(1));
    (lhs == phi && proc.value(rhs).is_int_of(1)) || (rhs == phi && proc.value(lhs).is_int_of(1))
}
