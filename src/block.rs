use std::ops::{Deref, DerefMut};

use crate::{
    effects::Effects,
    opcode::Opcode,
    procedure::Procedure,
    typ::Type,
    utils::index_set::KeyIndex,
    value::ValueId,
};

pub struct BasicBlock {
    pub(crate) index: usize,
    pub(crate) name: Option<String>,
    pub(crate) values: Vec<ValueId>,
    pub(crate) predecessor_list: Vec<BlockId>,
    pub(crate) successor_list: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(index: usize, name: Option<String>) -> Self {
        Self {
            index,
            name,
            values: Vec::new(),
            predecessor_list: Vec::new(),
            successor_list: Vec::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn taken(&self) -> BlockId {
        self.successor_list[0]
    }

    pub fn not_taken(&self) -> BlockId {
        self.successor_list[1]
    }

    pub fn set_successors(&mut self, target: BlockId) {
        self.successor_list.clear();
        self.successor_list.push(target);
    }

    pub fn set_successors2(&mut self, taken: BlockId, not_taken: BlockId) {
        self.successor_list.clear();
        self.successor_list.push(taken);
        self.successor_list.push(not_taken);
    }

    pub fn predecessor_list(&self) -> &Vec<BlockId> {
        &self.predecessor_list
    }

    pub fn successor_list(&self) -> &Vec<BlockId> {
        &self.successor_list
    }

    pub fn add_predecessor(&mut self, predecessor: BlockId) -> bool {
        if self.predecessor_list.contains(&predecessor) {
            false
        } else {
            self.predecessor_list.push(predecessor);
            true
        }
    }

    /// The last value of the block, if it is a terminal.
    pub fn terminal(&self, proc: &Procedure) -> Option<ValueId> {
        self.values
            .last()
            .copied()
            .filter(|value| proc.value(*value).is_terminal())
    }

    /// A block that does nothing but fall into its single successor. Upsilons and free values are
    /// SSA plumbing and do not count as work.
    pub fn is_jump_stub(&self, proc: &Procedure) -> bool {
        let Some((last, rest)) = self.values.split_last() else {
            return false;
        };

        if proc.value(*last).opcode() != Opcode::Jump {
            return false;
        }

        rest.iter().all(|value| {
            let value = proc.value(*value);
            value.is_free() || value.opcode() == Opcode::Upsilon
        })
    }

    pub(crate) fn fmt<W: std::fmt::Write>(&self, f: &mut W, proc: &Procedure) -> std::fmt::Result {
        write!(f, "BB{}:", self.index)?;
        if let Some(name) = &self.name {
            write!(f, " ; {}", name)?;
        }
        writeln!(f)?;

        if !self.predecessor_list.is_empty() {
            write!(f, "  Predecessors: ")?;
            for (i, pred) in self.predecessor_list.iter().enumerate() {
                write!(f, "BB{}", pred.0)?;

                if i < self.predecessor_list.len() - 1 {
                    write!(f, ", ")?;
                }
            }

            writeln!(f)?;
        }

        for value in &self.values {
            writeln!(f, "    {}", proc.value(*value))?;
        }

        if !self.successor_list.is_empty() {
            write!(f, "  Successors: ")?;

            let is_branch = self
                .terminal(proc)
                .map_or(false, |value| proc.value(value).opcode() == Opcode::Branch);

            if is_branch && self.successor_list.len() == 2 {
                write!(f, "Then: BB{}, Else: BB{}", self.taken().0, self.not_taken().0)?;
            } else {
                for (i, succ) in self.successor_list.iter().enumerate() {
                    write!(f, "BB{}", succ.0)?;

                    if i < self.successor_list.len() - 1 {
                        write!(f, ", ")?;
                    }
                }
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

impl Deref for BasicBlock {
    type Target = Vec<ValueId>;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for BasicBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl BlockId {
    pub fn size(self, proc: &Procedure) -> usize {
        proc.block(self).len()
    }

    pub fn predecessor_list(self, proc: &Procedure) -> &[BlockId] {
        proc.block(self).predecessor_list()
    }

    pub fn successor_list(self, proc: &Procedure) -> &[BlockId] {
        proc.block(self).successor_list()
    }
}

impl KeyIndex for BlockId {
    fn index(&self) -> usize {
        self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self(usize::MAX)
    }
}

impl From<BlockId> for usize {
    fn from(x: BlockId) -> usize {
        x.0
    }
}

impl From<usize> for BlockId {
    fn from(x: usize) -> Self {
        BlockId(x)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BB{}", self.0)
    }
}

/// Appends values to the end of `block`. Terminals wire up the CFG edges as they are added.
pub struct BasicBlockBuilder<'a> {
    pub procedure: &'a mut Procedure,
    pub block: BlockId,
}

impl<'a> BasicBlockBuilder<'a> {
    pub fn new(procedure: &'a mut Procedure, block: BlockId) -> Self {
        Self { procedure, block }
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.block = block;
    }

    pub fn append(&mut self, value: ValueId) -> ValueId {
        self.procedure.add_to_block(self.block, value);
        value
    }

    pub fn const32(&mut self, value: i32) -> ValueId {
        let value = self.procedure.add_int_constant(Type::Int32, value);
        self.append(value)
    }

    pub fn const64(&mut self, value: i64) -> ValueId {
        let value = self.procedure.add_int_constant(Type::Int64, value);
        self.append(value)
    }

    pub fn argument(&mut self, index: usize, typ: Type) -> ValueId {
        let value = self.procedure.add_argument(typ, index);
        self.append(value)
    }

    pub fn binary(&mut self, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        let value = self.procedure.add_binary(opcode, lhs, rhs);
        self.append(value)
    }

    pub fn unary(&mut self, opcode: Opcode, child: ValueId) -> ValueId {
        let value = self.procedure.add_unary(opcode, child);
        self.append(value)
    }

    pub fn phi(&mut self, typ: Type) -> ValueId {
        let value = self.procedure.add_phi(typ);
        self.append(value)
    }

    pub fn upsilon(&mut self, value: ValueId, phi: ValueId) -> ValueId {
        let value = self.procedure.add_upsilon(value, phi);
        self.append(value)
    }

    pub fn element_address(&mut self, base: ValueId, indices: &[ValueId]) -> ValueId {
        let value = self.procedure.add_element_address(base, indices);
        self.append(value)
    }

    pub fn load(&mut self, typ: Type, pointer: ValueId) -> ValueId {
        let value = self.procedure.add_load(typ, pointer, 0);
        self.append(value)
    }

    pub fn store(&mut self, value: ValueId, pointer: ValueId) -> ValueId {
        let value = self.procedure.add_store(value, pointer, 0);
        self.append(value)
    }

    pub fn ccall(&mut self, ret: Type, callee: ValueId, args: &[ValueId], effects: Effects) -> ValueId {
        let value = self.procedure.add_ccall(ret, callee, args, effects);
        self.append(value)
    }

    /// With `None` the successor is left for the caller to set.
    pub fn jump(&mut self, to: Option<BlockId>) {
        let val = self.procedure.add_jump();
        self.append(val);
        self.procedure.block_mut(self.block).successor_list.clear();

        if let Some(to) = to {
            self.procedure.block_mut(self.block).set_successors(to);
            self.procedure.block_mut(to).add_predecessor(self.block);
        }
    }

    pub fn branch(&mut self, condition: ValueId, taken: BlockId, not_taken: BlockId) {
        let val = self.procedure.add_branch(condition);
        self.append(val);
        self.procedure
            .block_mut(self.block)
            .set_successors2(taken, not_taken);
        self.procedure.block_mut(taken).add_predecessor(self.block);
        self.procedure.block_mut(not_taken).add_predecessor(self.block);
    }

    pub fn return_(&mut self, value: Option<ValueId>) {
        let val = self.procedure.add_return(value);
        self.append(val);
        self.procedure.block_mut(self.block).successor_list.clear();
    }
}

#[cfg(test)]
mod tests {
    use crate::{opcode::Opcode, procedure::Procedure, typ::Type};

    use super::*;

    #[test]
    fn jump_stub_ignores_ssa_plumbing() {
        let mut proc = Procedure::new();
        let entry = proc.add_named_block("entry");
        let stub = proc.add_named_block("stub");
        let target = proc.add_named_block("target");

        let mut builder = BasicBlockBuilder::new(&mut proc, entry);
        builder.jump(Some(stub));

        builder.switch_to_block(target);
        let phi = builder.phi(Type::Int64);
        builder.return_(None);

        builder.switch_to_block(stub);
        let zero = builder.const64(0);
        builder.upsilon(zero, phi);
        builder.jump(Some(target));

        assert!(proc.block(stub).is_jump_stub(&proc));
        assert!(proc.block(entry).is_jump_stub(&proc));
        assert!(!proc.block(target).is_jump_stub(&proc));
        assert_eq!(proc.block(target).predecessor_list(), &vec![stub]);
    }

    #[test]
    fn work_disqualifies_a_stub() {
        let mut proc = Procedure::new();
        let entry = proc.add_block();
        let exit = proc.add_block();

        let mut builder = BasicBlockBuilder::new(&mut proc, entry);
        let a = builder.argument(0, Type::Int64);
        let b = builder.const64(1);
        builder.binary(Opcode::Add, a, b);
        builder.jump(Some(exit));
        builder.switch_to_block(exit);
        builder.return_(None);

        assert!(!proc.block(entry).is_jump_stub(&proc));
    }
}
