use std::{borrow::Cow, ops::Range, rc::Rc};

use crate::{
    block::{BasicBlock, BlockId},
    dominators::{Dominators, Graph},
    effects::Effects,
    error::{Error, Result},
    natural_loops::NaturalLoops,
    opcode::Opcode,
    sparse_collection::SparseCollection,
    typ::{pointer_type, Type, TypeKind},
    value::{NumChildren, Value, ValueData, ValueId},
};

/// Heap range every load and store touches unless told otherwise.
const WHOLE_HEAP: Range<usize> = 0..usize::MAX;

pub struct Procedure {
    pub(crate) values: SparseCollection<Value>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) dominators: Option<Dominators<Self>>,
    pub(crate) natural_loops: Option<Rc<NaturalLoops<Self>>>,
}

impl Graph for Procedure {
    type Node = BlockId;

    fn node_index(&self, node: Self::Node) -> usize {
        node.0
    }

    fn node(&self, index: usize) -> Option<Self::Node> {
        (index < self.blocks.len()).then_some(BlockId(index))
    }

    fn num_nodes(&self) -> usize {
        self.blocks.len()
    }

    fn root(&self) -> Self::Node {
        BlockId(0)
    }

    fn predecessors(&self, block: Self::Node) -> Cow<[Self::Node]> {
        Cow::Borrowed(self.blocks[block.0].predecessor_list())
    }

    fn successors(&self, block: Self::Node) -> Cow<[Self::Node]> {
        Cow::Borrowed(self.blocks[block.0].successor_list())
    }

    fn display(&self, block: Option<Self::Node>) -> String {
        match block.and_then(|block| self.block(block).name()) {
            Some(name) => name.to_owned(),
            None => block.map_or_else(|| "null".to_owned(), |block| block.to_string()),
        }
    }
}

impl Default for Procedure {
    fn default() -> Self {
        Self::new()
    }
}

impl Procedure {
    pub fn new() -> Self {
        Self {
            values: SparseCollection::new(),
            blocks: Vec::new(),
            dominators: None,
            natural_loops: None,
        }
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId)
    }

    /// Name of the block for diagnostics. Falls back to `BB<n>` for anonymous blocks.
    pub fn block_name(&self, id: BlockId) -> String {
        self.display(Some(id))
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|block| block.name() == Some(name))
            .map(BlockId)
    }

    pub fn add(&mut self, val: Value) -> ValueId {
        self.values.add(val)
    }

    pub fn value(&self, id: ValueId) -> &Value {
        self.values
            .at(id)
            .unwrap_or_else(|| panic!("{:?} not found", id))
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values
            .at_mut(id)
            .unwrap_or_else(|| panic!("{:?} not found", id))
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.values.iter()
    }

    pub fn dominators(&self) -> &Dominators<Self> {
        self.dominators.as_ref().expect("Dominators not computed")
    }

    pub fn dominators_or_compute(&mut self) -> &Dominators<Self> {
        if self.dominators.is_none() {
            self.dominators = Some(Dominators::new(self));
        }

        self.dominators()
    }

    pub fn natural_loops_or_compute(&mut self) -> Rc<NaturalLoops<Self>> {
        if let Some(loops) = &self.natural_loops {
            return loops.clone();
        }

        self.dominators_or_compute();
        let loops = Rc::new(NaturalLoops::new(self, self.dominators()));
        self.natural_loops = Some(loops.clone());
        loops
    }

    pub fn invalidate_cfg(&mut self) {
        self.dominators = None;
        self.natural_loops = None;
    }

    pub fn add_block(&mut self) -> BlockId {
        let block = BasicBlock::new(self.blocks.len(), None);
        self.blocks.push(block);
        BlockId(self.blocks.len() - 1)
    }

    pub fn add_named_block(&mut self, name: impl Into<String>) -> BlockId {
        let block = BasicBlock::new(self.blocks.len(), Some(name.into()));
        self.blocks.push(block);
        BlockId(self.blocks.len() - 1)
    }

    pub fn add_int_constant(&mut self, typ: Type, value: impl Into<i64>) -> ValueId {
        let val = value.into();
        match typ.kind() {
            TypeKind::Int32 => self.add(Value::make_const32(val as i32)),
            TypeKind::Int64 => self.add(Value::make_const64(val)),
            TypeKind::Void => panic!("Invalid type for constant"),
        }
    }

    pub fn add_argument(&mut self, typ: Type, index: usize) -> ValueId {
        self.add(Value::new(
            Opcode::Argument,
            typ,
            NumChildren::Zero,
            &[],
            ValueData::Argument(index),
        ))
    }

    /// Comparisons produce Int32; arithmetic takes the type of its left operand.
    pub fn add_binary(&mut self, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        assert!(opcode.is_binary(), "{} is not a binary opcode", opcode);

        let typ = if opcode.is_comparison() {
            Type::Int32
        } else {
            self.value(lhs).typ()
        };

        self.add(Value::new(
            opcode,
            typ,
            NumChildren::Two,
            &[lhs, rhs],
            ValueData::None,
        ))
    }

    pub fn add_unary(&mut self, opcode: Opcode, child: ValueId) -> ValueId {
        let typ = match opcode {
            Opcode::SExt32 | Opcode::ZExt32 => Type::Int64,
            Opcode::Trunc => Type::Int32,
            Opcode::Identity | Opcode::Neg => self.value(child).typ(),
            _ => panic!("{} is not a unary opcode", opcode),
        };

        self.add(Value::new(
            opcode,
            typ,
            NumChildren::One,
            &[child],
            ValueData::None,
        ))
    }

    pub fn add_phi(&mut self, typ: Type) -> ValueId {
        self.add(Value::new(
            Opcode::Phi,
            typ,
            NumChildren::Zero,
            &[],
            ValueData::None,
        ))
    }

    pub fn add_upsilon(&mut self, value: ValueId, phi: ValueId) -> ValueId {
        self.add(Value::make_upsilon(value, Some(phi)))
    }

    pub fn add_element_address(&mut self, base: ValueId, indices: &[ValueId]) -> ValueId {
        self.add(Value::new(
            Opcode::ElementAddress,
            pointer_type(),
            NumChildren::VarArgs,
            std::iter::once(base)
                .chain(indices.iter().copied())
                .collect::<Vec<_>>()
                .as_slice(),
            ValueData::None,
        ))
    }

    pub fn add_load(&mut self, typ: Type, pointer: ValueId, offset: i32) -> ValueId {
        self.add(Value::new(
            Opcode::Load,
            typ,
            NumChildren::One,
            &[pointer],
            ValueData::MemoryValue {
                offset,
                range: WHOLE_HEAP,
            },
        ))
    }

    pub fn add_store(&mut self, value: ValueId, pointer: ValueId, offset: i32) -> ValueId {
        self.add(Value::new(
            Opcode::Store,
            Type::Void,
            NumChildren::Two,
            &[value, pointer],
            ValueData::MemoryValue {
                offset,
                range: WHOLE_HEAP,
            },
        ))
    }

    pub fn add_ccall(
        &mut self,
        ret: Type,
        callee: ValueId,
        args: &[ValueId],
        effects: Effects,
    ) -> ValueId {
        self.add(Value::new(
            Opcode::CCall,
            ret,
            NumChildren::VarArgs,
            std::iter::once(callee)
                .chain(args.iter().copied())
                .collect::<Vec<_>>()
                .as_slice(),
            ValueData::CCallValue(effects),
        ))
    }

    pub fn add_jump(&mut self) -> ValueId {
        self.add(Value::new(
            Opcode::Jump,
            Type::Void,
            NumChildren::Zero,
            &[],
            ValueData::None,
        ))
    }

    pub fn add_branch(&mut self, val: ValueId) -> ValueId {
        self.add(Value::new(
            Opcode::Branch,
            Type::Void,
            NumChildren::One,
            &[val],
            ValueData::None,
        ))
    }

    pub fn add_return(&mut self, value: Option<ValueId>) -> ValueId {
        let children = value.as_slice();
        self.add(Value::new(
            Opcode::Return,
            Type::Void,
            NumChildren::VarArgs,
            children,
            ValueData::None,
        ))
    }

    pub fn add_to_block(&mut self, block: BlockId, value: ValueId) {
        self.value_mut(value).owner = Some(block);
        self.blocks[block.0].push(value);
    }

    /// Rebuilds every predecessor list from the successor lists.
    pub fn recompute_predecessors(&mut self) {
        for block in self.blocks.iter_mut() {
            block.predecessor_list.clear();
        }

        for index in 0..self.blocks.len() {
            for successor in self.blocks[index].successor_list.clone() {
                self.blocks[successor.0].add_predecessor(BlockId(index));
            }
        }

        self.invalidate_cfg();
    }

    /// Checks the structural rules the analyses rely on: every block ends in exactly one terminal,
    /// the terminal agrees with the successor list, and every Upsilon names a Phi.
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(Error::EmptyProcedure);
        }

        for id in self.block_ids() {
            let block = self.block(id);

            let Some((last, rest)) = block.split_last() else {
                return Err(Error::MissingTerminal { block: id });
            };

            let terminal = self.value(*last);
            if !terminal.is_terminal() {
                return Err(Error::MissingTerminal { block: id });
            }

            if rest.iter().any(|value| self.value(*value).is_terminal()) {
                return Err(Error::MisplacedTerminal { block: id });
            }

            if let Some(expected) = terminal.opcode().num_successors() {
                let found = block.successor_list().len();
                if found != expected {
                    return Err(Error::SuccessorCount {
                        block: id,
                        expected,
                        found,
                    });
                }
            }

            for target in block.successor_list() {
                if target.0 >= self.blocks.len() {
                    return Err(Error::DanglingSuccessor {
                        block: id,
                        target: *target,
                    });
                }
            }

            for value in block.iter().copied() {
                let val = self.value(value);
                if val.opcode() != Opcode::Upsilon {
                    continue;
                }

                let feeds_phi = val
                    .phi()
                    .and_then(|phi| self.values.at(phi))
                    .map_or(false, Value::is_phi);

                if !feeds_phi {
                    return Err(Error::DanglingUpsilon { value });
                }
            }
        }

        Ok(())
    }

    pub fn display_(&self) -> ProcedureDisplay<'_> {
        ProcedureDisplay { procedure: self }
    }
}

pub struct ProcedureDisplay<'a> {
    procedure: &'a Procedure,
}

impl std::fmt::Display for ProcedureDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Procedure {{")?;

        for block in self.procedure.blocks.iter() {
            block.fmt(f, self.procedure)?;
        }

        writeln!(f, "}}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::block::BasicBlockBuilder;

    use super::*;

    #[test]
    fn validate_rejects_missing_terminal() {
        let mut proc = Procedure::new();
        let entry = proc.add_block();
        let mut builder = BasicBlockBuilder::new(&mut proc, entry);
        builder.const32(1);

        assert_eq!(proc.validate(), Err(Error::MissingTerminal { block: entry }));
    }

    #[test]
    fn validate_rejects_empty_procedure() {
        assert_eq!(Procedure::new().validate(), Err(Error::EmptyProcedure));
    }

    #[test]
    fn validate_rejects_branch_with_one_successor() {
        let mut proc = Procedure::new();
        let entry = proc.add_block();
        let exit = proc.add_block();

        let mut builder = BasicBlockBuilder::new(&mut proc, entry);
        let cond = builder.const32(1);
        builder.branch(cond, exit, exit);
        builder.switch_to_block(exit);
        builder.return_(None);

        proc.block_mut(entry).set_successors(exit);

        assert_eq!(
            proc.validate(),
            Err(Error::SuccessorCount {
                block: entry,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn validate_rejects_orphan_upsilon() {
        let mut proc = Procedure::new();
        let entry = proc.add_block();

        let zero = proc.add_int_constant(Type::Int32, 0);
        proc.add_to_block(entry, zero);
        let upsilon = proc.add(Value::make_upsilon(zero, None));
        proc.add_to_block(entry, upsilon);
        let ret = proc.add_return(None);
        proc.add_to_block(entry, ret);

        assert_eq!(
            proc.validate(),
            Err(Error::DanglingUpsilon { value: upsilon })
        );
    }

    #[test]
    fn display_uses_block_names() {
        let mut proc = Procedure::new();
        let entry = proc.add_named_block("entry");
        let mut builder = BasicBlockBuilder::new(&mut proc, entry);
        builder.return_(None);

        assert!(proc.validate().is_ok());
        assert_eq!(proc.block_name(entry), "entry");
        assert_eq!(proc.find_block("entry"), Some(entry));

        let text = proc.display_().to_string();
        assert!(text.contains("BB0: ; entry"));
        assert!(text.contains("Void v@0 = Return()"));
    }
}
