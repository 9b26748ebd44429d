use std::ops::Range;

use tinyvec::TinyVec;

use crate::{
    block::BlockId,
    effects::Effects,
    opcode::Opcode,
    procedure::Procedure,
    sparse_collection::SparseElement,
    typ::{Type, TypeKind},
    utils::index_set::KeyIndex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NumChildren {
    Zero = 0,
    One,
    Two,
    Three,
    VarArgs,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Value {
    pub(crate) index: usize,
    pub(crate) opcode: Opcode,
    pub(crate) typ: Type,
    pub(crate) num_children: NumChildren,
    pub(crate) data: ValueData,
    pub(crate) owner: Option<BlockId>,
    pub(crate) children: TinyVec<[ValueId; 3]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Ord, PartialOrd)]
pub struct ValueId(pub usize);

impl ValueId {
    pub fn opcode(self, proc: &Procedure) -> Opcode {
        proc.value(self).opcode
    }

    pub fn child(self, proc: &Procedure, index: usize) -> ValueId {
        proc.value(self).children[index]
    }
}

impl From<ValueId> for usize {
    fn from(id: ValueId) -> usize {
        id.0
    }
}

impl From<usize> for ValueId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

impl KeyIndex for ValueId {
    fn index(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v@{}", self.0)
    }
}

impl SparseElement for Value {
    type Id = ValueId;

    fn id(&self) -> Self::Id {
        ValueId(self.index)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.index = id.0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueData {
    None,
    Const32(i32),
    Const64(i64),
    /// Position of the incoming argument.
    Argument(usize),
    MemoryValue {
        offset: i32,
        range: Range<usize>,
    },
    CCallValue(Effects),
    /// The Phi this Upsilon feeds. `None` until the Phi is known.
    Upsilon(Option<ValueId>),
}

impl Value {
    pub(crate) fn new(
        opcode: Opcode,
        typ: Type,
        num_children: NumChildren,
        args: &[ValueId],
        vdata: ValueData,
    ) -> Self {
        Self {
            owner: None,
            index: usize::MAX,
            opcode,
            typ,
            num_children,
            data: vdata,
            children: Self::build_adjacency_list(num_children, args),
        }
    }

    pub(crate) fn build_adjacency_list(
        num_children: NumChildren,
        args: &[ValueId],
    ) -> TinyVec<[ValueId; 3]> {
        match num_children {
            NumChildren::VarArgs => args.iter().copied().collect(),
            _ => {
                assert!(args.len() == num_children as usize);

                let mut children = TinyVec::new();
                for arg in args {
                    children.push(*arg);
                }

                children
            }
        }
    }

    pub fn make_const32(value: i32) -> Self {
        Self::new(
            Opcode::Const32,
            TypeKind::Int32.into(),
            NumChildren::Zero,
            &[],
            ValueData::Const32(value),
        )
    }

    pub fn make_const64(value: i64) -> Self {
        Self::new(
            Opcode::Const64,
            TypeKind::Int64.into(),
            NumChildren::Zero,
            &[],
            ValueData::Const64(value),
        )
    }

    pub fn make_upsilon(value: ValueId, phi: Option<ValueId>) -> Self {
        Self::new(
            Opcode::Upsilon,
            TypeKind::Void.into(),
            NumChildren::One,
            &[value],
            ValueData::Upsilon(phi),
        )
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn typ(&self) -> Type {
        self.typ
    }

    pub fn owner(&self) -> Option<BlockId> {
        self.owner
    }

    pub fn children(&self) -> &[ValueId] {
        &self.children
    }

    pub fn child(&self, index: usize) -> ValueId {
        self.children[index]
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Values that cost nothing to execute and have no effects.
    pub fn is_free(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Const32 | Opcode::Const64 | Opcode::Identity
        )
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.data, ValueData::Const32(_) | ValueData::Const64(_))
    }

    pub fn is_phi(&self) -> bool {
        self.opcode == Opcode::Phi
    }

    pub fn is_terminal(&self) -> bool {
        self.opcode.is_definitely_terminal()
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.data {
            ValueData::Const32(value) => Some(value as i64),
            ValueData::Const64(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_int_of(&self, val: i64) -> bool {
        self.as_int() == Some(val)
    }

    pub fn memory_value(&self) -> Option<(i32, Range<usize>)> {
        match self.data {
            ValueData::MemoryValue { offset, ref range } => Some((offset, range.clone())),
            _ => None,
        }
    }

    /// The Phi fed by this Upsilon.
    pub fn phi(&self) -> Option<ValueId> {
        match self.data {
            ValueData::Upsilon(phi) => phi,
            _ => None,
        }
    }

    pub fn effects(&self) -> Effects {
        let mut result = Effects::none();

        match self.opcode {
            Opcode::Load => {
                if let Some((_offset, range)) = self.memory_value() {
                    result.reads = range;
                }
                result.control_dependent = true;
            }

            Opcode::Store => {
                if let Some((_offset, range)) = self.memory_value() {
                    result.writes = range;
                }
                result.control_dependent = true;
            }

            Opcode::CCall => match self.data {
                ValueData::CCallValue(ref effects) => result = effects.clone(),
                _ => result = Effects::for_call(),
            },

            Opcode::Upsilon => {
                result.writes_local_state = true;
            }

            Opcode::Phi => {
                result.reads_local_state = true;
            }

            Opcode::Jump | Opcode::Branch | Opcode::Return => {
                result.terminal = true;
            }

            _ => (),
        }

        result
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v@{} = {}", self.typ, self.index, self.opcode)?;
        write!(f, "(")?;

        for (i, child) in self.children.iter().enumerate() {
            write!(f, "v@{}", child.0)?;
            if i < self.children.len() - 1 {
                write!(f, ", ")?;
            }
        }

        match self.data {
            ValueData::None | ValueData::CCallValue(_) => {}
            ValueData::Const64(x) => write!(f, "${}", x)?,
            ValueData::Const32(x) => write!(f, "${}", x)?,
            ValueData::Argument(x) => write!(f, "arg{}", x)?,
            ValueData::MemoryValue { offset, .. } => {
                if offset != 0 {
                    write!(f, ", offset = {}", offset)?
                }
            }
            ValueData::Upsilon(x) => match x {
                Some(x) => write!(f, ", ^v@{}", x.0)?,
                None => write!(f, ", ^none")?,
            },
        }

        write!(f, ")")
    }
}
