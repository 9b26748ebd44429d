use crate::typ::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    /// Polymorphic identity, usable with any value type.
    Identity,

    /// Constants. Constants exist in the control flow, so that we can
    /// reason about where they are materialized.
    Const32,
    Const64,

    /// Incoming procedure argument. Executes at the top of the procedure regardless of where it is
    /// placed in control flow. Array base pointers usually come from here.
    Argument,

    /// Integer math.
    Add,
    Sub,
    Mul,
    Shl,
    Neg,

    /// Takes Int32 and returns Int64:
    SExt32,
    ZExt32,
    /// Bitwise truncation of Int64->Int32.
    Trunc,

    /// Signed comparisons. Return Int32 0 or 1.
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,

    /// Unsigned comparisons. Return Int32 0 or 1.
    Above,
    Below,
    AboveEqual,
    BelowEqual,

    /// SSA form without block arguments. A Phi has no children; each Upsilon sits at the end of a
    /// predecessor block and names the Phi it feeds:
    ///
    /// ```text
    /// BB0:
    ///     Upsilon(@zero, ^phi)
    ///     Jump(BB1)
    /// BB1:
    ///     @phi = Phi()
    /// ```
    Phi,
    Upsilon,

    /// Address of an array element. The first child is the base pointer, the remaining children
    /// are indices. The first index is the pointer-level offset and the last one selects the
    /// element inside the innermost dimension:
    ///
    /// ```text
    /// @addr = ElementAddress(@base, $0, @row, @column)
    /// ```
    ElementAddress,

    /// Memory access. Load takes a pointer, Store takes a value and a pointer.
    Load,
    Store,

    /// Regular C function call. The first child is the callee.
    CCall,

    /// Terminals.
    Jump,
    Branch,
    Return,
}

impl Opcode {
    pub fn is_binary(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Add | Sub
                | Mul
                | Shl
                | Equal
                | NotEqual
                | LessThan
                | GreaterThan
                | LessEqual
                | GreaterEqual
                | Below
                | Above
                | BelowEqual
                | AboveEqual
        )
    }

    pub const fn is_unary(self) -> bool {
        matches!(
            self,
            Self::Identity | Self::Neg | Self::SExt32 | Self::ZExt32 | Self::Trunc
        )
    }

    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal
                | Self::NotEqual
                | Self::LessThan
                | Self::GreaterThan
                | Self::LessEqual
                | Self::GreaterEqual
                | Self::Above
                | Self::Below
                | Self::AboveEqual
                | Self::BelowEqual
        )
    }

    pub const fn is_unsigned_comparison(self) -> bool {
        matches!(
            self,
            Self::Above | Self::Below | Self::AboveEqual | Self::BelowEqual
        )
    }

    pub const fn is_constant(self) -> bool {
        matches!(self, Self::Const32 | Self::Const64)
    }

    pub const fn is_definitely_terminal(self) -> bool {
        matches!(self, Self::Return | Self::Jump | Self::Branch)
    }

    pub const fn is_load(self) -> bool {
        matches!(self, Self::Load)
    }

    pub const fn is_store(self) -> bool {
        matches!(self, Self::Store)
    }

    pub const fn is_memory_access(self) -> bool {
        self.is_load() || self.is_store()
    }

    /// Number of successors a block terminated by this opcode must have.
    pub const fn num_successors(self) -> Option<usize> {
        match self {
            Self::Jump => Some(1),
            Self::Branch => Some(2),
            Self::Return => Some(0),
            _ => None,
        }
    }

    pub const fn invert_opcode(self, typ: Type) -> Option<Opcode> {
        if !typ.is_int() {
            return None;
        }

        match self {
            Self::Equal => Some(Self::NotEqual),
            Self::NotEqual => Some(Self::Equal),
            Self::LessThan => Some(Self::GreaterEqual),
            Self::GreaterThan => Some(Self::LessEqual),
            Self::LessEqual => Some(Self::GreaterThan),
            Self::GreaterEqual => Some(Self::LessThan),
            Self::Above => Some(Self::BelowEqual),
            Self::Below => Some(Self::AboveEqual),
            Self::AboveEqual => Some(Self::Below),
            Self::BelowEqual => Some(Self::Above),
            _ => None,
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
