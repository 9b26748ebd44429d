#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeKind {
    Void,
    Int32,
    Int64,
}

impl Default for TypeKind {
    fn default() -> Self {
        Self::Void
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    kind: TypeKind,
}

#[allow(non_upper_case_globals)]
impl Type {
    pub const Int32: Self = Self::new(TypeKind::Int32);
    pub const Int64: Self = Self::new(TypeKind::Int64);
    pub const Void: Self = Self::new(TypeKind::Void);

    pub const fn new(kind: TypeKind) -> Self {
        Self { kind }
    }

    pub const fn kind(&self) -> TypeKind {
        self.kind
    }

    pub const fn is_int(&self) -> bool {
        match self.kind {
            TypeKind::Int32 | TypeKind::Int64 => true,
            TypeKind::Void => false,
        }
    }

    pub const fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }
}

impl Default for Type {
    fn default() -> Self {
        Type::Void
    }
}

/// Addresses produced by `ElementAddress` and consumed by loads and stores.
pub const fn pointer_type() -> Type {
    #[cfg(target_pointer_width = "64")]
    {
        Type::new(TypeKind::Int64)
    }
    #[cfg(not(target_pointer_width = "64"))]
    {
        Type::new(TypeKind::Int32)
    }
}

pub const fn size_of_type(ty: Type) -> u32 {
    match ty.kind() {
        TypeKind::Void => 0,
        TypeKind::Int32 => 4,
        TypeKind::Int64 => 8,
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            TypeKind::Void => write!(f, "Void"),
            TypeKind::Int32 => write!(f, "Int32"),
            TypeKind::Int64 => write!(f, "Int64"),
        }
    }
}

impl From<TypeKind> for Type {
    fn from(kind: TypeKind) -> Self {
        Type::new(kind)
    }
}
