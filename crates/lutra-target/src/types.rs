// types.rs
//
// Value types of the target stack machine.

use std::fmt;

use smallvec::SmallVec;

use lutra_identity::StructId;

/// Heap type of a typed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapType {
    /// Top of the reference hierarchy.
    Any,
    /// Function references (table element type).
    Func,
    /// A concrete struct type in the lattice.
    Struct(StructId),
}

/// A typed reference: nullability plus heap type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefType {
    pub nullable: bool,
    pub heap: HeapType,
}

impl RefType {
    pub fn non_null(heap: HeapType) -> Self {
        Self {
            nullable: false,
            heap,
        }
    }

    pub fn nullable(heap: HeapType) -> Self {
        Self {
            nullable: true,
            heap,
        }
    }

    pub fn as_non_null(self) -> Self {
        Self {
            nullable: false,
            ..self
        }
    }
}

/// A value type of the target machine. The four number types are unboxed
/// primitives; everything else travels as a typed reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    Ref(RefType),
}

impl ValueType {
    /// True for the unboxed number types.
    #[inline]
    pub fn is_primitive(self) -> bool {
        !matches!(self, ValueType::Ref(_))
    }

    #[inline]
    pub fn as_ref_type(self) -> Option<RefType> {
        match self {
            ValueType::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Nullability of this type; primitives are never nullable.
    #[inline]
    pub fn is_nullable(self) -> bool {
        matches!(self, ValueType::Ref(RefType { nullable: true, .. }))
    }
}

/// SmallVec for signature slots - inline up to 4 (covers receivers plus a
/// few parameters without spilling).
pub type ValueTypeVec = SmallVec<[ValueType; 4]>;

/// A target-level function signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub inputs: ValueTypeVec,
    pub outputs: ValueTypeVec,
}

impl FunctionType {
    pub fn new(inputs: ValueTypeVec, outputs: ValueTypeVec) -> Self {
        Self { inputs, outputs }
    }
}

impl fmt::Display for HeapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapType::Any => write!(f, "any"),
            HeapType::Func => write!(f, "func"),
            HeapType::Struct(id) => write!(f, "struct{}", id.index()),
        }
    }
}

impl fmt::Display for RefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "(ref null {})", self.heap)
        } else {
            write!(f, "(ref {})", self.heap)
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::I32 => write!(f, "i32"),
            ValueType::I64 => write!(f, "i64"),
            ValueType::F32 => write!(f, "f32"),
            ValueType::F64 => write!(f, "f64"),
            ValueType::Ref(r) => write!(f, "{}", r),
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, ty) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, "] -> [")?;
        for (i, ty) in self.outputs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", ty)?;
        }
        write!(f, "]")
    }
}
