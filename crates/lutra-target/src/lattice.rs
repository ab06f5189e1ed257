// lattice.rs
//
// Type lattice: translates front-end types to target value types and
// answers the structural queries (depth, super chain, boxing, top) the
// signature synthesizer joins over.

use rustc_hash::FxHashMap;

use lutra_identity::StructId;

use crate::types::{HeapType, RefType, ValueType};

/// A type as reported by the front end on member signatures. Translation
/// to target value types is the lattice's job; the dispatch core never
/// inspects these beyond handing them to `translate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SrcType {
    /// Unboxed integer.
    Int,
    /// Unboxed float.
    Float,
    /// Unboxed boolean.
    Bool,
    /// An instance of a class, lowered to its target struct.
    Instance { target: StructId, nullable: bool },
    /// A function value (closure), lowered to the closure struct.
    Callable { nullable: bool },
    /// The top type.
    Top { nullable: bool },
}

#[derive(Debug, Clone)]
struct StructDef {
    name: String,
    supertype: Option<StructId>,
    depth: u32,
}

/// The target type lattice. Struct types form a single-inheritance tree
/// rooted at the object struct; unboxed primitives sit outside the tree
/// and enter it through their boxed equivalents.
#[derive(Debug, Clone)]
pub struct TypeLattice {
    structs: Vec<StructDef>,
    boxed: FxHashMap<ValueType, StructId>,
    root: StructId,
    type_rep: StructId,
    closure: StructId,
}

impl TypeLattice {
    pub fn new() -> Self {
        let mut lattice = Self {
            structs: Vec::new(),
            boxed: FxHashMap::default(),
            root: StructId::new(0),
            type_rep: StructId::new(0),
            closure: StructId::new(0),
        };
        lattice.root = lattice.register_struct("object", None);
        lattice.type_rep = lattice.register_struct("type", Some(lattice.root));
        lattice.closure = lattice.register_struct("closure", Some(lattice.root));
        for (prim, name) in [
            (ValueType::I32, "boxed_bool"),
            (ValueType::I64, "boxed_int"),
            (ValueType::F32, "boxed_float32"),
            (ValueType::F64, "boxed_float"),
        ] {
            let id = lattice.register_struct(name, Some(lattice.root));
            lattice.boxed.insert(prim, id);
        }
        lattice
    }

    /// Register a struct type. Depth is one more than the supertype's;
    /// the root has depth 0.
    pub fn register_struct(&mut self, name: &str, supertype: Option<StructId>) -> StructId {
        let depth = match supertype {
            Some(s) => self.structs[s.index() as usize].depth + 1,
            None => 0,
        };
        let id = StructId::new(self.structs.len() as u32);
        self.structs.push(StructDef {
            name: name.to_string(),
            supertype,
            depth,
        });
        id
    }

    pub fn struct_name(&self, id: StructId) -> &str {
        &self.structs[id.index() as usize].name
    }

    pub fn struct_depth(&self, id: StructId) -> u32 {
        self.structs[id.index() as usize].depth
    }

    pub fn super_type_of(&self, id: StructId) -> Option<StructId> {
        self.structs[id.index() as usize].supertype
    }

    /// The root of the struct tree.
    pub fn root_struct(&self) -> StructId {
        self.root
    }

    /// The struct carrying runtime type representations, used for the
    /// type-parameter slots of uniform signatures.
    pub fn type_rep_struct(&self) -> StructId {
        self.type_rep
    }

    /// The struct all function values lower to.
    pub fn closure_struct(&self) -> StructId {
        self.closure
    }

    /// Top of the lattice, nullable variant.
    pub fn top_nullable(&self) -> ValueType {
        ValueType::Ref(RefType::nullable(HeapType::Any))
    }

    /// The boxed struct equivalent of an unboxed primitive.
    ///
    /// Panics if `ty` is not a primitive; callers check `is_primitive`.
    pub fn boxed_struct_for(&self, ty: ValueType) -> StructId {
        *self
            .boxed
            .get(&ty)
            .unwrap_or_else(|| panic!("INTERNAL: no boxed struct for {}", ty))
    }

    /// The instance type of a class struct.
    pub fn instance_type(&self, target: StructId, nullable: bool) -> ValueType {
        ValueType::Ref(RefType {
            nullable,
            heap: HeapType::Struct(target),
        })
    }

    /// Translate a front-end type to its target value type.
    pub fn translate(&self, ty: SrcType) -> ValueType {
        match ty {
            SrcType::Int => ValueType::I64,
            SrcType::Float => ValueType::F64,
            SrcType::Bool => ValueType::I32,
            SrcType::Instance { target, nullable } => self.instance_type(target, nullable),
            SrcType::Callable { nullable } => self.instance_type(self.closure, nullable),
            SrcType::Top { nullable } => ValueType::Ref(RefType {
                nullable,
                heap: HeapType::Any,
            }),
        }
    }

    fn heap_is_subtype(&self, sub: HeapType, sup: HeapType) -> bool {
        match (sub, sup) {
            (_, HeapType::Any) => true,
            (HeapType::Func, HeapType::Func) => true,
            (HeapType::Struct(a), HeapType::Struct(b)) => {
                let mut current = Some(a);
                while let Some(s) = current {
                    if s == b {
                        return true;
                    }
                    current = self.super_type_of(s);
                }
                false
            }
            _ => false,
        }
    }

    /// Structural subtype check. Primitives are subtypes only of
    /// themselves; references are covariant in heap type and may gain
    /// nullability going up.
    pub fn is_subtype(&self, sub: ValueType, sup: ValueType) -> bool {
        match (sub, sup) {
            (ValueType::Ref(a), ValueType::Ref(b)) => {
                (!a.nullable || b.nullable) && self.heap_is_subtype(a.heap, b.heap)
            }
            (a, b) => a == b,
        }
    }
}

impl Default for TypeLattice {
    fn default() -> Self {
        Self::new()
    }
}
