//! Target-side model for the lutra compiler: value types for the stack
//! machine, the type lattice used to join dispatch signatures, and the
//! module/table collaborators the table emitter writes into.

pub mod lattice;
pub mod module;
pub mod types;

pub use lattice::{SrcType, TypeLattice};
pub use module::{ElementWrite, FunctionStore, ModuleGraph, TableDecl, TableHandle};
pub use types::{FunctionType, HeapType, RefType, ValueType, ValueTypeVec};
