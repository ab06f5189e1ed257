//! Virtual dispatch table construction.
//!
//! Given the closed-world class hierarchy, per-member dispatch metadata,
//! and the target type lattice, this crate groups instance members into
//! selectors, computes class-id ranges and a uniform call signature per
//! selector, packs all dispatch rows into one flat function table via
//! row displacement, and materializes the table into the target module
//! graph. Virtual calls then compile to an indexed call through
//! `table[selector.offset + class_id]`.

pub mod emit;
pub mod errors;
mod packer;
pub mod program;
pub mod ranges;
pub mod selectors;
mod signature;
pub mod table;

pub use emit::TableEmitter;
pub use errors::{DispatchError, DispatchResult};
pub use program::{
    CALL_OPERATOR_NAME, ClassInfo, MemberAttributes, MemberDef, MemberKind, Param, ProcKind,
    Program, ProgramMetadata, RefKind, STATIC_DISPATCH_PRAGMA, SelectorUsage,
};
pub use ranges::{Range, TargetRange};
pub use selectors::{ParamInfo, SelectorInfo, SelectorKind, SelectorRegistry};
pub use table::{DispatchOptions, DispatchTable, DispatchTableBuilder, PackStats};
