// emit.rs
//
// Table materialization: one function table defined in the main module,
// imported (never re-defined) into every other module that owns a
// target, with element writes per packed slot.

use lutra_target::{FunctionStore, HeapType, ModuleGraph, RefType, TableHandle};

use crate::errors::{DispatchError, DispatchResult};
use crate::program::Program;
use crate::table::DispatchTable;

pub struct TableEmitter<'a> {
    modules: &'a mut ModuleGraph,
    functions: &'a FunctionStore,
}

impl<'a> TableEmitter<'a> {
    pub fn new(modules: &'a mut ModuleGraph, functions: &'a FunctionStore) -> Self {
        Self { modules, functions }
    }

    /// Define the dispatch table in the main module and write every
    /// resolved slot. Slots whose target lives in an unloaded module
    /// stay empty; the corresponding classes cannot have been
    /// instantiated yet, so no call reaches their indices.
    #[tracing::instrument(skip_all)]
    pub fn emit(&mut self, program: &Program, table: &DispatchTable) -> DispatchResult<TableHandle> {
        let main = self.modules.main();
        let elem = RefType::nullable(HeapType::Func);
        let handle = self.modules.define_table(main, table.len() as u32, elem);

        for (index, slot) in table.slots().iter().enumerate() {
            let Some(target) = *slot else { continue };
            let module = self.functions.module_of(target);
            match self.functions.get_existing(target) {
                Some(func) => {
                    let view = if self.modules.is_main(module) {
                        handle
                    } else {
                        self.modules.import_table(module, handle)
                    };
                    self.modules.write_element(view, index as u32, func);
                }
                None => {
                    if self.modules.is_loaded(module) {
                        return Err(DispatchError::UnresolvedTarget {
                            member: program.qualified_name(program.member_of(target)),
                            module: self.modules.module_name(module).to_string(),
                        });
                    }
                }
            }
        }

        tracing::debug!(capacity = table.len(), "defined dispatch table");
        Ok(handle)
    }
}
