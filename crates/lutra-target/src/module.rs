// module.rs
//
// Module graph and function store: the collaborators the table emitter
// writes into. The graph records table declarations and element writes
// per module; actual binary serialization happens downstream.

use rustc_hash::FxHashMap;

use lutra_identity::{FuncId, ModuleId, ReferenceId, TableId};

use crate::types::RefType;

/// A table within a specific module's table index space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableHandle {
    pub module: ModuleId,
    pub table: TableId,
}

/// A table declaration in one module: either defined here or an imported
/// view of a table defined elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableDecl {
    Defined { capacity: u32, elem: RefType },
    Imported { source: TableHandle },
}

/// One element-segment entry: `table[index] = func`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementWrite {
    pub table: TableId,
    pub index: u32,
    pub func: FuncId,
}

#[derive(Debug, Clone, Default)]
struct TargetModule {
    name: String,
    loaded: bool,
    tables: Vec<TableDecl>,
    import_lookup: FxHashMap<TableHandle, TableId>,
    elements: Vec<ElementWrite>,
}

/// All modules of one compilation. The main module always exists and is
/// always loaded; secondary modules may be deferred.
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    modules: Vec<TargetModule>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self {
            modules: vec![TargetModule {
                name: "main".to_string(),
                loaded: true,
                ..TargetModule::default()
            }],
        }
    }

    pub fn main(&self) -> ModuleId {
        ModuleId::MAIN
    }

    pub fn add_module(&mut self, name: &str, loaded: bool) -> ModuleId {
        let id = ModuleId::new(self.modules.len() as u32);
        self.modules.push(TargetModule {
            name: name.to_string(),
            loaded,
            ..TargetModule::default()
        });
        id
    }

    pub fn is_main(&self, module: ModuleId) -> bool {
        module.is_main()
    }

    pub fn is_loaded(&self, module: ModuleId) -> bool {
        self.modules[module.index() as usize].loaded
    }

    pub fn module_name(&self, module: ModuleId) -> &str {
        &self.modules[module.index() as usize].name
    }

    /// Define a table in `module`.
    pub fn define_table(&mut self, module: ModuleId, capacity: u32, elem: RefType) -> TableHandle {
        let m = &mut self.modules[module.index() as usize];
        let table = TableId::new(m.tables.len() as u32);
        m.tables.push(TableDecl::Defined { capacity, elem });
        TableHandle { module, table }
    }

    /// Get or create an imported view of `source` inside `module`.
    /// Views are materialized lazily and deduplicated per source.
    pub fn import_table(&mut self, module: ModuleId, source: TableHandle) -> TableHandle {
        assert!(
            module != source.module,
            "INTERNAL: importing a table into its defining module"
        );
        let m = &mut self.modules[module.index() as usize];
        if let Some(table) = m.import_lookup.get(&source) {
            return TableHandle {
                module,
                table: *table,
            };
        }
        let table = TableId::new(m.tables.len() as u32);
        m.tables.push(TableDecl::Imported { source });
        m.import_lookup.insert(source, table);
        TableHandle { module, table }
    }

    /// Record `table[index] = func` in the table's module.
    pub fn write_element(&mut self, handle: TableHandle, index: u32, func: FuncId) {
        self.modules[handle.module.index() as usize]
            .elements
            .push(ElementWrite {
                table: handle.table,
                index,
                func,
            });
    }

    pub fn table(&self, handle: TableHandle) -> &TableDecl {
        &self.modules[handle.module.index() as usize].tables[handle.table.index() as usize]
    }

    pub fn elements(&self, module: ModuleId) -> &[ElementWrite] {
        &self.modules[module.index() as usize].elements
    }
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of compiled function bodies, keyed by the dispatch reference
/// they implement. Also records which module a reference's body belongs
/// to; references never registered default to the main module.
#[derive(Debug, Clone, Default)]
pub struct FunctionStore {
    funcs: FxHashMap<ReferenceId, FuncId>,
    homes: FxHashMap<ReferenceId, ModuleId>,
}

impl FunctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a reference's body to a module without registering a
    /// compiled function (deferred modules).
    pub fn assign_module(&mut self, reference: ReferenceId, module: ModuleId) {
        self.homes.insert(reference, module);
    }

    /// Register the compiled function for a reference.
    pub fn register(&mut self, reference: ReferenceId, module: ModuleId, func: FuncId) {
        self.homes.insert(reference, module);
        self.funcs.insert(reference, func);
    }

    pub fn get_existing(&self, reference: ReferenceId) -> Option<FuncId> {
        self.funcs.get(&reference).copied()
    }

    pub fn module_of(&self, reference: ReferenceId) -> ModuleId {
        self.homes.get(&reference).copied().unwrap_or(ModuleId::MAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeapType;

    fn funcref() -> RefType {
        RefType::nullable(HeapType::Func)
    }

    #[test]
    fn imported_views_are_deduplicated() {
        let mut graph = ModuleGraph::new();
        let aux = graph.add_module("aux", true);
        let defined = graph.define_table(graph.main(), 8, funcref());

        let view1 = graph.import_table(aux, defined);
        let view2 = graph.import_table(aux, defined);
        assert_eq!(view1, view2);
        assert_eq!(
            graph.table(view1),
            &TableDecl::Imported { source: defined }
        );
    }

    #[test]
    fn element_writes_recorded_per_module() {
        let mut graph = ModuleGraph::new();
        let aux = graph.add_module("aux", true);
        let defined = graph.define_table(graph.main(), 4, funcref());
        let view = graph.import_table(aux, defined);

        graph.write_element(defined, 0, FuncId::new(10));
        graph.write_element(view, 2, FuncId::new(11));

        assert_eq!(graph.elements(graph.main()).len(), 1);
        assert_eq!(graph.elements(aux).len(), 1);
        assert_eq!(graph.elements(aux)[0].index, 2);
    }

    #[test]
    fn function_store_defaults_to_main_module() {
        let mut store = FunctionStore::new();
        let r = ReferenceId::new(3);
        assert_eq!(store.module_of(r), ModuleId::MAIN);
        assert_eq!(store.get_existing(r), None);

        let aux = ModuleId::new(1);
        store.register(r, aux, FuncId::new(7));
        assert_eq!(store.module_of(r), aux);
        assert_eq!(store.get_existing(r), Some(FuncId::new(7)));
    }
}
