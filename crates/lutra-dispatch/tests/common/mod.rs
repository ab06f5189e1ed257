//! Shared fixture for dispatch-table integration tests: builds programs,
//! front-end metadata, and a matching lattice with far less ceremony
//! than driving the raw inputs directly.

#![allow(dead_code)]

use rustc_hash::FxHashMap;

use lutra_dispatch::{
    DispatchOptions, DispatchResult, DispatchTable, DispatchTableBuilder, MemberAttributes, Param,
    ProcKind, Program, ProgramMetadata, STATIC_DISPATCH_PRAGMA,
};
use lutra_identity::{ClassId, MemberId, SelectorId};
use lutra_target::{SrcType, TypeLattice};

pub struct Fixture {
    pub lattice: TypeLattice,
    pub program: Program,
    /// Populated by `build()`; valid for post-build queries.
    pub metadata: ProgramMetadata,
    pub options: DispatchOptions,
    attrs: FxHashMap<MemberId, MemberAttributes>,
    counts: FxHashMap<SelectorId, u32>,
    static_pragmas: Vec<MemberId>,
    selector_names: FxHashMap<String, (SelectorId, SelectorId)>,
    next_selector: u32,
}

impl Fixture {
    pub fn new(max_concrete_class_id: u32) -> Self {
        Self {
            lattice: TypeLattice::new(),
            program: Program::new(max_concrete_class_id),
            metadata: ProgramMetadata::new(),
            options: DispatchOptions::default(),
            attrs: FxHashMap::default(),
            counts: FxHashMap::default(),
            static_pragmas: Vec::new(),
            selector_names: FxHashMap::default(),
            next_selector: 0,
        }
    }

    // ===== Classes =====

    pub fn class(&mut self, name: &str, id: u32, superclass: Option<ClassId>) -> ClassId {
        self.push_class(name, id, superclass, false)
    }

    pub fn abstract_class(&mut self, name: &str, id: u32, superclass: Option<ClassId>) -> ClassId {
        self.push_class(name, id, superclass, true)
    }

    pub fn synthetic_class(&mut self, name: &str, id: u32, superclass: Option<ClassId>) -> ClassId {
        let target = self.class_struct(name, superclass);
        self.program
            .add_synthetic_class(name, ClassId::new(id), superclass, target)
    }

    fn push_class(
        &mut self,
        name: &str,
        id: u32,
        superclass: Option<ClassId>,
        is_abstract: bool,
    ) -> ClassId {
        let target = self.class_struct(name, superclass);
        self.program
            .add_class(name, ClassId::new(id), superclass, is_abstract, target)
    }

    fn class_struct(&mut self, name: &str, superclass: Option<ClassId>) -> lutra_identity::StructId {
        let parent = superclass
            .map(|s| self.program.class(s).target_struct)
            .unwrap_or_else(|| self.lattice.root_struct());
        self.lattice.register_struct(name, Some(parent))
    }

    /// The source-level instance type of a fixture class.
    pub fn instance_of(&self, class: ClassId, nullable: bool) -> SrcType {
        SrcType::Instance {
            target: self.program.class(class).target_struct,
            nullable,
        }
    }

    // ===== Selector id assignment (one pair per member name) =====

    fn selector_pair(&mut self, name: &str) -> (SelectorId, SelectorId) {
        if let Some(pair) = self.selector_names.get(name) {
            return *pair;
        }
        let pair = (
            SelectorId::new(self.next_selector),
            SelectorId::new(self.next_selector + 1),
        );
        self.next_selector += 2;
        self.selector_names.insert(name.to_string(), pair);
        pair
    }

    pub fn getter_selector(&self, name: &str) -> SelectorId {
        self.selector_names[name].0
    }

    pub fn method_selector(&self, name: &str) -> SelectorId {
        self.selector_names[name].1
    }

    // ===== Members =====

    pub fn method(&mut self, class: ClassId, name: &str) -> MemberId {
        self.procedure(
            class,
            name,
            ProcKind::Method,
            false,
            0,
            Vec::new(),
            Vec::new(),
            Some(SrcType::Int),
        )
    }

    pub fn abstract_method(&mut self, class: ClassId, name: &str) -> MemberId {
        self.procedure(
            class,
            name,
            ProcKind::Method,
            true,
            0,
            Vec::new(),
            Vec::new(),
            Some(SrcType::Int),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn procedure(
        &mut self,
        class: ClassId,
        name: &str,
        kind: ProcKind,
        is_abstract: bool,
        type_params: u32,
        positional: Vec<Param>,
        named: Vec<Param>,
        returns: Option<SrcType>,
    ) -> MemberId {
        let (getter, method_or_setter) = self.selector_pair(name);
        let member = self.program.add_procedure(
            class,
            name,
            kind,
            is_abstract,
            type_params,
            positional,
            named,
            returns,
        );
        self.attrs
            .insert(member, MemberAttributes::new(getter, method_or_setter));
        member
    }

    pub fn field(&mut self, class: ClassId, name: &str, ty: SrcType, mutable: bool) -> MemberId {
        let (getter, method_or_setter) = self.selector_pair(name);
        let member = self.program.add_field(class, name, ty, mutable);
        self.attrs
            .insert(member, MemberAttributes::new(getter, method_or_setter));
        member
    }

    // ===== Metadata knobs =====

    pub fn set_call_count(&mut self, selector: SelectorId, count: u32) {
        self.counts.insert(selector, count);
    }

    pub fn call_method(&mut self, name: &str, count: u32) {
        let selector = self.method_selector(name);
        self.set_call_count(selector, count);
    }

    pub fn call_getter(&mut self, name: &str, count: u32) {
        let selector = self.getter_selector(name);
        self.set_call_count(selector, count);
    }

    fn attrs_mut(&mut self, member: MemberId) -> &mut MemberAttributes {
        self.attrs
            .get_mut(&member)
            .expect("member registered through the fixture")
    }

    pub fn mark_dynamic(&mut self, member: MemberId) {
        let attrs = self.attrs_mut(member);
        attrs.getter_called_dynamically = true;
        attrs.method_or_setter_called_dynamically = true;
    }

    pub fn mark_tear_off(&mut self, member: MemberId) {
        self.attrs_mut(member).has_tear_off_uses = true;
    }

    pub fn mark_non_this(&mut self, member: MemberId) {
        self.attrs_mut(member).has_non_this_uses = true;
    }

    pub fn pragma_static(&mut self, member: MemberId) {
        self.static_pragmas.push(member);
    }

    pub fn member_attrs(&self, member: MemberId) -> &MemberAttributes {
        &self.attrs[&member]
    }

    // ===== Build =====

    pub fn build(&mut self) -> DispatchResult<DispatchTable> {
        let mut metadata = ProgramMetadata::new();
        for (&member, &attrs) in &self.attrs {
            metadata.set_attributes(member, attrs);
        }
        for (&selector, &count) in &self.counts {
            metadata.set_call_count(selector, count);
        }
        for &member in &self.static_pragmas {
            metadata.add_pragma(member, STATIC_DISPATCH_PRAGMA);
        }
        self.metadata = metadata;
        DispatchTableBuilder::new(&self.program, &self.metadata, &self.lattice)
            .with_options(self.options)
            .build()
    }
}
