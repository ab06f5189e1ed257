// selectors.rs
//
// Selector interning and merging. A selector is the override-equivalence
// class of members sharing a front-end-assigned id; every dispatchable
// reference to a member resolves to exactly one selector.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use lutra_identity::{ReferenceId, SelectorId};
use lutra_target::FunctionType;

use crate::errors::{DispatchError, DispatchResult};
use crate::program::{CALL_OPERATOR_NAME, MemberKind, Program, ProgramMetadata, RefKind};
use crate::ranges::TargetRange;

/// Normalized parameter schema for a selector, merged across all of its
/// targets. Named parameters are kept sorted by name; their slot indices
/// follow the positional slots in that order.
#[derive(Debug, Clone, Default)]
pub struct ParamInfo {
    type_param_count: u32,
    /// Per positional slot: does any target need a default-value
    /// sentinel here?
    positional: Vec<bool>,
    named: BTreeMap<String, bool>,
}

impl ParamInfo {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The schema of an implicit setter: one positional slot.
    pub fn setter() -> Self {
        Self {
            type_param_count: 0,
            positional: vec![false],
            named: BTreeMap::new(),
        }
    }

    /// The schema a single reference contributes before merging.
    /// Getters and tear-offs take no arguments beyond the receiver.
    pub fn for_reference(program: &Program, r: ReferenceId) -> Self {
        if program.is_tear_off(r) {
            return Self::empty();
        }
        match program.ref_kind(r) {
            RefKind::Getter => Self::empty(),
            RefKind::Setter => Self::setter(),
            _ => match &program.member(program.member_of(r)).kind {
                MemberKind::Field { .. } => Self::empty(),
                MemberKind::Procedure {
                    type_params,
                    positional,
                    named,
                    ..
                } => Self {
                    type_param_count: *type_params,
                    positional: positional.iter().map(|p| p.needs_sentinel).collect(),
                    named: named
                        .iter()
                        .map(|p| {
                            let name = p
                                .name
                                .clone()
                                .expect("INTERNAL: named parameter without a name");
                            (name, p.needs_sentinel)
                        })
                        .collect(),
                },
            },
        }
    }

    pub fn type_param_count(&self) -> u32 {
        self.type_param_count
    }

    pub fn positional_count(&self) -> usize {
        self.positional.len()
    }

    pub fn named_count(&self) -> usize {
        self.named.len()
    }

    /// Positional plus named slots.
    pub fn param_slot_count(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// Slot index of a named parameter: after all positionals, in
    /// sorted name order. Recomputed on demand so merges that widen the
    /// positional arity keep indices consistent.
    pub fn name_index(&self, name: &str) -> Option<usize> {
        self.named
            .keys()
            .position(|n| n == name)
            .map(|rank| self.positional.len() + rank)
    }

    pub fn named_names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }

    pub fn positional_needs_sentinel(&self, slot: usize) -> bool {
        self.positional.get(slot).copied().unwrap_or(false)
    }

    pub fn named_needs_sentinel(&self, name: &str) -> bool {
        self.named.get(name).copied().unwrap_or(false)
    }

    /// Widen arities and union the name map; a slot's sentinel flag
    /// becomes true if any target requires one there.
    pub fn merge(&mut self, other: &ParamInfo) {
        self.type_param_count = self.type_param_count.max(other.type_param_count);
        for (slot, &flag) in other.positional.iter().enumerate() {
            if slot < self.positional.len() {
                self.positional[slot] |= flag;
            } else {
                self.positional.push(flag);
            }
        }
        for (name, &flag) in &other.named {
            *self.named.entry(name.clone()).or_insert(false) |= flag;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Method,
    Getter,
    Setter,
}

/// One dispatch selector: its merged parameter schema, usage flags, and
/// (after finalization) target ranges, signature, and table offset.
#[derive(Debug, Clone)]
pub struct SelectorInfo {
    pub id: SelectorId,
    pub name: String,
    pub kind: SelectorKind,
    pub call_count: u32,
    pub param_info: ParamInfo,
    pub has_tear_off_uses: bool,
    pub has_non_this_uses: bool,
    /// True for the selector of the root class's dynamic-miss hook.
    /// Such selectors stay in the table even with a zero call count
    /// because dynamic-call lowering synthesizes calls to them later.
    pub is_method_missing: bool,
    pub(crate) target_ranges: Vec<TargetRange>,
    pub(crate) static_dispatch_ranges: Vec<TargetRange>,
    pub(crate) concrete_classes: u32,
    pub(crate) signature: Option<FunctionType>,
    pub(crate) offset: Option<i32>,
}

impl SelectorInfo {
    /// Class-id ranges to targets, ascending, disjoint, maximal.
    pub fn target_ranges(&self) -> &[TargetRange] {
        &self.target_ranges
    }

    /// The subset of ranges whose calls may bypass the table.
    pub fn static_dispatch_ranges(&self) -> &[TargetRange] {
        &self.static_dispatch_ranges
    }

    /// Number of concrete classes providing this selector.
    pub fn concrete_classes(&self) -> u32 {
        self.concrete_classes
    }

    /// The uniform call signature. Available only after `build()`.
    pub fn signature(&self) -> &FunctionType {
        self.signature
            .as_ref()
            .unwrap_or_else(|| panic!("INTERNAL: signature of selector {} read before build", self.id.index()))
    }

    /// Table offset, set only for selectors packed into the table.
    pub fn offset(&self) -> Option<i32> {
        self.offset
    }

    /// True when every range is statically dispatched and virtual calls
    /// never consult the table.
    pub fn is_fully_static(&self) -> bool {
        self.static_dispatch_ranges.len() == self.target_ranges.len()
    }

    pub(crate) fn set_signature(&mut self, signature: FunctionType) {
        assert!(
            self.signature.is_none(),
            "INTERNAL: signature of selector {} computed twice",
            self.id.index()
        );
        self.signature = Some(signature);
    }
}

/// Derive the selector id a reference dispatches under: the getter
/// selector for getters and tear-offs, the method-or-setter selector
/// otherwise. Fails when the member has no front-end metadata.
pub(crate) fn selector_id_for(
    program: &Program,
    metadata: &ProgramMetadata,
    r: ReferenceId,
) -> DispatchResult<SelectorId> {
    let member = program.member_of(r);
    let attrs = metadata
        .attributes(member)
        .ok_or_else(|| DispatchError::MissingMetadata {
            member: program.qualified_name(member),
        })?;
    if program.is_getter(r) || program.is_tear_off(r) {
        Ok(attrs.getter_selector_id)
    } else {
        Ok(attrs.method_or_setter_selector_id)
    }
}

/// Interns selectors by id and indexes dynamically callable ones by
/// member name for dynamic-call lowering.
#[derive(Debug, Default)]
pub struct SelectorRegistry {
    selectors: FxHashMap<SelectorId, SelectorInfo>,
    dynamic_getters: FxHashMap<String, Vec<SelectorId>>,
    dynamic_setters: FxHashMap<String, Vec<SelectorId>>,
    dynamic_methods: FxHashMap<String, Vec<SelectorId>>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern the selector for `r`, creating it on first sight and
    /// merging the target's parameter schema and usage flags otherwise.
    pub fn get_or_create(
        &mut self,
        program: &Program,
        metadata: &ProgramMetadata,
        r: ReferenceId,
    ) -> DispatchResult<SelectorId> {
        let member = program.member_of(r);
        let attrs = *metadata
            .attributes(member)
            .ok_or_else(|| DispatchError::MissingMetadata {
                member: program.qualified_name(member),
            })?;
        let id = selector_id_for(program, metadata, r)?;
        let is_setter_target = program.is_setter(r);
        let name = program.member_name(r).to_string();

        match self.selectors.get_mut(&id) {
            Some(sel) => {
                if (sel.kind == SelectorKind::Setter) != is_setter_target {
                    return Err(DispatchError::SetterDisagreement {
                        selector: id.index(),
                        member: program.qualified_name(member),
                    });
                }
                sel.param_info.merge(&ParamInfo::for_reference(program, r));
                sel.has_tear_off_uses |= attrs.has_tear_off_uses;
                sel.has_non_this_uses |= attrs.has_non_this_uses;
                sel.is_method_missing |= program.method_missing() == Some(member);
            }
            None => {
                let kind = if program.is_getter(r) || program.is_tear_off(r) {
                    SelectorKind::Getter
                } else if is_setter_target {
                    SelectorKind::Setter
                } else {
                    SelectorKind::Method
                };
                tracing::debug!(
                    selector = id.index(),
                    name = %name,
                    ?kind,
                    "created selector"
                );
                self.selectors.insert(
                    id,
                    SelectorInfo {
                        id,
                        name: name.clone(),
                        kind,
                        call_count: metadata.call_count(id),
                        param_info: ParamInfo::for_reference(program, r),
                        has_tear_off_uses: attrs.has_tear_off_uses,
                        has_non_this_uses: attrs.has_non_this_uses,
                        is_method_missing: program.method_missing() == Some(member),
                        target_ranges: Vec::new(),
                        static_dispatch_ranges: Vec::new(),
                        concrete_classes: 0,
                        signature: None,
                        offset: None,
                    },
                );
            }
        }

        self.index_dynamic_target(program, r, &attrs, &name, id);
        Ok(id)
    }

    /// Index a target for dynamic dispatch when its member is marked
    /// dynamically callable (or is the call operator) and its class is
    /// not the intrinsics base.
    fn index_dynamic_target(
        &mut self,
        program: &Program,
        r: ReferenceId,
        attrs: &crate::program::MemberAttributes,
        name: &str,
        id: SelectorId,
    ) {
        let owner = program.enclosing_class(r);
        if program.intrinsics_base() == Some(owner) {
            return;
        }
        let called_dynamically = attrs.getter_called_dynamically
            || attrs.method_or_setter_called_dynamically
            || name == CALL_OPERATOR_NAME;
        if !called_dynamically {
            return;
        }
        let map = if program.is_getter(r) || program.is_tear_off(r) {
            &mut self.dynamic_getters
        } else if program.is_setter(r) {
            &mut self.dynamic_setters
        } else {
            &mut self.dynamic_methods
        };
        let ids = map.entry(name.to_string()).or_default();
        if let Err(at) = ids.binary_search(&id) {
            ids.insert(at, id);
        }
    }

    /// Lookup-only variant of `get_or_create`.
    pub fn selector_for_target(
        &self,
        program: &Program,
        metadata: &ProgramMetadata,
        r: ReferenceId,
    ) -> DispatchResult<&SelectorInfo> {
        let id = selector_id_for(program, metadata, r)?;
        self.selectors
            .get(&id)
            .ok_or_else(|| DispatchError::UnknownSelector {
                member: program.qualified_name(program.member_of(r)),
            })
    }

    pub fn get(&self, id: SelectorId) -> Option<&SelectorInfo> {
        self.selectors.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: SelectorId) -> &mut SelectorInfo {
        self.selectors
            .get_mut(&id)
            .unwrap_or_else(|| panic!("INTERNAL: unknown selector {}", id.index()))
    }

    /// All interned selector ids, ascending.
    pub fn ids_sorted(&self) -> Vec<SelectorId> {
        let mut ids: Vec<SelectorId> = self.selectors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn dynamic_getter_selectors(&self, name: &str) -> &[SelectorId] {
        self.dynamic_getters.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn dynamic_setter_selectors(&self, name: &str) -> &[SelectorId] {
        self.dynamic_setters.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn dynamic_method_selectors(&self, name: &str) -> &[SelectorId] {
        self.dynamic_methods.get(name).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        FxHashMap<SelectorId, SelectorInfo>,
        FxHashMap<String, Vec<SelectorId>>,
        FxHashMap<String, Vec<SelectorId>>,
        FxHashMap<String, Vec<SelectorId>>,
    ) {
        (
            self.selectors,
            self.dynamic_getters,
            self.dynamic_setters,
            self.dynamic_methods,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lutra_identity::{ClassId, StructId};
    use lutra_target::SrcType;

    use crate::program::{MemberAttributes, Param, ProcKind};

    #[test]
    fn merge_widens_and_ors() {
        let mut a = ParamInfo {
            type_param_count: 0,
            positional: vec![false],
            named: BTreeMap::from([("scale".to_string(), false)]),
        };
        let b = ParamInfo {
            type_param_count: 1,
            positional: vec![true, false],
            named: BTreeMap::from([("offset".to_string(), true)]),
        };
        a.merge(&b);
        assert_eq!(a.type_param_count(), 1);
        assert_eq!(a.positional_count(), 2);
        assert!(a.positional_needs_sentinel(0));
        assert!(!a.positional_needs_sentinel(1));
        assert_eq!(a.named_count(), 2);
        assert!(a.named_needs_sentinel("offset"));
        assert!(!a.named_needs_sentinel("scale"));
    }

    #[test]
    fn name_indices_follow_positionals_in_sorted_order() {
        let mut info = ParamInfo {
            type_param_count: 0,
            positional: vec![false, false],
            named: BTreeMap::from([
                ("zoom".to_string(), false),
                ("angle".to_string(), false),
            ]),
        };
        assert_eq!(info.name_index("angle"), Some(2));
        assert_eq!(info.name_index("zoom"), Some(3));
        assert_eq!(info.name_index("missing"), None);

        // widening positionals shifts named indices
        info.merge(&ParamInfo {
            type_param_count: 0,
            positional: vec![false, false, false],
            named: BTreeMap::new(),
        });
        assert_eq!(info.name_index("angle"), Some(3));
    }

    fn single_class_program() -> (Program, ProgramMetadata, ClassId) {
        let mut program = Program::new(0);
        let root = program.add_class("Object", ClassId::new(0), None, false, StructId::new(0));
        (program, ProgramMetadata::new(), root)
    }

    #[test]
    fn missing_metadata_is_an_error() {
        let (mut program, metadata, root) = single_class_program();
        let m = program.add_procedure(
            root,
            "poke",
            ProcKind::Method,
            false,
            0,
            Vec::new(),
            Vec::new(),
            None,
        );
        let r = program.direct_ref(m).unwrap();
        let mut registry = SelectorRegistry::new();
        let err = registry.get_or_create(&program, &metadata, r).unwrap_err();
        assert_eq!(
            err,
            DispatchError::MissingMetadata {
                member: "Object.poke".to_string()
            }
        );
    }

    #[test]
    fn setter_disagreement_detected() {
        let (mut program, mut metadata, root) = single_class_program();
        let setter = program.add_procedure(
            root,
            "width",
            ProcKind::Setter,
            false,
            0,
            vec![Param::positional(SrcType::Int)],
            Vec::new(),
            None,
        );
        let method = program.add_procedure(
            root,
            "resize",
            ProcKind::Method,
            false,
            0,
            Vec::new(),
            Vec::new(),
            None,
        );
        // both members share method-or-setter selector 7
        metadata.set_attributes(
            setter,
            MemberAttributes::new(SelectorId::new(6), SelectorId::new(7)),
        );
        metadata.set_attributes(
            method,
            MemberAttributes::new(SelectorId::new(8), SelectorId::new(7)),
        );

        let mut registry = SelectorRegistry::new();
        registry
            .get_or_create(&program, &metadata, program.direct_ref(setter).unwrap())
            .unwrap();
        let err = registry
            .get_or_create(&program, &metadata, program.direct_ref(method).unwrap())
            .unwrap_err();
        assert!(matches!(err, DispatchError::SetterDisagreement { selector: 7, .. }));
    }

    #[test]
    fn call_operator_always_indexed_dynamically() {
        let (mut program, mut metadata, root) = single_class_program();
        let m = program.add_procedure(
            root,
            CALL_OPERATOR_NAME,
            ProcKind::Method,
            false,
            0,
            Vec::new(),
            Vec::new(),
            None,
        );
        metadata.set_attributes(
            m,
            MemberAttributes::new(SelectorId::new(0), SelectorId::new(1)),
        );
        let mut registry = SelectorRegistry::new();
        let id = registry
            .get_or_create(&program, &metadata, program.direct_ref(m).unwrap())
            .unwrap();
        assert_eq!(registry.dynamic_method_selectors(CALL_OPERATOR_NAME), &[id]);
        assert!(registry.dynamic_getter_selectors(CALL_OPERATOR_NAME).is_empty());
    }

    #[test]
    fn lookup_only_variant_requires_prior_creation() {
        let (mut program, mut metadata, root) = single_class_program();
        let m = program.add_procedure(
            root,
            "tick",
            ProcKind::Method,
            false,
            0,
            Vec::new(),
            Vec::new(),
            None,
        );
        metadata.set_attributes(
            m,
            MemberAttributes::new(SelectorId::new(0), SelectorId::new(1)),
        );
        let r = program.direct_ref(m).unwrap();
        let mut registry = SelectorRegistry::new();
        assert!(matches!(
            registry.selector_for_target(&program, &metadata, r),
            Err(DispatchError::UnknownSelector { .. })
        ));
        registry.get_or_create(&program, &metadata, r).unwrap();
        let sel = registry.selector_for_target(&program, &metadata, r).unwrap();
        assert_eq!(sel.kind, SelectorKind::Method);
    }
}
