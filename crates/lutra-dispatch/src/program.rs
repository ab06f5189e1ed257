// program.rs
//
// Program-side inputs to dispatch table construction: the class
// hierarchy in super-first order, instance members, the dispatchable
// references each member contributes, and the front-end metadata
// (selector ids, call counts, dynamic-call flags, pragmas).

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use lutra_identity::{ClassId, MemberId, ReferenceId, SelectorId, StructId};
use lutra_target::SrcType;

/// Pragma asserting call sites may bypass the table and call the single
/// concrete target directly.
pub const STATIC_DISPATCH_PRAGMA: &str = "static-dispatch";

/// Textual member name of the function-call operator. Members with this
/// name are always reachable from dynamic calls on function values.
pub const CALL_OPERATOR_NAME: &str = "call";

/// One declared parameter of a procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// `None` for positional parameters, the parameter name otherwise.
    pub name: Option<String>,
    pub ty: SrcType,
    /// True when some call sites omit this parameter and the target
    /// detects that through a default-value sentinel.
    pub needs_sentinel: bool,
}

impl Param {
    pub fn positional(ty: SrcType) -> Self {
        Self {
            name: None,
            ty,
            needs_sentinel: false,
        }
    }

    pub fn named(name: &str, ty: SrcType) -> Self {
        Self {
            name: Some(name.to_string()),
            ty,
            needs_sentinel: false,
        }
    }

    pub fn with_sentinel(mut self) -> Self {
        self.needs_sentinel = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcKind {
    Method,
    Getter,
    Setter,
}

/// An instance member is either a field (contributing an implicit getter
/// and, when mutable, an implicit setter) or a procedure (contributing
/// its body and, when torn off, a tear-off thunk).
#[derive(Debug, Clone)]
pub enum MemberKind {
    Field {
        ty: SrcType,
        mutable: bool,
    },
    Procedure {
        kind: ProcKind,
        type_params: u32,
        positional: Vec<Param>,
        named: Vec<Param>,
        /// `None` for setters and procedures without a value result.
        returns: Option<SrcType>,
    },
}

#[derive(Debug, Clone)]
pub struct MemberDef {
    pub name: String,
    pub owner: ClassId,
    pub is_abstract: bool,
    pub kind: MemberKind,
}

/// Which facet of a member a dispatchable reference denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// A procedure's own body.
    Direct,
    /// A field's implicit getter.
    Getter,
    /// A field's implicit setter.
    Setter,
    /// A tear-off thunk returning the bound method as a callable value.
    TearOff,
}

#[derive(Debug, Clone, Copy)]
struct RefData {
    member: MemberId,
    kind: RefKind,
}

#[derive(Debug, Clone, Copy, Default)]
struct MemberRefs {
    direct: Option<ReferenceId>,
    getter: Option<ReferenceId>,
    setter: Option<ReferenceId>,
    tear_off: Option<ReferenceId>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub class_id: ClassId,
    pub superclass: Option<ClassId>,
    pub is_abstract: bool,
    /// True for the synthetic top dispatch class, which has no source
    /// declaration and no members of its own.
    pub synthetic: bool,
    /// The target struct instances of this class lower to.
    pub target_struct: StructId,
    pub members: Vec<MemberId>,
}

/// The closed-world program view the dispatch table is built from.
/// Classes are registered in super-first order; members and their
/// references live in arenas indexed by dense ids.
#[derive(Debug, Clone)]
pub struct Program {
    classes: Vec<ClassInfo>,
    class_positions: FxHashMap<ClassId, usize>,
    members: Vec<MemberDef>,
    member_refs: Vec<MemberRefs>,
    refs: Vec<RefData>,
    max_concrete_class_id: u32,
    intrinsics_base: Option<ClassId>,
    method_missing: Option<MemberId>,
}

impl Program {
    pub fn new(max_concrete_class_id: u32) -> Self {
        Self {
            classes: Vec::new(),
            class_positions: FxHashMap::default(),
            members: Vec::new(),
            member_refs: Vec::new(),
            refs: Vec::new(),
            max_concrete_class_id,
            intrinsics_base: None,
            method_missing: None,
        }
    }

    // ===== Hierarchy registration =====

    pub fn add_class(
        &mut self,
        name: &str,
        class_id: ClassId,
        superclass: Option<ClassId>,
        is_abstract: bool,
        target_struct: StructId,
    ) -> ClassId {
        self.push_class(name, class_id, superclass, is_abstract, false, target_struct)
    }

    /// Register the synthetic top dispatch class. It has no source
    /// declaration; it inherits its superclass's member set unchanged.
    pub fn add_synthetic_class(
        &mut self,
        name: &str,
        class_id: ClassId,
        superclass: Option<ClassId>,
        target_struct: StructId,
    ) -> ClassId {
        self.push_class(name, class_id, superclass, false, true, target_struct)
    }

    fn push_class(
        &mut self,
        name: &str,
        class_id: ClassId,
        superclass: Option<ClassId>,
        is_abstract: bool,
        synthetic: bool,
        target_struct: StructId,
    ) -> ClassId {
        assert!(
            !self.class_positions.contains_key(&class_id),
            "INTERNAL: duplicate class id {}",
            class_id.index()
        );
        if let Some(sup) = superclass {
            assert!(
                self.class_positions.contains_key(&sup),
                "INTERNAL: class {} registered before its superclass",
                name
            );
        }
        self.class_positions.insert(class_id, self.classes.len());
        self.classes.push(ClassInfo {
            name: name.to_string(),
            class_id,
            superclass,
            is_abstract,
            synthetic,
            target_struct,
            members: Vec::new(),
        });
        class_id
    }

    /// Designate the low-level base class whose subtree wraps raw target
    /// types. It does not inherit the root's members, and its own
    /// members are never indexed for dynamic dispatch.
    pub fn set_intrinsics_base(&mut self, class: ClassId) {
        self.intrinsics_base = Some(class);
    }

    /// Designate the root class's dynamic-miss hook.
    pub fn set_method_missing(&mut self, member: MemberId) {
        self.method_missing = Some(member);
    }

    // ===== Member registration =====

    pub fn add_field(&mut self, owner: ClassId, name: &str, ty: SrcType, mutable: bool) -> MemberId {
        let member = self.push_member(MemberDef {
            name: name.to_string(),
            owner,
            is_abstract: false,
            kind: MemberKind::Field { ty, mutable },
        });
        let mut refs = MemberRefs::default();
        refs.getter = Some(self.push_ref(member, RefKind::Getter));
        if mutable {
            refs.setter = Some(self.push_ref(member, RefKind::Setter));
        }
        self.member_refs[member.index() as usize] = refs;
        member
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_procedure(
        &mut self,
        owner: ClassId,
        name: &str,
        kind: ProcKind,
        is_abstract: bool,
        type_params: u32,
        positional: Vec<Param>,
        named: Vec<Param>,
        returns: Option<SrcType>,
    ) -> MemberId {
        let member = self.push_member(MemberDef {
            name: name.to_string(),
            owner,
            is_abstract,
            kind: MemberKind::Procedure {
                kind,
                type_params,
                positional,
                named,
                returns,
            },
        });
        let mut refs = MemberRefs::default();
        refs.direct = Some(self.push_ref(member, RefKind::Direct));
        if kind == ProcKind::Method {
            refs.tear_off = Some(self.push_ref(member, RefKind::TearOff));
        }
        self.member_refs[member.index() as usize] = refs;
        member
    }

    fn push_member(&mut self, def: MemberDef) -> MemberId {
        let owner = def.owner;
        let id = MemberId::new(self.members.len() as u32);
        let position = self.class_positions[&owner];
        assert!(
            !self.classes[position].synthetic,
            "INTERNAL: member added to synthetic class"
        );
        self.classes[position].members.push(id);
        self.members.push(def);
        self.member_refs.push(MemberRefs::default());
        id
    }

    fn push_ref(&mut self, member: MemberId, kind: RefKind) -> ReferenceId {
        let id = ReferenceId::new(self.refs.len() as u32);
        self.refs.push(RefData { member, kind });
        id
    }

    // ===== Hierarchy queries =====

    /// Classes in super-first registration order.
    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[self.class_positions[&id]]
    }

    pub fn class_by_id(&self, id: ClassId) -> Option<&ClassInfo> {
        self.class_positions.get(&id).map(|&p| &self.classes[p])
    }

    pub fn max_concrete_class_id(&self) -> u32 {
        self.max_concrete_class_id
    }

    pub fn intrinsics_base(&self) -> Option<ClassId> {
        self.intrinsics_base
    }

    pub fn method_missing(&self) -> Option<MemberId> {
        self.method_missing
    }

    // ===== Member and reference queries =====

    pub fn member(&self, id: MemberId) -> &MemberDef {
        &self.members[id.index() as usize]
    }

    /// `Class.member` form for diagnostics.
    pub fn qualified_name(&self, id: MemberId) -> String {
        let def = self.member(id);
        format!("{}.{}", self.class(def.owner).name, def.name)
    }

    pub fn member_of(&self, r: ReferenceId) -> MemberId {
        self.refs[r.index() as usize].member
    }

    pub fn ref_kind(&self, r: ReferenceId) -> RefKind {
        self.refs[r.index() as usize].kind
    }

    pub fn enclosing_class(&self, r: ReferenceId) -> ClassId {
        self.member(self.member_of(r)).owner
    }

    pub fn member_name(&self, r: ReferenceId) -> &str {
        &self.member(self.member_of(r)).name
    }

    pub fn getter_ref(&self, m: MemberId) -> Option<ReferenceId> {
        self.member_refs[m.index() as usize].getter
    }

    pub fn setter_ref(&self, m: MemberId) -> Option<ReferenceId> {
        self.member_refs[m.index() as usize].setter
    }

    pub fn direct_ref(&self, m: MemberId) -> Option<ReferenceId> {
        self.member_refs[m.index() as usize].direct
    }

    pub fn tear_off_ref(&self, m: MemberId) -> Option<ReferenceId> {
        self.member_refs[m.index() as usize].tear_off
    }

    /// True if the reference reads a value: a field getter or a getter
    /// procedure's body.
    pub fn is_getter(&self, r: ReferenceId) -> bool {
        match self.ref_kind(r) {
            RefKind::Getter => true,
            RefKind::Direct => matches!(
                self.member(self.member_of(r)).kind,
                MemberKind::Procedure {
                    kind: ProcKind::Getter,
                    ..
                }
            ),
            _ => false,
        }
    }

    pub fn is_setter(&self, r: ReferenceId) -> bool {
        match self.ref_kind(r) {
            RefKind::Setter => true,
            RefKind::Direct => matches!(
                self.member(self.member_of(r)).kind,
                MemberKind::Procedure {
                    kind: ProcKind::Setter,
                    ..
                }
            ),
            _ => false,
        }
    }

    #[inline]
    pub fn is_tear_off(&self, r: ReferenceId) -> bool {
        self.ref_kind(r) == RefKind::TearOff
    }

    pub fn is_abstract_ref(&self, r: ReferenceId) -> bool {
        self.member(self.member_of(r)).is_abstract
    }

    /// The dispatchable references a member contributes to its class:
    /// fields contribute getter plus optional setter; procedures
    /// contribute their body plus a tear-off when the front end saw
    /// tear-off usage.
    pub fn dispatch_refs(
        &self,
        m: MemberId,
        attrs: &MemberAttributes,
    ) -> SmallVec<[ReferenceId; 2]> {
        let refs = &self.member_refs[m.index() as usize];
        let mut out = SmallVec::new();
        match &self.member(m).kind {
            MemberKind::Field { .. } => {
                out.extend(refs.getter);
                out.extend(refs.setter);
            }
            MemberKind::Procedure { kind, .. } => {
                out.extend(refs.direct);
                if *kind == ProcKind::Method && attrs.has_tear_off_uses {
                    out.extend(refs.tear_off);
                }
            }
        }
        out
    }
}

// ===== Front-end metadata =====

/// Dispatch attributes the front end computed for one member.
#[derive(Debug, Clone, Copy)]
pub struct MemberAttributes {
    pub getter_selector_id: SelectorId,
    pub method_or_setter_selector_id: SelectorId,
    pub getter_called_dynamically: bool,
    pub method_or_setter_called_dynamically: bool,
    pub has_tear_off_uses: bool,
    pub has_non_this_uses: bool,
}

impl MemberAttributes {
    /// Attributes with both selector ids set and every flag clear.
    pub fn new(getter_selector_id: SelectorId, method_or_setter_selector_id: SelectorId) -> Self {
        Self {
            getter_selector_id,
            method_or_setter_selector_id,
            getter_called_dynamically: false,
            method_or_setter_called_dynamically: false,
            has_tear_off_uses: false,
            has_non_this_uses: false,
        }
    }
}

/// Per-selector usage counters, indexed by selector id. A zero call
/// count marks the selector statically unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorUsage {
    pub call_count: u32,
}

/// All front-end metadata consumed during table construction.
#[derive(Debug, Clone, Default)]
pub struct ProgramMetadata {
    selector_usage: Vec<SelectorUsage>,
    attributes: FxHashMap<MemberId, MemberAttributes>,
    pragmas: FxHashMap<MemberId, FxHashSet<String>>,
}

impl ProgramMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_call_count(&mut self, selector: SelectorId, count: u32) {
        let index = selector.index() as usize;
        if index >= self.selector_usage.len() {
            self.selector_usage
                .resize(index + 1, SelectorUsage::default());
        }
        self.selector_usage[index].call_count = count;
    }

    pub fn call_count(&self, selector: SelectorId) -> u32 {
        self.selector_usage
            .get(selector.index() as usize)
            .map(|u| u.call_count)
            .unwrap_or(0)
    }

    pub fn set_attributes(&mut self, member: MemberId, attrs: MemberAttributes) {
        self.attributes.insert(member, attrs);
    }

    pub fn attributes(&self, member: MemberId) -> Option<&MemberAttributes> {
        self.attributes.get(&member)
    }

    pub fn add_pragma(&mut self, member: MemberId, key: &str) {
        self.pragmas
            .entry(member)
            .or_default()
            .insert(key.to_string());
    }

    pub fn has_pragma(&self, member: MemberId, key: &str) -> bool {
        self.pragmas
            .get(&member)
            .is_some_and(|set| set.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> (Program, ClassId, MemberId) {
        let mut program = Program::new(0);
        let root = program.add_class("Object", ClassId::new(0), None, false, StructId::new(0));
        let field = program.add_field(root, "size", SrcType::Int, true);
        (program, root, field)
    }

    #[test]
    fn field_contributes_getter_and_setter_refs() {
        let (program, _, field) = sample_program();
        let getter = program.getter_ref(field).unwrap();
        let setter = program.setter_ref(field).unwrap();
        assert!(program.is_getter(getter));
        assert!(program.is_setter(setter));
        assert!(!program.is_setter(getter));
        assert_eq!(program.member_of(getter), field);
    }

    #[test]
    fn getter_procedure_body_is_a_getter() {
        let (mut program, root, _) = sample_program();
        let m = program.add_procedure(
            root,
            "length",
            ProcKind::Getter,
            false,
            0,
            Vec::new(),
            Vec::new(),
            Some(SrcType::Int),
        );
        let direct = program.direct_ref(m).unwrap();
        assert!(program.is_getter(direct));
        assert!(program.tear_off_ref(m).is_none());
    }

    #[test]
    fn tear_off_included_only_when_used() {
        let (mut program, root, _) = sample_program();
        let m = program.add_procedure(
            root,
            "touch",
            ProcKind::Method,
            false,
            0,
            Vec::new(),
            Vec::new(),
            None,
        );
        let mut attrs = MemberAttributes::new(SelectorId::new(0), SelectorId::new(1));
        assert_eq!(program.dispatch_refs(m, &attrs).len(), 1);
        attrs.has_tear_off_uses = true;
        let refs = program.dispatch_refs(m, &attrs);
        assert_eq!(refs.len(), 2);
        assert!(program.is_tear_off(refs[1]));
    }

    #[test]
    fn metadata_defaults() {
        let mut metadata = ProgramMetadata::new();
        assert_eq!(metadata.call_count(SelectorId::new(5)), 0);
        metadata.set_call_count(SelectorId::new(5), 12);
        assert_eq!(metadata.call_count(SelectorId::new(5)), 12);

        let member = MemberId::new(0);
        assert!(!metadata.has_pragma(member, STATIC_DISPATCH_PRAGMA));
        metadata.add_pragma(member, STATIC_DISPATCH_PRAGMA);
        assert!(metadata.has_pragma(member, STATIC_DISPATCH_PRAGMA));
    }

    #[test]
    #[should_panic(expected = "registered before its superclass")]
    fn super_first_order_enforced() {
        let mut program = Program::new(1);
        program.add_class(
            "B",
            ClassId::new(1),
            Some(ClassId::new(0)),
            false,
            StructId::new(1),
        );
    }

    #[test]
    fn qualified_names() {
        let (program, _, field) = sample_program();
        assert_eq!(program.qualified_name(field), "Object.size");
    }
}
