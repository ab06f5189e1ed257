// signature.rs
//
// Uniform call signatures: one target-level function type per selector,
// joining the signatures of all targets with a structural least upper
// bound in the type lattice. Every packed target is compiled against
// its selector's uniform signature, so call sites need no per-target
// adaptation.

use rustc_hash::FxHashSet;

use lutra_identity::ReferenceId;
use lutra_target::{FunctionType, HeapType, RefType, SrcType, TypeLattice, ValueType, ValueTypeVec};

use crate::program::{MemberKind, Program, RefKind};
use crate::selectors::{SelectorInfo, SelectorKind};

/// Name of the equality operator, whose right-hand slot is forced
/// non-nullable: null never reaches an equality body.
const EQUALS_OPERATOR_NAME: &str = "==";

pub(crate) struct SignatureSynthesizer<'a> {
    program: &'a Program,
    lattice: &'a TypeLattice,
}

impl<'a> SignatureSynthesizer<'a> {
    pub fn new(program: &'a Program, lattice: &'a TypeLattice) -> Self {
        Self { program, lattice }
    }

    /// Compute and store the uniform signature for one selector.
    /// Requires finalized target ranges and parameter info.
    pub fn compute(&self, sel: &mut SelectorInfo) {
        let targets = distinct_targets(sel);
        let info = &sel.param_info;
        let type_params = info.type_param_count() as usize;
        let positional_count = info.positional_count();
        let named: Vec<String> = info.named_names().map(str::to_string).collect();
        let param_slots = positional_count + named.len();

        let mut receiver: Vec<ValueType> = Vec::with_capacity(targets.len());
        let mut params: Vec<Vec<ValueType>> = vec![Vec::new(); param_slots];
        let mut returns: Vec<ValueType> = Vec::new();

        for &target in &targets {
            let owner = self.program.class(self.program.enclosing_class(target));
            receiver.push(self.lattice.instance_type(owner.target_struct, false));
            self.collect_inputs(sel, target, &mut params);
            if sel.kind != SelectorKind::Setter {
                returns.push(self.return_type(target));
            }
        }

        let mut inputs = ValueTypeVec::new();
        inputs.push(self.upper_bound(&receiver, false));
        let type_rep = self
            .lattice
            .instance_type(self.lattice.type_rep_struct(), false);
        for _ in 0..type_params {
            inputs.push(type_rep);
        }
        for slot in 0..positional_count {
            inputs.push(self.upper_bound(&params[slot], info.positional_needs_sentinel(slot)));
        }
        for (rank, name) in named.iter().enumerate() {
            inputs.push(self.upper_bound(
                &params[positional_count + rank],
                info.named_needs_sentinel(name),
            ));
        }

        if sel.name == EQUALS_OPERATOR_NAME {
            let rhs = 1 + type_params;
            if let Some(ValueType::Ref(r)) = inputs.get(rhs).copied() {
                inputs[rhs] = ValueType::Ref(r.as_non_null());
            }
        }

        let mut outputs = ValueTypeVec::new();
        if sel.kind != SelectorKind::Setter {
            outputs.push(self.upper_bound(&returns, false));
        }

        tracing::debug!(
            selector = sel.id.index(),
            targets = targets.len(),
            "synthesized uniform signature"
        );
        sel.set_signature(FunctionType::new(inputs, outputs));
    }

    /// Push the value types a target supplies for each parameter slot.
    /// Getters and tear-offs supply none; setters supply their single
    /// input at slot 0; procedure bodies supply their declared params.
    fn collect_inputs(&self, sel: &SelectorInfo, target: ReferenceId, params: &mut [Vec<ValueType>]) {
        match self.program.ref_kind(target) {
            RefKind::Getter | RefKind::TearOff => {}
            RefKind::Setter => {
                let MemberKind::Field { ty, .. } =
                    &self.program.member(self.program.member_of(target)).kind
                else {
                    panic!("INTERNAL: setter reference on a non-field member");
                };
                params[0].push(self.lattice.translate(*ty));
            }
            RefKind::Direct => {
                let MemberKind::Procedure {
                    positional, named, ..
                } = &self.program.member(self.program.member_of(target)).kind
                else {
                    panic!("INTERNAL: direct reference on a non-procedure member");
                };
                for (slot, param) in positional.iter().enumerate() {
                    params[slot].push(self.lattice.translate(param.ty));
                }
                for param in named {
                    let name = param
                        .name
                        .as_deref()
                        .expect("INTERNAL: named parameter without a name");
                    let slot = sel
                        .param_info
                        .name_index(name)
                        .expect("INTERNAL: named parameter missing from merged schema");
                    params[slot].push(self.lattice.translate(param.ty));
                }
            }
        }
    }

    /// The value a target produces. Targets without a declared result
    /// pad the return slot with the top nullable type.
    fn return_type(&self, target: ReferenceId) -> ValueType {
        match self.program.ref_kind(target) {
            RefKind::TearOff => self
                .lattice
                .translate(SrcType::Callable { nullable: false }),
            RefKind::Getter => {
                let MemberKind::Field { ty, .. } =
                    &self.program.member(self.program.member_of(target)).kind
                else {
                    panic!("INTERNAL: getter reference on a non-field member");
                };
                self.lattice.translate(*ty)
            }
            RefKind::Setter => self.lattice.top_nullable(),
            RefKind::Direct => {
                let MemberKind::Procedure { returns, .. } =
                    &self.program.member(self.program.member_of(target)).kind
                else {
                    panic!("INTERNAL: direct reference on a non-procedure member");
                };
                match returns {
                    Some(ty) => self.lattice.translate(*ty),
                    None => self.lattice.top_nullable(),
                }
            }
        }
    }

    /// Least upper bound of a slot's type set.
    ///
    /// An empty set means no target constrains the slot; call sites
    /// still need a type, so the top nullable reference stands in. A
    /// single unboxed primitive survives as-is unless the slot needs a
    /// default-value sentinel, which only references can carry.
    fn upper_bound(&self, types: &[ValueType], ensure_boxed: bool) -> ValueType {
        let mut set: Vec<ValueType> = Vec::new();
        for &ty in types {
            if !set.contains(&ty) {
                set.push(ty);
            }
        }
        if set.is_empty() {
            return self.lattice.top_nullable();
        }
        if set.len() == 1 && set[0].is_primitive() && !ensure_boxed {
            return set[0];
        }

        let mut nullable = false;
        let mut heaps: Vec<HeapType> = Vec::with_capacity(set.len());
        for ty in set {
            match ty {
                ValueType::Ref(r) => {
                    nullable |= r.nullable;
                    heaps.push(r.heap);
                }
                primitive => {
                    heaps.push(HeapType::Struct(self.lattice.boxed_struct_for(primitive)));
                }
            }
        }
        ValueType::Ref(RefType {
            nullable,
            heap: self.join_heaps(heaps),
        })
    }

    /// Join heap types: equalize struct depths along the super chain,
    /// then walk all in lockstep until one remains. Anything involving
    /// the top heap collapses to it.
    fn join_heaps(&self, heaps: Vec<HeapType>) -> HeapType {
        let mut structs: Vec<_> = Vec::with_capacity(heaps.len());
        for heap in heaps {
            match heap {
                HeapType::Struct(s) if !structs.contains(&s) => structs.push(s),
                HeapType::Struct(_) => {}
                _ => return HeapType::Any,
            }
        }

        let min_depth = structs
            .iter()
            .map(|&s| self.lattice.struct_depth(s))
            .min()
            .expect("INTERNAL: joining an empty heap set");
        for s in structs.iter_mut() {
            while self.lattice.struct_depth(*s) > min_depth {
                *s = self
                    .lattice
                    .super_type_of(*s)
                    .expect("INTERNAL: depth does not match super chain");
            }
        }
        loop {
            let first = structs[0];
            if structs.iter().all(|&s| s == first) {
                return HeapType::Struct(first);
            }
            for s in structs.iter_mut() {
                match self.lattice.super_type_of(*s) {
                    Some(sup) => *s = sup,
                    None => return HeapType::Any,
                }
            }
        }
    }
}

/// Distinct targets of a selector, in range order.
fn distinct_targets(sel: &SelectorInfo) -> Vec<ReferenceId> {
    let mut seen = FxHashSet::default();
    sel.target_ranges()
        .iter()
        .map(|t| t.target)
        .filter(|t| seen.insert(*t))
        .collect()
}
