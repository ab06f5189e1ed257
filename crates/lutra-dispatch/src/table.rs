// table.rs
//
// Build orchestration and the immutable dispatch table snapshot.

use rustc_hash::FxHashMap;

use lutra_identity::{ReferenceId, SelectorId};
use lutra_target::TypeLattice;

use crate::errors::DispatchResult;
use crate::packer::RowDisplacementPacker;
use crate::program::{Program, ProgramMetadata};
use crate::ranges::{TargetRange, TargetRangeBuilder};
use crate::selectors::{SelectorInfo, SelectorRegistry, selector_id_for};
use crate::signature::SignatureSynthesizer;

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    /// When set, every range is treated as statically dispatchable;
    /// downstream specialization replaces table calls entirely.
    pub polymorphic_specialization: bool,
}

/// Packing statistics for the finished table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackStats {
    pub capacity: u32,
    pub filled: u32,
    pub holes: u32,
}

/// Builds the dispatch table for one compilation. Consumed by `build()`;
/// downstream phases only ever see the immutable `DispatchTable`.
pub struct DispatchTableBuilder<'a> {
    program: &'a Program,
    metadata: &'a ProgramMetadata,
    lattice: &'a TypeLattice,
    options: DispatchOptions,
}

impl<'a> DispatchTableBuilder<'a> {
    pub fn new(
        program: &'a Program,
        metadata: &'a ProgramMetadata,
        lattice: &'a TypeLattice,
    ) -> Self {
        Self {
            program,
            metadata,
            lattice,
            options: DispatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Run all phases: hierarchy walk, range finalization, signature
    /// synthesis, row-displacement packing.
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> DispatchResult<DispatchTable> {
        let mut registry = SelectorRegistry::new();

        let mut ranges = TargetRangeBuilder::new(self.program, self.metadata);
        ranges.walk(&mut registry)?;
        ranges.finalize(&mut registry, self.options.polymorphic_specialization)?;

        let synthesizer = SignatureSynthesizer::new(self.program, self.lattice);
        for id in registry.ids_sorted() {
            synthesizer.compute(registry.get_mut(id));
        }

        let slots = pack(&mut registry);
        let (selectors, dynamic_getters, dynamic_setters, dynamic_methods) = registry.into_parts();
        let table = DispatchTable {
            selectors,
            dynamic_getters,
            dynamic_setters,
            dynamic_methods,
            table: slots,
        };
        let stats = table.stats();
        tracing::info!(
            capacity = stats.capacity,
            filled = stats.filled,
            holes = stats.holes,
            selectors = table.selectors.len(),
            "packed dispatch table"
        );
        Ok(table)
    }
}

/// A selector joins the packed table when calls can actually reach it
/// through the table: it is polymorphic, called, and not fully bypassed
/// by static dispatch. The method-missing selector always participates
/// because dynamic-call lowering synthesizes calls to it after the
/// table is built.
fn participates(sel: &SelectorInfo) -> bool {
    if sel.target_ranges().is_empty() {
        return false;
    }
    sel.is_method_missing
        || (sel.call_count > 0 && sel.target_ranges().len() > 1 && !sel.is_fully_static())
}

/// Hardest rows first: high-fanout selectors are the most constrained,
/// and among similar fanouts the frequently called ones get the small
/// offsets with the cheaper call encodings.
fn packing_weight(sel: &SelectorInfo) -> u64 {
    sel.concrete_classes() as u64 * 10 + sel.call_count as u64
}

fn pack(registry: &mut SelectorRegistry) -> Vec<Option<ReferenceId>> {
    let mut participating: Vec<(SelectorId, u64)> = registry
        .ids_sorted()
        .into_iter()
        .filter_map(|id| {
            let sel = registry.get(id).expect("INTERNAL: stale selector id");
            participates(sel).then(|| (id, packing_weight(sel)))
        })
        .collect();
    participating.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut packer = RowDisplacementPacker::new();
    for (id, _) in participating {
        let sel = registry.get_mut(id);
        let row = flatten_ranges(sel.target_ranges());
        let offset = packer.place(&row);
        sel.offset = Some(offset);
        tracing::debug!(
            selector = id.index(),
            offset,
            classes = sel.concrete_classes(),
            "placed dispatch row"
        );
    }
    packer.into_table()
}

/// Expand ranges into the per-class `(class_id, target)` row the packer
/// consumes.
fn flatten_ranges(ranges: &[TargetRange]) -> Vec<(u32, ReferenceId)> {
    let mut row = Vec::new();
    for tr in ranges {
        for class_id in tr.range.start..=tr.range.end {
            row.push((class_id, tr.target));
        }
    }
    row
}

/// The finished dispatch table: selectors with ranges, signatures, and
/// offsets, the packed slot array, and the dynamic-dispatch name
/// indices. Immutable; produced once per compilation by `build()`.
#[derive(Debug)]
pub struct DispatchTable {
    selectors: FxHashMap<SelectorId, SelectorInfo>,
    dynamic_getters: FxHashMap<String, Vec<SelectorId>>,
    dynamic_setters: FxHashMap<String, Vec<SelectorId>>,
    dynamic_methods: FxHashMap<String, Vec<SelectorId>>,
    table: Vec<Option<ReferenceId>>,
}

impl DispatchTable {
    pub fn selector(&self, id: SelectorId) -> Option<&SelectorInfo> {
        self.selectors.get(&id)
    }

    /// The selector a reference dispatches under. Fails if the target
    /// was unreachable during the hierarchy walk.
    pub fn selector_for_target(
        &self,
        program: &Program,
        metadata: &ProgramMetadata,
        r: ReferenceId,
    ) -> DispatchResult<&SelectorInfo> {
        let id = selector_id_for(program, metadata, r)?;
        self.selectors
            .get(&id)
            .ok_or_else(|| crate::errors::DispatchError::UnknownSelector {
                member: program.qualified_name(program.member_of(r)),
            })
    }

    pub fn selectors(&self) -> impl Iterator<Item = &SelectorInfo> {
        self.selectors.values()
    }

    /// The packed slot array.
    pub fn slots(&self) -> &[Option<ReferenceId>] {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The table entry a virtual call on `class_id` through `sel`
    /// reaches: `table[sel.offset + class_id]`.
    pub fn slot_for(&self, sel: &SelectorInfo, class_id: u32) -> Option<ReferenceId> {
        let offset = sel.offset()?;
        let index = offset as i64 + class_id as i64;
        if index < 0 {
            return None;
        }
        self.table.get(index as usize).copied().flatten()
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

    pub fn stats(&self) -> PackStats {
        let filled = self.table.iter().filter(|slot| slot.is_some()).count() as u32;
        PackStats {
            capacity: self.table.len() as u32,
            filled,
            holes: self.table.len() as u32 - filled,
        }
    }
}
