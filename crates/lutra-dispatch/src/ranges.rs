// ranges.rs
//
// Target range construction: walk the hierarchy super-first assigning
// each concrete class-id its innermost non-abstract override per
// selector, then coalesce contiguous equal-target ids into ranges.

use rustc_hash::{FxHashMap, FxHashSet};

use lutra_identity::{ClassId, ReferenceId, SelectorId};

use crate::errors::{DispatchError, DispatchResult};
use crate::program::{Program, ProgramMetadata, STATIC_DISPATCH_PRAGMA};
use crate::selectors::SelectorRegistry;

/// Inclusive class-id interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u32,
    pub end: u32,
}

impl Range {
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "INTERNAL: inverted range {}..{}", start, end);
        Self { start, end }
    }

    pub fn single(id: u32) -> Self {
        Self { start: id, end: id }
    }

    pub fn length(&self) -> u32 {
        self.end - self.start + 1
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.start <= id && id <= self.end
    }
}

/// One range of class-ids all dispatching to the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRange {
    pub range: Range,
    pub target: ReferenceId,
}

pub(crate) struct TargetRangeBuilder<'a> {
    program: &'a Program,
    metadata: &'a ProgramMetadata,
    /// Per class: selector -> innermost override seen so far.
    class_selectors: FxHashMap<ClassId, FxHashMap<SelectorId, ReferenceId>>,
    /// Concrete targets carrying the static-dispatch pragma.
    static_dispatch_targets: FxHashSet<ReferenceId>,
}

impl<'a> TargetRangeBuilder<'a> {
    pub fn new(program: &'a Program, metadata: &'a ProgramMetadata) -> Self {
        Self {
            program,
            metadata,
            class_selectors: FxHashMap::default(),
            static_dispatch_targets: FxHashSet::default(),
        }
    }

    /// Walk classes super-first, interning a selector for every
    /// dispatchable reference and recording per-class override maps.
    /// The root and the intrinsics base start from an empty map; every
    /// other class starts from a copy of its superclass's map.
    /// Abstract references never displace an inherited concrete target.
    pub fn walk(&mut self, registry: &mut SelectorRegistry) -> DispatchResult<()> {
        for class in self.program.classes() {
            let inherits_super = self.program.intrinsics_base() != Some(class.class_id);
            let mut selectors = match class.superclass {
                Some(sup) if inherits_super => self.class_selectors[&sup].clone(),
                _ => FxHashMap::default(),
            };

            if !class.synthetic {
                for &member in &class.members {
                    let attrs = *self.metadata.attributes(member).ok_or_else(|| {
                        DispatchError::MissingMetadata {
                            member: self.program.qualified_name(member),
                        }
                    })?;
                    for r in self.program.dispatch_refs(member, &attrs) {
                        let id = registry.get_or_create(self.program, self.metadata, r)?;
                        if self.program.is_abstract_ref(r) {
                            selectors.entry(id).or_insert(r);
                        } else {
                            selectors.insert(id, r);
                            if self.metadata.has_pragma(member, STATIC_DISPATCH_PRAGMA) {
                                self.static_dispatch_targets.insert(r);
                            }
                        }
                    }
                }
            }

            self.class_selectors.insert(class.class_id, selectors);
        }
        Ok(())
    }

    /// Group overrides by selector across the concrete class-id space,
    /// coalesce, and store ranges plus static-dispatch subsets into the
    /// registry's selectors.
    pub fn finalize(
        self,
        registry: &mut SelectorRegistry,
        polymorphic_specialization: bool,
    ) -> DispatchResult<()> {
        let mut rows: FxHashMap<SelectorId, Vec<(u32, ReferenceId)>> = FxHashMap::default();
        for id in 0..=self.program.max_concrete_class_id() {
            let Some(class) = self.program.class_by_id(ClassId::new(id)) else {
                continue;
            };
            if class.is_abstract {
                continue;
            }
            for (&selector, &target) in &self.class_selectors[&class.class_id] {
                if !self.program.is_abstract_ref(target) {
                    rows.entry(selector).or_default().push((id, target));
                }
            }
        }

        for (selector, entries) in rows {
            let sel = registry.get_mut(selector);
            sel.target_ranges = coalesce(&entries);
            sel.concrete_classes = sel.target_ranges.iter().map(|t| t.range.length()).sum();
            tracing::debug!(
                selector = selector.index(),
                ranges = sel.target_ranges.len(),
                classes = sel.concrete_classes,
                "finalized target ranges"
            );
        }

        for id in registry.ids_sorted() {
            let static_targets = &self.static_dispatch_targets;
            let sel = registry.get_mut(id);
            sel.static_dispatch_ranges =
                if polymorphic_specialization || sel.target_ranges.len() == 1 {
                    sel.target_ranges.clone()
                } else {
                    sel.target_ranges
                        .iter()
                        .filter(|t| static_targets.contains(&t.target))
                        .copied()
                        .collect()
                };
        }
        Ok(())
    }
}

/// Merge adjacent entries with contiguous ids and the identical target.
/// Entries arrive sorted ascending by class-id and contain no duplicates.
fn coalesce(entries: &[(u32, ReferenceId)]) -> Vec<TargetRange> {
    let mut out: Vec<TargetRange> = Vec::new();
    for &(id, target) in entries {
        match out.last_mut() {
            Some(last) if last.range.end + 1 == id && last.target == target => {
                last.range.end = id;
            }
            Some(last) => {
                assert!(
                    last.range.end < id,
                    "INTERNAL: overlapping dispatch ranges at class id {}",
                    id
                );
                out.push(TargetRange {
                    range: Range::single(id),
                    target,
                });
            }
            None => out.push(TargetRange {
                range: Range::single(id),
                target,
            }),
        }
    }
    out
}
