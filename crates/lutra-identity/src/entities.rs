//! First-class identity types for compiler entities.
//!
//! Each entity kind gets its own `u32` newtype so ids for different arenas
//! cannot be mixed up. All ids are dense indices into the arena that owns
//! them. The ids are `Ord` because several consumers (the row packer, the
//! dynamic-dispatch name indices) sort by id to keep output deterministic.

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $vis:vis struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(self) -> u32 {
                self.0
            }
        }
    };
}

define_entity_id! {
    /// Identity for a class. Ids are dense; concrete classes occupy the
    /// low range `[0..=max_concrete_class_id]` used by dispatch ranges.
    pub struct ClassId;
}

define_entity_id! {
    /// Identity for a dispatch selector (an override-equivalence class of
    /// members), assigned by the front end.
    pub struct SelectorId;
}

define_entity_id! {
    /// Identity for an instance member declaration (field or procedure).
    pub struct MemberId;
}

define_entity_id! {
    /// Identity for a dispatchable reference to a member: its body, an
    /// implicit getter or setter, or a tear-off thunk.
    pub struct ReferenceId;
}

define_entity_id! {
    /// Identity for a target-side struct type in the type lattice.
    pub struct StructId;
}

define_entity_id! {
    /// Identity for a compiled target function.
    pub struct FuncId;
}

define_entity_id! {
    /// Identity for a function table within one module's table index space.
    pub struct TableId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_copy_and_ordered() {
        let a = SelectorId::new(1);
        let b = a;
        assert_eq!(a, b);
        assert!(SelectorId::new(1) < SelectorId::new(2));
    }

    #[test]
    fn entity_id_size() {
        assert_eq!(size_of::<ClassId>(), 4);
        assert_eq!(size_of::<Option<ReferenceId>>(), 8);
    }
}
