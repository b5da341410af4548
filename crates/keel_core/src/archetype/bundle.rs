// bundle.rs - Component bundles for row insertion
//
// A bundle is a tuple of component values handed to `Archetype::push`. It
// may cover any subset of the archetype's components in any order; the
// archetype pulls each of its component types out by TypeId and
// default-constructs the ones the bundle does not carry.

use std::any::TypeId;

use super::Component;

/// A set of component values consumable one component type at a time.
///
/// Implemented for tuples of up to eight components, including the empty
/// tuple (which makes `push` fill an entire row with defaults).
pub trait Bundle: 'static {
    /// The tuple with every element wrapped in `Option`, so values can be
    /// moved out individually.
    type Parts;

    fn into_parts(self) -> Self::Parts;

    /// Move out the value of type `C`, if the bundle still holds one.
    fn take<C: Component>(parts: &mut Self::Parts) -> Option<C>;

    /// Number of values not yet taken. Nonzero after a push means the
    /// bundle carried a type the archetype does not store, or a duplicate.
    fn remaining(parts: &Self::Parts) -> usize;
}

macro_rules! impl_bundle {
    ($(($B:ident, $idx:tt)),*) => {
        impl<$($B: Component),*> Bundle for ($($B,)*) {
            type Parts = ($(Option<$B>,)*);

            fn into_parts(self) -> Self::Parts {
                ($(Some(self.$idx),)*)
            }

            #[allow(unused_variables)]
            fn take<C: Component>(parts: &mut Self::Parts) -> Option<C> {
                $(
                    if TypeId::of::<C>() == TypeId::of::<$B>() {
                        // SAFETY: equal TypeIds mean C and $B are the same
                        // type, so the Option layouts are identical.
                        let slot = unsafe {
                            &mut *(&mut parts.$idx as *mut Option<$B> as *mut Option<C>)
                        };
                        if let Some(value) = slot.take() {
                            return Some(value);
                        }
                        // Already taken; keep scanning in case the type
                        // appears again.
                    }
                )*
                None
            }

            #[allow(unused_variables)]
            fn remaining(parts: &Self::Parts) -> usize {
                0usize $(+ parts.$idx.is_some() as usize)*
            }
        }
    };
}

impl_bundle!();
impl_bundle!((B0, 0));
impl_bundle!((B0, 0), (B1, 1));
impl_bundle!((B0, 0), (B1, 1), (B2, 2));
impl_bundle!((B0, 0), (B1, 1), (B2, 2), (B3, 3));
impl_bundle!((B0, 0), (B1, 1), (B2, 2), (B3, 3), (B4, 4));
impl_bundle!((B0, 0), (B1, 1), (B2, 2), (B3, 3), (B4, 4), (B5, 5));
impl_bundle!((B0, 0), (B1, 1), (B2, 2), (B3, 3), (B4, 4), (B5, 5), (B6, 6));
impl_bundle!((B0, 0), (B1, 1), (B2, 2), (B3, 3), (B4, 4), (B5, 5), (B6, 6), (B7, 7));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_by_type_in_any_order() {
        let mut parts = (1u32, -2i64).into_parts();
        assert_eq!(<(u32, i64)>::take::<i64>(&mut parts), Some(-2));
        assert_eq!(<(u32, i64)>::take::<u32>(&mut parts), Some(1));
        assert_eq!(<(u32, i64)>::remaining(&parts), 0);
    }

    #[test]
    fn absent_types_and_double_takes_yield_none() {
        let mut parts = (7u8,).into_parts();
        assert_eq!(<(u8,)>::take::<i32>(&mut parts), None);
        assert_eq!(<(u8,)>::take::<u8>(&mut parts), Some(7));
        assert_eq!(<(u8,)>::take::<u8>(&mut parts), None);
    }

    #[test]
    fn duplicate_values_are_taken_one_at_a_time() {
        let mut parts = (1u16, 2u16).into_parts();
        assert_eq!(<(u16, u16)>::take::<u16>(&mut parts), Some(1));
        assert_eq!(<(u16, u16)>::remaining(&parts), 1);
        assert_eq!(<(u16, u16)>::take::<u16>(&mut parts), Some(2));
    }

    #[test]
    fn empty_bundle_has_nothing() {
        let parts = ().into_parts();
        assert_eq!(<()>::remaining(&parts), 0);
    }
}
