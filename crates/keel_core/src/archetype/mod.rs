// archetype - Column-oriented storage for fixed component sets
//
// An archetype owns one Vec per component type; all columns advance in
// lockstep, so a row index picks one value out of each column. Iteration
// over a subset of the columns goes through views, which keep the
// Structure-of-Arrays layout visible to the cache.

mod bundle;
mod view;

pub use bundle::Bundle;
pub use view::{ArchetypeView, ArchetypeViewMut, ViewIterMut, ViewSet};

use std::any::TypeId;

/// Marker for types storable as archetype columns.
///
/// Rows inserted from a partial [`Bundle`] default-construct the components
/// the bundle does not carry, hence the `Default` requirement.
pub trait Component: Default + 'static {}

impl<T: Default + 'static> Component for T {}

/// A fixed set of distinct component types, realized as a tuple.
///
/// Implemented for tuples of one through eight components. All column
/// bookkeeping is routed through this trait so [`Archetype`] itself stays a
/// thin shell; the component-to-column mapping is resolved by `TypeId`,
/// which a missing type fails at runtime (the tuple is generic, so the
/// language cannot reject it earlier).
pub trait ComponentSet: 'static {
    /// One `Vec` per component, in declaration order.
    type Columns: Default;

    fn component_ids() -> Vec<TypeId>;

    fn contains<C: Component>() -> bool {
        Self::component_ids().contains(&TypeId::of::<C>())
    }

    fn len(columns: &Self::Columns) -> usize;
    fn capacity(columns: &Self::Columns) -> usize;
    fn reserve(columns: &mut Self::Columns, additional: usize);
    fn resize(columns: &mut Self::Columns, new_len: usize);
    fn clear(columns: &mut Self::Columns);
    fn swap_remove(columns: &mut Self::Columns, row: usize);

    /// Push one row, pulling each component from `parts` or defaulting it.
    fn push_row<B: Bundle>(columns: &mut Self::Columns, parts: &mut B::Parts);

    fn column<C: Component>(columns: &Self::Columns) -> Option<&Vec<C>>;
    fn column_mut<C: Component>(columns: &mut Self::Columns) -> Option<&mut Vec<C>>;

    /// Raw pointer to the column of `C`, for disjoint mutable projections.
    ///
    /// # Safety
    ///
    /// `columns` must point to a live `Columns` value.
    unsafe fn column_ptr<C: Component>(columns: *mut Self::Columns) -> Option<*mut Vec<C>>;
}

macro_rules! impl_component_set {
    ($(($C:ident, $idx:tt)),+) => {
        impl<$($C: Component),+> ComponentSet for ($($C,)+) {
            type Columns = ($(Vec<$C>,)+);

            fn component_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$C>()),+]
            }

            fn len(columns: &Self::Columns) -> usize {
                columns.0.len()
            }

            fn capacity(columns: &Self::Columns) -> usize {
                columns.0.capacity()
            }

            fn reserve(columns: &mut Self::Columns, additional: usize) {
                $(columns.$idx.reserve(additional);)+
            }

            fn resize(columns: &mut Self::Columns, new_len: usize) {
                $(columns.$idx.resize_with(new_len, $C::default);)+
            }

            fn clear(columns: &mut Self::Columns) {
                $(columns.$idx.clear();)+
            }

            fn swap_remove(columns: &mut Self::Columns, row: usize) {
                $(columns.$idx.swap_remove(row);)+
            }

            fn push_row<B: Bundle>(columns: &mut Self::Columns, parts: &mut B::Parts) {
                $(columns.$idx.push(B::take::<$C>(parts).unwrap_or_default());)+
            }

            fn column<C: Component>(columns: &Self::Columns) -> Option<&Vec<C>> {
                $(
                    if TypeId::of::<C>() == TypeId::of::<$C>() {
                        // SAFETY: equal TypeIds mean C and $C are the same
                        // type.
                        return Some(unsafe {
                            &*(&columns.$idx as *const Vec<$C> as *const Vec<C>)
                        });
                    }
                )+
                None
            }

            fn column_mut<C: Component>(columns: &mut Self::Columns) -> Option<&mut Vec<C>> {
                $(
                    if TypeId::of::<C>() == TypeId::of::<$C>() {
                        // SAFETY: as column.
                        return Some(unsafe {
                            &mut *(&mut columns.$idx as *mut Vec<$C> as *mut Vec<C>)
                        });
                    }
                )+
                None
            }

            unsafe fn column_ptr<C: Component>(columns: *mut Self::Columns) -> Option<*mut Vec<C>> {
                $(
                    if TypeId::of::<C>() == TypeId::of::<$C>() {
                        // No reference is formed here, so distinct columns
                        // can later be borrowed mutably side by side.
                        return Some(std::ptr::addr_of_mut!((*columns).$idx) as *mut Vec<C>);
                    }
                )+
                None
            }
        }
    };
}

impl_component_set!((C0, 0));
impl_component_set!((C0, 0), (C1, 1));
impl_component_set!((C0, 0), (C1, 1), (C2, 2));
impl_component_set!((C0, 0), (C1, 1), (C2, 2), (C3, 3));
impl_component_set!((C0, 0), (C1, 1), (C2, 2), (C3, 3), (C4, 4));
impl_component_set!((C0, 0), (C1, 1), (C2, 2), (C3, 3), (C4, 4), (C5, 5));
impl_component_set!((C0, 0), (C1, 1), (C2, 2), (C3, 3), (C4, 4), (C5, 5), (C6, 6));
impl_component_set!((C0, 0), (C1, 1), (C2, 2), (C3, 3), (C4, 4), (C5, 5), (C6, 6), (C7, 7));

/// ECS-style Structure-of-Arrays container for a fixed component set.
///
/// ```
/// use keel_core::archetype::Archetype;
///
/// #[derive(Default, Debug, PartialEq)]
/// struct Position(f32, f32);
/// #[derive(Default, Debug, PartialEq)]
/// struct Velocity(f32, f32);
///
/// let mut arch = Archetype::<(Position, Velocity)>::new();
/// arch.push((Position(1.0, 2.0), Velocity(0.5, 0.0)));
/// arch.push((Velocity(9.0, 9.0),)); // Position defaults
///
/// assert_eq!(arch.len(), 2);
/// assert_eq!(arch.column::<Position>()[1], Position(0.0, 0.0));
/// ```
pub struct Archetype<S: ComponentSet> {
    columns: S::Columns,
}

impl<S: ComponentSet> Archetype<S> {
    /// # Panics
    ///
    /// Panics if the component set repeats a type.
    pub fn new() -> Self {
        let ids = S::component_ids();
        for (i, a) in ids.iter().enumerate() {
            assert!(
                !ids[i + 1..].contains(a),
                "archetype component types must be distinct"
            );
        }
        Self {
            columns: S::Columns::default(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        S::len(&self.columns)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Common capacity of the columns.
    pub fn capacity(&self) -> usize {
        S::capacity(&self.columns)
    }

    /// Reserve room for at least `additional` more rows in every column.
    pub fn reserve(&mut self, additional: usize) {
        S::reserve(&mut self.columns, additional);
    }

    /// Resize every column to `new_len` rows, default-filling new rows.
    pub fn resize(&mut self, new_len: usize) {
        S::resize(&mut self.columns, new_len);
    }

    /// Drop every row.
    pub fn clear(&mut self) {
        S::clear(&mut self.columns);
    }

    /// The column storing components of type `C`.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not one of the archetype's component types.
    pub fn column<C: Component>(&self) -> &Vec<C> {
        S::column(&self.columns).expect("component type is not part of this archetype")
    }

    /// Mutable variant of [`column`](Self::column).
    pub fn column_mut<C: Component>(&mut self) -> &mut Vec<C> {
        S::column_mut(&mut self.columns).expect("component type is not part of this archetype")
    }

    /// Append one row.
    ///
    /// The bundle may supply any subset of the archetype's components in
    /// any order; the rest are default-constructed.
    ///
    /// # Panics
    ///
    /// Panics if the bundle carries a component type the archetype does not
    /// store, or the same type twice.
    pub fn push<B: Bundle>(&mut self, bundle: B) {
        let mut parts = bundle.into_parts();
        S::push_row::<B>(&mut self.columns, &mut parts);
        assert!(
            B::remaining(&parts) == 0,
            "bundle carries a component that is not part of this archetype, or a duplicate"
        );
    }

    /// Remove `row` by swapping the last row into its place. O(1); row
    /// order is not preserved.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range (including on an empty archetype).
    pub fn swap_remove(&mut self, row: usize) {
        assert!(
            row < self.len(),
            "swap_remove row {row} out of range (len {})",
            self.len()
        );
        S::swap_remove(&mut self.columns, row);
    }

    /// Borrowing projection onto the columns named by the tuple `V`.
    ///
    /// # Panics
    ///
    /// Panics if `V` names a type outside the component set, or repeats one.
    pub fn view<V: ViewSet<S>>(&self) -> ArchetypeView<'_, S, V> {
        ArchetypeView::new(self)
    }

    /// Mutable projection; exclusive while it lives.
    pub fn view_mut<V: ViewSet<S>>(&mut self) -> ArchetypeViewMut<'_, S, V> {
        ArchetypeViewMut::new(self)
    }
}

impl<S: ComponentSet> Default for Archetype<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[derive(Clone, Copy, Debug, PartialEq, Default)]
    struct Position(Vec2);

    #[derive(Clone, Copy, Debug, PartialEq, Default)]
    struct Velocity(Vec2);

    #[derive(Clone, Copy, Debug, PartialEq, Default)]
    struct Health(i32);

    type Movers = (Position, Velocity, Health);

    fn assert_lockstep(arch: &Archetype<Movers>) {
        let n = arch.len();
        assert_eq!(arch.column::<Position>().len(), n);
        assert_eq!(arch.column::<Velocity>().len(), n);
        assert_eq!(arch.column::<Health>().len(), n);
    }

    #[test]
    fn push_fills_all_columns() {
        let mut arch = Archetype::<Movers>::new();
        arch.push((
            Position(Vec2::new(1.0, 2.0)),
            Velocity(Vec2::new(0.1, 0.2)),
            Health(100),
        ));
        // Subset, out of declaration order; Position defaults.
        arch.push((Health(50), Velocity(Vec2::ONE)));
        // Empty bundle: a full default row.
        arch.push(());

        assert_eq!(arch.len(), 3);
        assert_lockstep(&arch);
        assert_eq!(arch.column::<Position>()[0], Position(Vec2::new(1.0, 2.0)));
        assert_eq!(arch.column::<Position>()[1], Position(Vec2::ZERO));
        assert_eq!(arch.column::<Health>()[1], Health(50));
        assert_eq!(arch.column::<Velocity>()[2], Velocity(Vec2::ZERO));
    }

    #[test]
    #[should_panic(expected = "not part of this archetype")]
    fn push_rejects_foreign_components() {
        #[derive(Default)]
        struct Mana(u32);
        let mut arch = Archetype::<Movers>::new();
        arch.push((Mana(3),));
    }

    #[test]
    #[should_panic(expected = "duplicate")]
    fn push_rejects_duplicate_components() {
        let mut arch = Archetype::<Movers>::new();
        arch.push((Health(1), Health(2)));
    }

    #[test]
    #[should_panic(expected = "must be distinct")]
    fn duplicate_component_set_is_rejected() {
        let _ = Archetype::<(Health, Health)>::new();
    }

    #[test]
    #[should_panic(expected = "not part of this archetype")]
    fn missing_column_access_panics() {
        let arch = Archetype::<(Position, Velocity, Health)>::new();
        let _ = arch.column::<String>();
    }

    #[test]
    fn swap_remove_moves_last_row_into_the_gap() {
        let mut arch = Archetype::<Movers>::new();
        for i in 0..4 {
            arch.push((Position(Vec2::splat(i as f32)), Health(i)));
        }

        arch.swap_remove(1);
        assert_eq!(arch.len(), 3);
        assert_lockstep(&arch);
        // Row 1 now holds the former last row; rows 0 and 2 are untouched.
        assert_eq!(arch.column::<Health>()[0], Health(0));
        assert_eq!(arch.column::<Health>()[1], Health(3));
        assert_eq!(arch.column::<Health>()[2], Health(2));
        assert_eq!(arch.column::<Position>()[1], Position(Vec2::splat(3.0)));

        // Removing the last row needs no swap.
        arch.swap_remove(2);
        assert_eq!(arch.len(), 2);
        assert_eq!(arch.column::<Health>()[1], Health(3));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn swap_remove_on_empty_archetype_panics() {
        let mut arch = Archetype::<Movers>::new();
        arch.swap_remove(0);
    }

    #[test]
    fn resize_reserve_and_clear_apply_to_every_column() {
        let mut arch = Archetype::<Movers>::new();
        arch.reserve(16);
        assert!(arch.capacity() >= 16);
        assert!(arch.is_empty());

        arch.resize(5);
        assert_eq!(arch.len(), 5);
        assert_lockstep(&arch);
        assert_eq!(arch.column::<Health>()[4], Health(0));

        arch.resize(2);
        assert_eq!(arch.len(), 2);
        assert_lockstep(&arch);

        arch.clear();
        assert!(arch.is_empty());
        assert_lockstep(&arch);
    }

    #[test]
    fn column_mut_edits_one_column_only() {
        let mut arch = Archetype::<Movers>::new();
        arch.push((Health(1),));
        arch.push((Health(2),));
        for h in arch.column_mut::<Health>() {
            h.0 *= 10;
        }
        assert_eq!(arch.column::<Health>()[1], Health(20));
        assert_eq!(arch.column::<Position>()[1], Position(Vec2::ZERO));
    }
}
