// view.rs - Projections of an archetype onto a subset of its columns
//
// A view borrows the archetype and yields per-row tuples of references to
// the chosen columns. The mutable flavor projects through raw column
// pointers: the view types are checked distinct up front, so the columns
// they resolve to never alias.

use std::any::TypeId;
use std::marker::PhantomData;

use super::{Archetype, Component, ComponentSet};

/// A tuple of component types an archetype can be projected onto.
///
/// Implemented for tuples of one through four components.
pub trait ViewSet<S: ComponentSet>: 'static {
    /// `(&C₁, &C₂, …)` for one row.
    type Row<'r>;
    /// `(&mut C₁, &mut C₂, …)` for one row.
    type RowMut<'r>;

    /// Panics unless every view type is in the component set exactly once.
    fn assert_projects();

    fn row(columns: &S::Columns, row: usize) -> Self::Row<'_>;

    /// # Safety
    ///
    /// `columns` must point to a live `Columns` value the caller has
    /// exclusive access to for `'r`, the view types must be distinct, and
    /// no two calls for the same row may be live at once.
    unsafe fn row_mut<'r>(columns: *mut S::Columns, row: usize) -> Self::RowMut<'r>;
}

macro_rules! impl_view_set {
    ($($V:ident),+) => {
        impl<S: ComponentSet, $($V: Component),+> ViewSet<S> for ($($V,)+) {
            type Row<'r> = ($(&'r $V,)+);
            type RowMut<'r> = ($(&'r mut $V,)+);

            fn assert_projects() {
                let ids = [$(TypeId::of::<$V>()),+];
                for (i, id) in ids.iter().enumerate() {
                    assert!(
                        !ids[i + 1..].contains(id),
                        "view component types must be distinct"
                    );
                }
                $(
                    assert!(
                        S::contains::<$V>(),
                        "view component type is not part of this archetype"
                    );
                )+
            }

            fn row(columns: &S::Columns, row: usize) -> Self::Row<'_> {
                ($(
                    &S::column::<$V>(columns)
                        .expect("view component type is not part of this archetype")[row],
                )+)
            }

            unsafe fn row_mut<'r>(columns: *mut S::Columns, row: usize) -> Self::RowMut<'r> {
                ($(
                    &mut (&mut (*S::column_ptr::<$V>(columns)
                        .expect("view component type is not part of this archetype")))[row],
                )+)
            }
        }
    };
}

impl_view_set!(V0);
impl_view_set!(V0, V1);
impl_view_set!(V0, V1, V2);
impl_view_set!(V0, V1, V2, V3);

/// Shared projection of an archetype onto the columns in `V`, in row order.
pub struct ArchetypeView<'a, S: ComponentSet, V: ViewSet<S>> {
    archetype: &'a Archetype<S>,
    _marker: PhantomData<V>,
}

impl<'a, S: ComponentSet, V: ViewSet<S>> ArchetypeView<'a, S, V> {
    pub(super) fn new(archetype: &'a Archetype<S>) -> Self {
        V::assert_projects();
        Self {
            archetype,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.archetype.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetype.is_empty()
    }

    /// References to the view's components at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    pub fn at(&self, row: usize) -> V::Row<'a> {
        assert!(row < self.len(), "row {row} out of range (len {})", self.len());
        let archetype: &'a Archetype<S> = self.archetype;
        V::row(&archetype.columns, row)
    }

    /// Iterate rows ascending.
    pub fn iter(&self) -> impl Iterator<Item = V::Row<'a>> + 'a {
        let columns: &'a S::Columns = &self.archetype.columns;
        (0..S::len(columns)).map(move |row| V::row(columns, row))
    }

    /// Iterate `(row, components…)` ascending.
    pub fn iter_indexed(&self) -> impl Iterator<Item = (usize, V::Row<'a>)> + 'a {
        let columns: &'a S::Columns = &self.archetype.columns;
        (0..S::len(columns)).map(move |row| (row, V::row(columns, row)))
    }

    /// Visit `count` rows starting at `first`.
    ///
    /// # Panics
    ///
    /// Panics unless `first + count <= len()`.
    pub fn each_n<F: FnMut(V::Row<'a>)>(&self, first: usize, count: usize, mut fun: F) {
        let end = self.checked_range(first, count);
        let columns: &'a S::Columns = &self.archetype.columns;
        for row in first..end {
            fun(V::row(columns, row));
        }
    }

    /// As [`each_n`](Self::each_n), passing the row index along.
    pub fn each_n_indexed<F: FnMut(usize, V::Row<'a>)>(
        &self,
        first: usize,
        count: usize,
        mut fun: F,
    ) {
        let end = self.checked_range(first, count);
        let columns: &'a S::Columns = &self.archetype.columns;
        for row in first..end {
            fun(row, V::row(columns, row));
        }
    }

    fn checked_range(&self, first: usize, count: usize) -> usize {
        let end = first.checked_add(count).expect("range end overflows");
        assert!(
            end <= self.len(),
            "range {first}..{end} out of bounds (len {})",
            self.len()
        );
        end
    }
}

/// Mutable projection of an archetype onto the columns in `V`.
///
/// Holding one borrows the archetype exclusively, so no other view or
/// column access can observe half-updated rows.
pub struct ArchetypeViewMut<'a, S: ComponentSet, V: ViewSet<S>> {
    archetype: &'a mut Archetype<S>,
    _marker: PhantomData<V>,
}

impl<'a, S: ComponentSet, V: ViewSet<S>> ArchetypeViewMut<'a, S, V> {
    pub(super) fn new(archetype: &'a mut Archetype<S>) -> Self {
        V::assert_projects();
        Self {
            archetype,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.archetype.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetype.is_empty()
    }

    /// Mutable references to the view's components at `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    pub fn at(&mut self, row: usize) -> V::RowMut<'_> {
        assert!(row < self.len(), "row {row} out of range (len {})", self.len());
        // SAFETY: distinct view types were asserted at construction and
        // &mut self keeps the columns exclusive for the returned lifetime.
        unsafe { V::row_mut(&mut self.archetype.columns, row) }
    }

    /// Iterate rows ascending, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = V::RowMut<'_>> {
        self.iter_indexed_mut().map(|(_, row)| row)
    }

    /// Iterate `(row, components…)` ascending, mutably.
    pub fn iter_indexed_mut(&mut self) -> ViewIterMut<'_, S, V> {
        let len = self.len();
        ViewIterMut {
            columns: &mut self.archetype.columns,
            row: 0,
            len,
            _marker: PhantomData,
        }
    }

    /// Visit `count` rows starting at `first`, mutably.
    ///
    /// # Panics
    ///
    /// Panics unless `first + count <= len()`.
    pub fn each_n<'b, F: FnMut(V::RowMut<'b>)>(&'b mut self, first: usize, count: usize, mut fun: F) {
        let end = self.checked_range(first, count);
        let columns: *mut S::Columns = &mut self.archetype.columns;
        for row in first..end {
            // SAFETY: as at; every row is visited at most once.
            fun(unsafe { V::row_mut(columns, row) });
        }
    }

    /// As [`each_n`](Self::each_n), passing the row index along.
    pub fn each_n_indexed<'b, F: FnMut(usize, V::RowMut<'b>)>(
        &'b mut self,
        first: usize,
        count: usize,
        mut fun: F,
    ) {
        let end = self.checked_range(first, count);
        let columns: *mut S::Columns = &mut self.archetype.columns;
        for row in first..end {
            // SAFETY: as each_n.
            fun(row, unsafe { V::row_mut(columns, row) });
        }
    }

    fn checked_range(&self, first: usize, count: usize) -> usize {
        let end = first.checked_add(count).expect("range end overflows");
        assert!(
            end <= self.len(),
            "range {first}..{end} out of bounds (len {})",
            self.len()
        );
        end
    }
}

/// Iterator behind [`ArchetypeViewMut::iter_indexed_mut`].
pub struct ViewIterMut<'a, S: ComponentSet, V: ViewSet<S>> {
    columns: *mut S::Columns,
    row: usize,
    len: usize,
    _marker: PhantomData<(&'a mut S::Columns, V)>,
}

impl<'a, S: ComponentSet, V: ViewSet<S>> Iterator for ViewIterMut<'a, S, V> {
    type Item = (usize, V::RowMut<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.len {
            return None;
        }
        let row = self.row;
        self.row += 1;
        // SAFETY: the iterator owns an exclusive borrow of the columns for
        // 'a and hands out each row exactly once.
        Some((row, unsafe { V::row_mut(self.columns, row) }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len - self.row;
        (left, Some(left))
    }
}

impl<S: ComponentSet, V: ViewSet<S>> ExactSizeIterator for ViewIterMut<'_, S, V> {}

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

    fn sample() -> Archetype<Movers> {
        let mut arch = Archetype::new();
        for i in 0..3 {
            arch.push((
                Position(Vec2::splat(i as f32)),
                Velocity(Vec2::splat(10.0 + i as f32)),
                Health(i),
            ));
        }
        arch
    }

    #[test]
    fn single_column_view_iterates_in_row_order() {
        let arch = sample();
        let positions: Vec<Position> = arch.view::<(Position,)>().iter().map(|(p,)| *p).collect();
        assert_eq!(
            positions,
            vec![
                Position(Vec2::splat(0.0)),
                Position(Vec2::splat(1.0)),
                Position(Vec2::splat(2.0)),
            ]
        );
    }

    #[test]
    fn view_order_follows_the_projection_not_the_set() {
        let arch = sample();
        let view = arch.view::<(Velocity, Position)>();
        let (v, p) = view.at(1);
        assert_eq!(*v, Velocity(Vec2::splat(11.0)));
        assert_eq!(*p, Position(Vec2::splat(1.0)));
    }

    #[test]
    fn view_references_agree_with_direct_column_access() {
        let arch = sample();
        let view = arch.view::<(Position, Health)>();
        for (row, (p, h)) in view.iter_indexed() {
            assert!(std::ptr::eq(p, &arch.column::<Position>()[row]));
            assert!(std::ptr::eq(h, &arch.column::<Health>()[row]));
        }
    }

    #[test]
    fn each_n_visits_exactly_the_requested_rows() {
        let arch = sample();
        let view = arch.view::<(Health,)>();

        let mut seen = Vec::new();
        view.each_n(1, 2, |(h,)| seen.push(h.0));
        assert_eq!(seen, vec![1, 2]);

        let mut indexed = Vec::new();
        view.each_n_indexed(0, 3, |row, (h,)| indexed.push((row, h.0)));
        assert_eq!(indexed, vec![(0, 0), (1, 1), (2, 2)]);

        // Empty range at the end boundary is fine.
        view.each_n(3, 0, |_| unreachable!());
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn each_n_past_the_end_panics() {
        let arch = sample();
        arch.view::<(Health,)>().each_n(2, 2, |_| {});
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn at_past_the_end_panics() {
        let arch = sample();
        let _ = arch.view::<(Health,)>().at(3);
    }

    #[test]
    #[should_panic(expected = "not part of this archetype")]
    fn foreign_view_type_is_rejected() {
        #[derive(Default)]
        struct Mana(u32);
        let arch = sample();
        let _ = arch.view::<(Mana,)>();
    }

    #[test]
    #[should_panic(expected = "must be distinct")]
    fn repeated_view_type_is_rejected() {
        let arch = sample();
        let _ = arch.view::<(Health, Health)>();
    }

    #[test]
    fn mutable_view_updates_rows_in_place() {
        let mut arch = sample();
        let mut view = arch.view_mut::<(Position, Velocity)>();
        for (p, v) in view.iter_mut() {
            p.0 += v.0;
        }
        assert_eq!(arch.column::<Position>()[2], Position(Vec2::splat(14.0)));
        assert_eq!(arch.column::<Velocity>()[2], Velocity(Vec2::splat(12.0)));
    }

    #[test]
    fn mutable_each_n_and_at_edit_single_rows() {
        let mut arch = sample();
        let mut view = arch.view_mut::<(Health,)>();

        view.each_n(0, 2, |(h,)| h.0 += 100);
        {
            let (h,) = view.at(2);
            h.0 = -1;
        }
        assert_eq!(view.len(), 3);
        drop(view);

        assert_eq!(arch.column::<Health>()[0], Health(100));
        assert_eq!(arch.column::<Health>()[1], Health(101));
        assert_eq!(arch.column::<Health>()[2], Health(-1));
    }

    #[test]
    fn views_reflect_swap_remove() {
        let mut arch = sample();
        arch.swap_remove(0);

        let view = arch.view::<(Position, Velocity)>();
        assert_eq!(view.len(), 2);
        let (p0, v0) = view.at(0);
        assert_eq!(*p0, Position(Vec2::splat(2.0)));
        assert_eq!(*v0, Velocity(Vec2::splat(12.0)));
        let (p1, v1) = view.at(1);
        assert_eq!(*p1, Position(Vec2::splat(1.0)));
        assert_eq!(*v1, Velocity(Vec2::splat(11.0)));
    }
}
