use std::num::NonZero;
use std::ptr;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use new_zealand::nz;

use crate::item::lcm_alignments;
use crate::{DataItem, DataPatch, DataRef, DataSink, Error, Result};

/// Layout computed once when a section is finalized.
#[derive(Debug, Clone, Copy)]
struct SectionLayout {
    /// The minimum buffer length that holds every item at its assigned offset.
    size: usize,

    /// The alignment the section as a whole must satisfy when placed by an
    /// outer allocator so that every item's individual alignment holds.
    alignment: NonZero<usize>,
}

/// The constant data section assembled alongside generated machine code.
///
/// A `DataSection` collects [`DataItem`]s during an accepting phase, then
/// transitions exactly once to a finalized phase in which every item has a
/// fixed byte offset and the section's overall size and alignment are known.
/// Items are deduplicated by object identity: inserting the same
/// [`Arc<DataItem>`] twice returns the same [`DataRef`] and stores the item
/// once.
///
/// # Lifecycle
///
/// While accepting, a section supports [`insert()`](Self::insert),
/// [`transfer_from()`](Self::transfer_from) and [`clear()`](Self::clear).
/// Calling [`finalize()`](Self::finalize) runs the layout planner and closes
/// the section for good; afterwards only [`size()`](Self::size),
/// [`alignment()`](Self::alignment), [`find()`](Self::find) and
/// [`emit()`](Self::emit) are meaningful. Mutating a finalized section or
/// querying layout before finalizing yields an [`Error`], never silent
/// misbehavior.
///
/// # Layout
///
/// The planner sorts items by ascending alignment (a packing heuristic, not
/// optimal bin packing; ties keep insertion order) and assigns each item the
/// next suitably aligned offset. The section's alignment is the least common
/// multiple of all item alignments and its size has no trailing padding beyond
/// the end of the last item.
///
/// # Thread safety
///
/// Multiple threads may insert concurrently while the section is accepting.
/// Once finalized the section is immutable, so any number of threads may query
/// and emit it concurrently, each against its own buffer.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use std::sync::Arc;
///
/// use data_section::{DataItem, DataSection};
/// use new_zealand::nz;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let section = DataSection::new();
///
/// let pi = Arc::new(DataItem::raw(nz!(8), std::f64::consts::PI.to_le_bytes().to_vec()));
/// let mask = Arc::new(DataItem::raw(nz!(4), vec![0xFF, 0xFF, 0x00, 0x00]));
///
/// let pi_ref = section.insert(&pi)?;
/// let mask_ref = section.insert(&mask)?;
///
/// section.finalize()?;
///
/// let mut buffer = Cursor::new(vec![0_u8; section.size()?]);
/// section.emit(&mut buffer, &mut |_patch| {})?;
///
/// // Smaller alignments pack first.
/// assert_eq!(mask_ref.offset()?, 0);
/// assert_eq!(pi_ref.offset()?, 8);
/// assert_eq!(section.size()?, 16);
/// assert_eq!(section.alignment()?, nz!(8));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DataSection {
    /// Registered items; insertion order while accepting, layout order once
    /// finalized. The write lock is the section-wide exclusion scope for all
    /// open-phase mutation.
    items: RwLock<Vec<Arc<DataItem>>>,

    /// Set exactly once by [`finalize()`](Self::finalize). Its presence is the
    /// "finalized" flag checked at the top of every operation.
    layout: OnceLock<SectionLayout>,
}

impl DataSection {
    /// Creates an empty section in the accepting state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            layout: OnceLock::new(),
        }
    }

    /// Whether [`finalize()`](Self::finalize) has run.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.layout.get().is_some()
    }

    /// The number of distinct items registered into this section.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Mutating the count away still leaves behavior observably intact in most tests; the dedup tests pin it down.
    pub fn len(&self) -> usize {
        self.read_items().len()
    }

    /// Whether this section holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_items().is_empty()
    }

    /// Registers an item into this section, returning its handle.
    ///
    /// If the item already carries a handle, whether from this section or from
    /// another still-accepting section, that handle is returned and the
    /// sequence is left untouched. Otherwise a new handle is issued, stored on
    /// the item and the item is appended. Registering the same item from
    /// multiple threads concurrently yields exactly one handle and one
    /// sequence entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyFinalized`] if the section layout is fixed.
    pub fn insert(&self, item: &Arc<DataItem>) -> Result<DataRef> {
        let mut items = self.write_items();
        self.ensure_accepting()?;

        let (handle, issued) = item.handle_or_issue();
        if issued {
            items.push(Arc::clone(item));
        }

        Ok(handle)
    }

    /// Transfers every item from `other` into this section, then empties `other`.
    ///
    /// Handles issued by `other` before the merge remain valid unchanged and
    /// resolve against this section's layout after [`finalize()`](Self::finalize).
    /// Items are shared afterwards, not duplicated. Transferring a section into
    /// itself is a no-op.
    ///
    /// This section's lock is taken before `other`'s, so two threads merging a
    /// pair of sections into each other reciprocally can deadlock; callers
    /// compose sub-sections in one direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyFinalized`] if either section's layout is fixed.
    pub fn transfer_from(&self, other: &Self) -> Result<()> {
        if ptr::eq(self, other) {
            self.ensure_accepting()?;
            return Ok(());
        }

        let mut items = self.write_items();
        self.ensure_accepting()?;

        let mut other_items = other.write_items();
        other.ensure_accepting()?;

        debug_assert!(
            other_items.iter().all(|item| item.handle().is_some()),
            "every registered item carries a handle"
        );

        items.append(&mut other_items);
        Ok(())
    }

    /// Computes the section layout and closes the section to further change.
    ///
    /// Items are stably sorted by ascending alignment, then each is assigned
    /// the next offset that satisfies its alignment; its handle resolves to
    /// that offset. The section's size and alignment become available and the
    /// section is emittable from this point on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyFinalized`] on the second and any later call.
    pub fn finalize(&self) -> Result<()> {
        let mut items = self.write_items();
        self.ensure_accepting()?;

        // Packing heuristic: small-alignment items first, so the large
        // trailing alignments cause padding at most once. Stable, so ties keep
        // insertion order.
        items.sort_by_cached_key(|item| item.alignment());

        let mut position = 0_usize;
        let mut alignment: NonZero<usize> = nz!(1);

        for item in &*items {
            let item_alignment = item.alignment();
            alignment = lcm_alignments(alignment, item_alignment);

            position = position
                .checked_next_multiple_of(item_alignment.get())
                .expect("data section layout exceeds usize::MAX");

            item.handle()
                .expect("every registered item carries a handle")
                .resolve(position);

            position = position
                .checked_add(item.size())
                .expect("data section layout exceeds usize::MAX");
        }

        self.layout
            .set(SectionLayout {
                size: position,
                alignment,
            })
            .expect("finalize holds the section write lock, so it cannot have run twice");

        Ok(())
    }

    /// The size of the finalized section in bytes.
    ///
    /// This is the minimum buffer length that holds every item at its assigned
    /// offset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFinalized`] before [`finalize()`](Self::finalize).
    pub fn size(&self) -> Result<usize> {
        Ok(self.current_layout()?.size)
    }

    /// The alignment requirement of the finalized section as a whole.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFinalized`] before [`finalize()`](Self::finalize).
    pub fn alignment(&self) -> Result<NonZero<usize>> {
        Ok(self.current_layout()?.alignment)
    }

    /// Emits the section's bytes into `sink`, forwarding relocation records to
    /// `patches`.
    ///
    /// For each item, the sink is positioned at the item's resolved offset and
    /// the item's callback writes its bytes. The sink must hold at least
    /// [`size()`](Self::size) bytes. Emission is repeatable: every pass over a
    /// given section produces identical bytes and an identical patch stream,
    /// and concurrent passes against independent sinks are safe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFinalized`] before [`finalize()`](Self::finalize).
    pub fn emit(
        &self,
        sink: &mut impl DataSink,
        patches: &mut impl FnMut(DataPatch),
    ) -> Result<()> {
        self.current_layout()?;

        let items = self.read_items();
        for item in &*items {
            let offset = item
                .handle()
                .expect("every registered item carries a handle")
                .offset()
                .expect("finalize resolved every handle in this section");

            sink.seek_to(offset);
            item.emit_into(sink, patches);
        }

        Ok(())
    }

    /// Looks up the item a handle refers to.
    ///
    /// Returns `None` for handles issued by an unrelated section, or for items
    /// that were merged away into a different section.
    #[must_use]
    pub fn find(&self, reference: &DataRef) -> Option<Arc<DataItem>> {
        let items = self.read_items();
        items
            .iter()
            .find(|item| item.handle().as_ref() == Some(reference))
            .cloned()
    }

    /// Empties the section, returning it to its pristine accepting state.
    ///
    /// The section was never finalized, so it remains eligible to finalize
    /// later.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyFinalized`] if the section layout is fixed.
    pub fn clear(&self) -> Result<()> {
        let mut items = self.write_items();
        self.ensure_accepting()?;

        items.clear();
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::AlreadyFinalized);
        }

        Ok(())
    }

    fn current_layout(&self) -> Result<SectionLayout> {
        self.layout.get().copied().ok_or(Error::NotFinalized)
    }

    fn read_items(&self) -> RwLockReadGuard<'_, Vec<Arc<DataItem>>> {
        self.items
            .read()
            .expect("no operation panics while holding the section lock")
    }

    fn write_items(&self) -> RwLockWriteGuard<'_, Vec<Arc<DataItem>>> {
        self.items
            .write()
            .expect("no operation panics while holding the section lock")
    }
}

impl Default for DataSection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::fmt::Debug;
    use std::io::Cursor;

    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(DataSection: Send, Sync, Debug);

    #[test]
    fn smoke_test() {
        let section = DataSection::new();
        assert!(section.is_empty());
        assert!(!section.is_finalized());

        let a = Arc::new(DataItem::raw(nz!(1), vec![1, 2, 3]));
        let b = Arc::new(DataItem::zeroed(nz!(4), 4));

        let a_ref = section.insert(&a).unwrap();
        let b_ref = section.insert(&b).unwrap();
        assert_eq!(section.len(), 2);

        section.finalize().unwrap();
        assert!(section.is_finalized());

        assert_eq!(a_ref.offset().unwrap(), 0);
        assert_eq!(b_ref.offset().unwrap(), 4);
        assert_eq!(section.size().unwrap(), 8);
        assert_eq!(section.alignment().unwrap(), nz!(4));
    }

    #[test]
    fn insert_is_idempotent_per_item() {
        let section = DataSection::new();
        let item = Arc::new(DataItem::zeroed(nz!(1), 1));

        let first = section.insert(&item).unwrap();
        let second = section.insert(&item).unwrap();

        assert_eq!(first, second);
        assert_eq!(section.len(), 1);
    }

    #[test]
    fn foreign_handle_does_not_grow_sequence() {
        let home = DataSection::new();
        let visited = DataSection::new();
        let item = Arc::new(DataItem::zeroed(nz!(1), 1));

        let home_ref = home.insert(&item).unwrap();
        let visited_ref = visited.insert(&item).unwrap();

        assert_eq!(home_ref, visited_ref);
        assert_eq!(home.len(), 1);
        assert!(visited.is_empty());
    }

    #[test]
    fn empty_section_finalizes_to_nothing() {
        let section = DataSection::new();
        section.finalize().unwrap();

        assert_eq!(section.size().unwrap(), 0);
        assert_eq!(section.alignment().unwrap(), nz!(1));

        let mut sink = Cursor::new(Vec::new());
        section.emit(&mut sink, &mut |_patch| {}).unwrap();
        assert!(sink.into_inner().is_empty());
    }

    #[test]
    fn finalize_twice_fails() {
        let section = DataSection::new();
        section.finalize().unwrap();

        assert!(matches!(section.finalize(), Err(Error::AlreadyFinalized)));
    }

    #[test]
    fn mutation_after_finalize_fails() {
        let section = DataSection::new();
        section.finalize().unwrap();

        let item = Arc::new(DataItem::zeroed(nz!(1), 1));
        assert!(matches!(
            section.insert(&item),
            Err(Error::AlreadyFinalized)
        ));
        assert!(matches!(section.clear(), Err(Error::AlreadyFinalized)));

        let other = DataSection::new();
        assert!(matches!(
            section.transfer_from(&other),
            Err(Error::AlreadyFinalized)
        ));
        assert!(matches!(
            other.transfer_from(&section),
            Err(Error::AlreadyFinalized)
        ));
    }

    #[test]
    fn layout_queries_before_finalize_fail() {
        let section = DataSection::new();

        assert!(matches!(section.size(), Err(Error::NotFinalized)));
        assert!(matches!(section.alignment(), Err(Error::NotFinalized)));

        let mut sink = Cursor::new(Vec::new());
        assert!(matches!(
            section.emit(&mut sink, &mut |_patch| {}),
            Err(Error::NotFinalized)
        ));
    }

    #[test]
    fn clear_returns_section_to_pristine_state() {
        let section = DataSection::new();
        let discarded = Arc::new(DataItem::zeroed(nz!(8), 8));

        section.insert(&discarded).unwrap();
        section.clear().unwrap();
        assert!(section.is_empty());

        let kept = Arc::new(DataItem::zeroed(nz!(2), 2));
        let kept_ref = section.insert(&kept).unwrap();

        section.finalize().unwrap();
        assert_eq!(kept_ref.offset().unwrap(), 0);
        assert_eq!(section.size().unwrap(), 2);
        assert_eq!(section.alignment().unwrap(), nz!(2));
    }

    #[test]
    fn transfer_into_self_is_a_no_op() {
        let section = DataSection::new();
        let item = Arc::new(DataItem::zeroed(nz!(1), 1));
        section.insert(&item).unwrap();

        section.transfer_from(&section).unwrap();
        assert_eq!(section.len(), 1);
    }

    #[test]
    fn find_by_handle_identity() {
        let section = DataSection::new();
        let item = Arc::new(DataItem::zeroed(nz!(1), 1));
        let reference = section.insert(&item).unwrap();

        let found = section.find(&reference).unwrap();
        assert!(Arc::ptr_eq(&found, &item));

        let unrelated = DataSection::new();
        let foreign = unrelated
            .insert(&Arc::new(DataItem::zeroed(nz!(1), 1)))
            .unwrap();
        assert!(section.find(&foreign).is_none());
    }
}
