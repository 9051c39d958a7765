use std::fmt;
use std::num::NonZero;
use std::sync::{Mutex, MutexGuard};

use num_integer::Integer;

use crate::{DataPatch, DataRef, DataSink};

/// The callback that produces the bytes of one data item during emission.
///
/// Invoked with the sink positioned at the item's resolved offset, it must
/// write exactly the item's declared size in bytes and may report any number of
/// [`DataPatch`] records for byte ranges whose final value is resolved later.
pub type EmitFn = Box<dyn Fn(&mut dyn DataSink, &mut dyn FnMut(DataPatch)) + Send + Sync>;

/// One item of binary data destined for a [`DataSection`][crate::DataSection].
///
/// A `DataItem` describes a blob by its size, its alignment requirement and an
/// opaque callback that produces its bytes. Items are shared as
/// [`Arc<DataItem>`][std::sync::Arc] and deduplicated by object identity: the
/// first insertion into any section issues the item's
/// [`DataRef`][crate::DataRef] handle and every later insertion of the same
/// item returns that same handle.
///
/// The size and the callback are fixed at construction. The alignment may only
/// grow, via least-common-multiple widening, to satisfy callers that request
/// the same constant with different alignment needs before layout runs.
///
/// # Example
///
/// ```
/// use data_section::DataItem;
/// use new_zealand::nz;
///
/// let item = DataItem::raw(nz!(4), vec![1, 2, 3, 4]);
/// assert_eq!(item.size(), 4);
/// assert_eq!(item.alignment(), nz!(4));
///
/// item.update_alignment(nz!(8));
/// assert_eq!(item.alignment(), nz!(8));
/// ```
pub struct DataItem {
    size: usize,
    emit: EmitFn,

    /// Alignment and handle share one lock: it is the critical section that
    /// makes concurrent registration of the same item yield exactly one handle.
    state: Mutex<ItemState>,
}

#[derive(Debug)]
struct ItemState {
    alignment: NonZero<usize>,
    handle: Option<DataRef>,
}

impl DataItem {
    /// Creates an item backed by an arbitrary byte-producing callback.
    ///
    /// The callback must write exactly `size` bytes each time it runs. It is
    /// invoked at most once per emission pass but a section may be emitted any
    /// number of times, so it must produce identical bytes on every run.
    pub fn new(
        alignment: NonZero<usize>,
        size: usize,
        emit: impl Fn(&mut dyn DataSink, &mut dyn FnMut(DataPatch)) + Send + Sync + 'static,
    ) -> Self {
        Self {
            size,
            emit: Box::new(emit),
            state: Mutex::new(ItemState {
                alignment,
                handle: None,
            }),
        }
    }

    /// Creates an item that copies pre-serialized constant bytes verbatim.
    #[must_use]
    pub fn raw(alignment: NonZero<usize>, bytes: Vec<u8>) -> Self {
        let size = bytes.len();
        Self::new(alignment, size, move |sink, _patches| {
            sink.write_bytes(&bytes);
        })
    }

    /// Creates an item of `size` zero bytes, e.g. for table slots patched at load time.
    #[must_use]
    pub fn zeroed(alignment: NonZero<usize>, size: usize) -> Self {
        Self::new(alignment, size, move |sink, _patches| {
            write_zeroes(sink, size);
        })
    }

    /// The size of this item in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// The current alignment requirement of this item.
    #[must_use]
    pub fn alignment(&self) -> NonZero<usize> {
        self.lock_state().alignment
    }

    /// Widens the alignment requirement to the least common multiple of the
    /// current alignment and `new_alignment`. A no-op when they are equal.
    ///
    /// Must be called before the owning section is finalized; the already
    /// computed layout does not react to later widening. This is a caller
    /// contract and is not re-validated here.
    pub fn update_alignment(&self, new_alignment: NonZero<usize>) {
        let mut state = self.lock_state();

        if state.alignment == new_alignment {
            return;
        }

        state.alignment = lcm_alignments(state.alignment, new_alignment);
    }

    /// Returns the item's handle if one has been issued.
    pub(crate) fn handle(&self) -> Option<DataRef> {
        self.lock_state().handle.clone()
    }

    /// Returns the existing handle, or issues a new one, reporting whether a
    /// handle was issued by this call.
    ///
    /// The whole read-or-create step runs under the item's lock, so two threads
    /// racing to register the same item observe exactly one handle.
    pub(crate) fn handle_or_issue(&self) -> (DataRef, bool) {
        let mut state = self.lock_state();

        if let Some(existing) = &state.handle {
            return (existing.clone(), false);
        }

        let issued = DataRef::new();
        state.handle = Some(issued.clone());
        (issued, true)
    }

    pub(crate) fn emit_into(&self, sink: &mut dyn DataSink, patches: &mut dyn FnMut(DataPatch)) {
        (self.emit)(sink, patches);
    }

    fn lock_state(&self) -> MutexGuard<'_, ItemState> {
        self.state
            .lock()
            .expect("no operation panics while holding the item state lock")
    }
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataItem")
            .field("size", &self.size)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Least common multiple of two alignments.
///
/// Alignments are non-zero by type, so the zero special cases of the textbook
/// definition cannot arise and the result is itself non-zero.
pub(crate) fn lcm_alignments(x: NonZero<usize>, y: NonZero<usize>) -> NonZero<usize> {
    NonZero::new(x.get().lcm(&y.get())).expect("lcm of two non-zero values is non-zero")
}

/// Writes `size` zero bytes in 8-byte strides, then the remainder byte by byte.
fn write_zeroes(sink: &mut dyn DataSink, size: usize) {
    const STRIDE: [u8; 8] = [0; 8];

    let mut remaining = size;
    while remaining >= STRIDE.len() {
        sink.write_bytes(&STRIDE);

        // Cannot underflow: the loop condition guarantees remaining >= STRIDE.len().
        remaining = remaining.wrapping_sub(STRIDE.len());
    }

    let remainder = STRIDE
        .get(..remaining)
        .expect("remainder is smaller than one stride when the loop exits");

    if !remainder.is_empty() {
        sink.write_bytes(remainder);
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::fmt::Debug;
    use std::io::Cursor;

    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(DataItem: Send, Sync, Debug);

    #[test]
    fn raw_takes_size_from_bytes() {
        let item = DataItem::raw(nz!(1), vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00]);
        assert_eq!(item.size(), 5);
    }

    #[test]
    fn alignment_widening_is_lcm() {
        let item = DataItem::zeroed(nz!(4), 4);

        item.update_alignment(nz!(6));
        assert_eq!(item.alignment(), nz!(12));

        item.update_alignment(nz!(8));
        assert_eq!(item.alignment(), nz!(24));
    }

    #[test]
    fn alignment_never_narrows() {
        let item = DataItem::zeroed(nz!(8), 8);

        item.update_alignment(nz!(2));
        assert_eq!(item.alignment(), nz!(8));
    }

    #[test]
    fn equal_alignment_is_a_no_op() {
        let item = DataItem::zeroed(nz!(8), 8);

        item.update_alignment(nz!(8));
        assert_eq!(item.alignment(), nz!(8));
    }

    #[test]
    fn handle_issued_once() {
        let item = DataItem::zeroed(nz!(1), 1);
        assert!(item.handle().is_none());

        let (first, issued) = item.handle_or_issue();
        assert!(issued);

        let (second, issued) = item.handle_or_issue();
        assert!(!issued);
        assert_eq!(first, second);
    }

    #[test]
    fn zeroed_writes_exactly_size_zero_bytes() {
        // 19 = two full strides plus a 3 byte remainder.
        for size in [0, 1, 7, 8, 9, 19] {
            let item = DataItem::zeroed(nz!(1), size);

            let mut sink = Cursor::new(vec![0xFF_u8; size + 1]);
            item.emit_into(&mut sink, &mut |_patch| {});

            let buffer = sink.into_inner();
            assert!(buffer[..size].iter().all(|&byte| byte == 0));

            // The byte past the declared size must be untouched.
            assert_eq!(buffer[size], 0xFF);
        }
    }

    #[test]
    fn raw_writes_bytes_verbatim() {
        let bytes = vec![1_u8, 2, 3];
        let item = DataItem::raw(nz!(1), bytes.clone());

        let mut sink = Cursor::new(vec![0_u8; 3]);
        item.emit_into(&mut sink, &mut |_patch| {});

        assert_eq!(sink.into_inner(), bytes);
    }
}
