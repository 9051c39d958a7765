use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::{Error, Result};

/// An opaque handle identifying one item registered into a data section.
///
/// A `DataRef` is issued the first time a [`DataItem`][crate::DataItem] is
/// inserted into a [`DataSection`][crate::DataSection] and stays valid for the
/// lifetime of the item, regardless of any layout decisions made later. Clones
/// are cheap and all refer to the same underlying token.
///
/// Two handles compare equal if and only if they are the same token. Handles
/// are never compared by value and deliberately do not implement [`Hash`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use data_section::{DataItem, DataSection};
/// use new_zealand::nz;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let section = DataSection::new();
/// let item = Arc::new(DataItem::zeroed(nz!(4), 4));
///
/// let reference = section.insert(&item)?;
///
/// // The offset only becomes available once layout has run.
/// assert!(reference.offset().is_err());
///
/// section.finalize()?;
/// assert_eq!(reference.offset()?, 0);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DataRef {
    inner: Arc<RefInner>,
}

struct RefInner {
    /// Byte offset of the referenced item within its section, set exactly once
    /// when the owning section is finalized.
    offset: OnceLock<usize>,
}

impl DataRef {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(RefInner {
                offset: OnceLock::new(),
            }),
        }
    }

    /// Returns the byte offset of the referenced item within its section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFinalized`] if the owning section has not yet been
    /// finalized, as no offset has been assigned at that point.
    pub fn offset(&self) -> Result<usize> {
        self.inner.offset.get().copied().ok_or(Error::NotFinalized)
    }

    /// Assigns the final byte offset to this handle.
    ///
    /// Handles live in exactly one section's sequence and that section finalizes
    /// exactly once, so a second resolution is unreachable by construction.
    pub(crate) fn resolve(&self, offset: usize) {
        self.inner
            .offset
            .set(offset)
            .expect("a data section reference is resolved exactly once");
    }
}

impl PartialEq for DataRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for DataRef {}

impl fmt::Debug for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRef")
            .field("token", &Arc::as_ptr(&self.inner))
            .field("offset", &self.inner.offset.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(DataRef: Send, Sync, Debug);

    #[test]
    fn equality_is_token_identity() {
        let a = DataRef::new();
        let b = DataRef::new();

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn offset_unavailable_until_resolved() {
        let reference = DataRef::new();
        assert!(reference.offset().is_err());

        reference.resolve(16);
        assert_eq!(reference.offset().unwrap(), 16);
    }

    #[test]
    fn clones_observe_resolution() {
        let reference = DataRef::new();
        let clone = reference.clone();

        reference.resolve(8);
        assert_eq!(clone.offset().unwrap(), 8);
    }

    #[test]
    #[should_panic]
    fn double_resolution_panics() {
        let reference = DataRef::new();
        reference.resolve(0);
        reference.resolve(8);
    }
}
