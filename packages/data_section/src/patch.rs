use crate::DataRef;

/// The address a data patch refers to.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum PatchTarget {
    /// Another item in the same data section, identified by its handle. The
    /// final value depends on where an outer allocator places the section.
    Section(DataRef),

    /// A named symbol resolved later by a linker or loader.
    Symbol(String),
}

/// A relocation site recorded while emitting the data section.
///
/// Item callbacks report a patch for every byte range whose final value depends
/// on an address that is not known at emission time. The engine forwards
/// patches to the caller's sink without interpreting them; resolving them is
/// the business of whatever links or loads the emitted section.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DataPatch {
    /// Byte offset within the section where the patched range begins.
    pub offset: usize,

    /// What the bytes at the patched range refer to.
    pub target: PatchTarget,
}

impl DataPatch {
    /// Creates a patch record for the given section offset and target.
    #[must_use]
    pub fn new(offset: usize, target: PatchTarget) -> Self {
        Self { offset, target }
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(DataPatch: Send, Sync, Debug);

    #[test]
    fn carries_offset_and_target() {
        let patch = DataPatch::new(24, PatchTarget::Symbol("jump_table".to_string()));

        assert_eq!(patch.offset, 24);
        assert!(matches!(patch.target, PatchTarget::Symbol(ref name) if name == "jump_table"));
    }
}
