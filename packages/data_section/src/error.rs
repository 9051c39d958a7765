use thiserror::Error;

/// Errors that can occur when a data section is used in the wrong lifecycle phase.
///
/// These are programmer-contract errors. No operation in this crate can fail
/// transiently, so there is never anything to retry: a lifecycle error means the
/// caller must restructure its call sequence.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A mutating operation was attempted on a data section whose layout is already fixed.
    #[error("the data section is already finalized and no longer accepts changes")]
    AlreadyFinalized,

    /// A layout-dependent query was made before the layout was computed.
    #[error("the data section has not been finalized, so its layout is not yet available")]
    NotFinalized,
}

/// A specialized `Result` type for data section operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn lifecycle_violations_are_errors() {
        let result: Result<()> = Err(Error::AlreadyFinalized);
        assert!(result.is_err());

        let result: Result<()> = Err(Error::NotFinalized);
        assert!(result.is_err());
    }
}
