use thiserror::Error;

/// Errors that can occur when building a [`SlabCache`][crate::SlabCache].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The object type has no size, so objects cannot be told apart by address.
    #[error("cannot cache objects of zero-sized type {type_name}")]
    ZeroSizedObject {
        /// Name of the object type.
        type_name: &'static str,
    },

    /// The requested number of objects per slab cannot be used.
    #[error("invalid objects per slab: {requested} is invalid: {problem}")]
    InvalidObjectsPerSlab {
        /// The number of objects per slab requested by the caller.
        requested: usize,

        /// A human-readable description of the problem.
        problem: &'static str,
    },
}

/// A specialized `Result` type for slab cache operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
