use thiserror::Error as ThisError;

/// Errors produced by a bucketed signature store.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Two ingested keys hashed to the same 128-bit signature.
    #[error("duplicate signature encountered while building bucket {bucket}")]
    Duplicate {
        /// Index of the bucket in which the duplicate was found.
        bucket: u64,
    },

    /// A caller-supplied argument violates the store's contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The store was asked to do something its current state forbids.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// An underlying segment file failed to read or write.
    #[error("segment I/O failure")]
    Io(#[from] std::io::Error),
}
