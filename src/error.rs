use thiserror::Error;

/// Errors produced by the store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A mutating call was issued on a read-only transaction.
    #[error("attempted to write inside a read-only transaction")]
    WriteInsideReadTx,

    /// A lookup target is absent.
    #[error("key not found")]
    NotFound,

    /// A collection with this name does not exist.
    #[error("collection not found")]
    CollectionNotFound,

    /// A key exceeded the 255-byte wire format limit.
    #[error("key length {0} exceeds the maximum of 255 bytes")]
    KeyTooLong(usize),

    /// A value exceeded the 255-byte wire format limit.
    #[error("value length {0} exceeds the maximum of 255 bytes")]
    ValueTooLong(usize),

    /// The free list's on-disk `u16` fields would overflow.
    #[error("free list exceeded its 65535-page capacity")]
    FreeListCapacityExceeded,

    /// Meta's magic number did not match on open.
    #[error("not a valid store file: bad magic number")]
    InvalidMagic,

    /// `get_split_index` found no split point for a node believed to be over-populated.
    #[error("could not find a split point for an over-populated node")]
    CannotSplit,

    /// `commit`/`rollback` called on a transaction already in a terminal state.
    #[error("transaction already committed or rolled back")]
    TransactionFinished,

    /// The auxiliary channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The auxiliary channel's bounded buffer was full.
    #[error("channel full")]
    ChannelFull,

    /// The auxiliary channel had nothing to receive.
    #[error("channel empty")]
    ChannelEmpty,

    /// A timed acquisition did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// Propagated I/O failure.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
