//! Error types for the transaction database.

/// Failure to decode a serialized transaction database blob.
///
/// Parse failures are non-fatal to the process: the caller discards the
/// blob and starts from an empty database, typically triggering a rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The blob carries the magic of the pre-malleation database format.
    #[error("outdated transaction database format")]
    OutdatedFormat,

    /// The blob does not start with a known magic value.
    #[error("unknown transaction database header")]
    UnknownHeader,

    /// A record tag or state byte was not recognized.
    #[error("unknown entry in transaction database")]
    UnknownEntry,

    /// The blob ended in the middle of a record.
    #[error("truncated transaction database")]
    Truncated,
}

/// Errors surfaced by the transaction database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed or outdated serialized blob.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The requested ntxid has no rows yet: the watcher has not observed
    /// the transaction. A normal transient condition, not a store fault.
    #[error("transaction is not in the database yet")]
    Synchronizing,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
