//! Error types for ferrodist

use crate::datatype::DatatypeTag;
use thiserror::Error;

/// Result type for ferrodist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for partitioning, communication and assembly
#[derive(Error, Debug)]
pub enum Error {
    /// The rank count, rank or domain size cannot describe a valid run
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Invalid rank specified
    #[error("Invalid rank: {rank} (communicator size {size})")]
    InvalidRank {
        /// Offending rank
        rank: i32,
        /// Size of the communicator
        size: i32,
    },

    /// User tag outside the range available to applications
    #[error("Invalid tag: {0}")]
    InvalidTag(i32),

    /// Buffers passed to a collective do not line up
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// A message carried a different element type than the receiver asked for
    #[error("Datatype mismatch: expected {expected:?}, received {received:?}")]
    DatatypeMismatch {
        /// Element type requested by the receiver
        expected: DatatypeTag,
        /// Element type found on the wire
        received: DatatypeTag,
    },

    /// A message could not be decoded or was not valid at this point of a protocol
    #[error("Unexpected message from rank {rank} (tag {tag}): {reason}")]
    UnexpectedMessage {
        /// Sending rank
        rank: i32,
        /// Tag of the message
        tag: i32,
        /// What was wrong with it
        reason: String,
    },

    /// A work unit was recorded twice
    #[error("Work unit {0} was delivered more than once")]
    DuplicateUnit(u64),

    /// A work unit lies outside `[0, N)`
    #[error("Work unit {unit} is outside the domain [0, {domain})")]
    UnitOutOfRange {
        /// Offending unit
        unit: u64,
        /// Domain size
        domain: u64,
    },

    /// Assembly finished before every unit contributed
    #[error("{missing} of {domain} work units never delivered a result")]
    MissingUnits {
        /// Number of absent units
        missing: u64,
        /// Domain size
        domain: u64,
    },

    /// Rows of a result do not share a single length
    #[error("Work unit {unit} produced {got} values, expected {expected}")]
    RowLengthMismatch {
        /// Offending unit
        unit: u64,
        /// Row length established by earlier results
        expected: usize,
        /// Row length of this unit
        got: usize,
    },

    /// The MPI runtime was already initialized in this process
    #[error("MPI already initialized")]
    AlreadyInitialized,

    /// Another rank failed and the run was torn down
    #[error("Run aborted by rank {0}")]
    Aborted(i32),

    /// Failure writing a diagnostic record
    #[error("Report I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure serializing a diagnostic record
    #[error("Report encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::UnexpectedMessage`].
    pub(crate) fn unexpected(rank: i32, tag: i32, reason: impl Into<String>) -> Self {
        Error::UnexpectedMessage {
            rank,
            tag,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = Error::UnitOutOfRange {
            unit: 12,
            domain: 10,
        };
        assert_eq!(
            err.to_string(),
            "Work unit 12 is outside the domain [0, 10)"
        );
        let err = Error::DatatypeMismatch {
            expected: DatatypeTag::F64,
            received: DatatypeTag::U64,
        };
        assert!(err.to_string().contains("F64"));
    }
}
