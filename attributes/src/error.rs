//! Error types for attribute operations.

use common::serde::EncodingError;
use common::SessionError;

/// Error type for attribute operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A stream record is shorter than its fixed layout requires or carries
    /// an unknown instruction opcode.
    MalformedRecord(String),

    /// The instruction stream violates its sequencing rules (non-consecutive
    /// sequence numbers, or a version whose first record is not an init).
    MalformedStream(String),

    /// No init record for the requested symbol table version exists in the
    /// scanned window.
    NotFound(String),

    /// A payload read was requested for an instruction kind other than the
    /// one under the cursor.
    WrongInstruction(String),

    /// A dictionary value was interned twice.
    DuplicateValue(String),

    /// An attribute index references a value id that is not in the dictionary.
    UnknownValueId(String),

    /// An operation received an empty input it cannot act on.
    EmptyInput(String),

    /// The symbol table is finalized and can no longer be mutated.
    Finalized(String),

    /// Attribute values could not be resolved against the symbol table even
    /// after interning.
    UnresolvedAttribute(String),

    /// An instruction record exceeds the single-record encoding cap.
    RecordTooLarge(String),

    /// The stream writer has too many writes in flight.
    Backpressure(String),

    /// A wait deadline elapsed with writes still pending.
    Timeout(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),

    /// Errors propagated from the underlying time-series session.
    Session(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::MalformedRecord(msg) => write!(f, "Malformed record: {}", msg),
            Error::MalformedStream(msg) => write!(f, "Malformed stream: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::WrongInstruction(msg) => write!(f, "Wrong instruction: {}", msg),
            Error::DuplicateValue(msg) => write!(f, "Duplicate value: {}", msg),
            Error::UnknownValueId(msg) => write!(f, "Unknown value id: {}", msg),
            Error::EmptyInput(msg) => write!(f, "Empty input: {}", msg),
            Error::Finalized(msg) => write!(f, "Finalized: {}", msg),
            Error::UnresolvedAttribute(msg) => write!(f, "Unresolved attribute: {}", msg),
            Error::RecordTooLarge(msg) => write!(f, "Record too large: {}", msg),
            Error::Backpressure(msg) => write!(f, "Backpressure: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
            Error::Session(msg) => write!(f, "Session error: {}", msg),
        }
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Session(msg) => Error::Session(msg),
            SessionError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<EncodingError> for Error {
    fn from(err: EncodingError) -> Self {
        Error::MalformedRecord(err.message)
    }
}

/// Result type alias for attribute operations.
pub type Result<T> = std::result::Result<T, Error>;
