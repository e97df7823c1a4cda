/// Errors reported by the handshake driver and the record codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Not enough input bytes yet. Provide more data and retry; not fatal.
    IncompleteInput,
    /// The provided output buffer is too small. Resize and retry; not fatal.
    OutTooSmall,
    /// A MAC, box, or signature failed to verify. The object is poisoned.
    CorruptData,
    /// Wrong step, wrong length, or a state machine used after completion.
    ProtocolError,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IncompleteInput => write!(f, "more input data needed"),
            Self::OutTooSmall => write!(f, "output buffer too small"),
            Self::CorruptData => write!(f, "encrypted data failed verification"),
            Self::ProtocolError => write!(f, "operation not valid in current state"),
        }
    }
}

impl core::error::Error for Error {}
