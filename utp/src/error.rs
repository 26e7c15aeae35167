//! Error types for the transport.
//!
//! Protocol-level faults (corrupted frames, timeouts, out-of-window
//! sequences) are absorbed by the state machine and never become
//! errors; only setup and socket failures surface here.

use std::fmt;
use std::io;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the transport.
#[derive(Debug)]
pub enum Error {
    /// Underlying socket or channel failure.
    Io(io::Error),

    /// A sequence number fell outside the window it was inserted into.
    SequenceOutOfRange,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O failure: {err}"),
            Error::SequenceOutOfRange => f.write_str("sequence out of window range"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
