//! Error types for binary cell encoding and decoding.

use std::io;

use thiserror::Error;

use crate::value::ValueError;

/// Errors that can occur while reading or writing binary cells.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Clean end of input before the first byte of a cell. Signals "no more
    /// rows" rather than a failure.
    #[error("End of stream")]
    EndOfStream,

    #[error("Truncated data at byte {position}: need {needed} bytes, have {available}")]
    Truncated {
        position: u64,
        needed: usize,
        available: usize,
    },

    /// The transport timed out. Propagated unchanged; retrying is up to the
    /// transport.
    #[error("Transport timed out: {0}")]
    Timeout(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown storage kind {0}")]
    UnknownStorageKind(i32),

    #[error("No type registered for tag {0}")]
    UnresolvedType(i32),

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    /// A value's runtime shape does not match its declared storage.
    #[error("Contract violation: expected {expected}, got {actual}")]
    ContractViolation {
        expected: String,
        actual: &'static str,
    },

    #[error("Length {0} does not fit the wire format")]
    TooLarge(usize),

    #[error(transparent)]
    Value(#[from] ValueError),
}

impl CodecError {
    /// True for the end-of-input signal.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, CodecError::EndOfStream)
    }

    /// True for failures that leave the stream unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CodecError::EndOfStream | CodecError::Timeout(_))
    }
}
