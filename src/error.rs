//! Unified error type for the rowmap library.
//!
//! Each module has its own error enum; [`Error`] wraps all of them so
//! application code can use a single `?`-friendly type.

use thiserror::Error;

use crate::codec::CodecError;
#[cfg(feature = "config")]
use crate::config::ConfigError;
use crate::row::RowError;
use crate::step::StepError;
use crate::value::ValueError;

/// Unified error type for all rowmap operations.
///
/// # Example
///
/// ```
/// use rowmap::Result;
/// use rowmap::codec::CellCodec;
/// use rowmap::value::{TypeRegistry, Value, ValueMeta};
///
/// fn roundtrip(text: &str) -> Result<Value> {
///     let registry = TypeRegistry::with_builtins();
///     let codec = CellCodec::new(&registry);
///     let meta = ValueMeta::default_map();
///     let value = meta.parse_text(text)?;
///     let bytes = codec.encode(&meta, &value)?;
///     Ok(codec.decode(&meta, &bytes)?)
/// }
/// # assert!(roundtrip("{a=1}").is_ok());
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Value conversion failed.
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Binary encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Row(#[from] RowError),

    /// An operator run failed.
    #[error(transparent)]
    Step(#[from] StepError),

    #[cfg(feature = "config")]
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn is_codec(&self) -> bool {
        matches!(self, Self::Codec(_))
    }

    pub fn is_step(&self) -> bool {
        matches!(self, Self::Step(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns `true` for a clean end of input surfaced as an error.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::Codec(CodecError::EndOfStream))
    }
}
