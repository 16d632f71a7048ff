//! Error types for value conversion.

use thiserror::Error;

/// Errors raised while converting or cloning typed values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// The source value cannot semantically become the target type.
    #[error("{type_name}: cannot convert {from} to {to}")]
    Conversion {
        type_name: String,
        from: String,
        to: &'static str,
    },

    /// The type has no projection onto the requested scalar.
    #[error("{type_name}: can't be converted to {to}")]
    UnsupportedConversion { type_name: String, to: &'static str },

    /// A null value reached an operation that requires a value.
    #[error("{0}: value is null")]
    NullValue(String),

    /// An indexed cell points outside the shared dictionary.
    #[error("Dictionary index {index} out of range for {size} entries")]
    IndexOutOfRange { index: i64, size: usize },

    /// An indexed cell was found on a type without a dictionary.
    #[error("{0}: indexed value without a dictionary")]
    MissingDictionary(String),

    /// A binary string did not hold valid UTF-8 text.
    #[error("{0}: binary string is not valid UTF-8")]
    InvalidText(String),

    /// Cloning a value failed.
    #[error("Unable to clone {type_name}: {source}")]
    Clone {
        type_name: String,
        #[source]
        source: Box<ValueError>,
    },
}

impl ValueError {
    pub(crate) fn conversion(type_name: impl Into<String>, from: impl Into<String>, to: &'static str) -> Self {
        Self::Conversion {
            type_name: type_name.into(),
            from: from.into(),
            to,
        }
    }

    pub(crate) fn unsupported(type_name: impl Into<String>, to: &'static str) -> Self {
        Self::UnsupportedConversion {
            type_name: type_name.into(),
            to,
        }
    }
}
