//! Error types for the row operators.

use std::fmt;

use thiserror::Error;

use crate::codec::CodecError;
use crate::row::RowError;
use crate::value::ValueError;

/// Which configured field a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Key,
    Value,
    Map,
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldRole::Key => "key",
            FieldRole::Value => "value",
            FieldRole::Map => "map",
        })
    }
}

/// Errors that end an operator run.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("Couldn't find {role} field '{name}' in the row")]
    FieldNotFound { role: FieldRole, name: String },

    #[error("Field '{name}' is {actual}, not a map")]
    NotAMap { name: String, actual: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The operator already reached `DONE` or `FAILED`.
    #[error("Operator already finished")]
    AlreadyFinished,

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Row(#[from] RowError),
}

impl StepError {
    pub(crate) fn field_not_found(role: FieldRole, name: &str) -> Self {
        StepError::FieldNotFound {
            role,
            name: name.to_string(),
        }
    }

    /// True when the failure comes from the configuration rather than the data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StepError::FieldNotFound { .. } | StepError::NotAMap { .. } | StepError::Config(_)
        )
    }
}
