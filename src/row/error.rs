//! Error types for row construction.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("Row has {actual} values but the schema has {expected} fields")]
    Arity { expected: usize, actual: usize },
}
