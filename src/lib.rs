//! Typed map values for row pipelines.
//!
//! This library provides a map value type whose keys and values are
//! themselves typed, a self-describing binary codec for it, a textual
//! `{k=v,k=v}` form, and two row operators built on top: fold (many
//! key/value rows into one map cell) and unfold (one row per map entry).
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use rowmap::prelude::*;
//!
//! let schema = Arc::new(RowSchema::new(vec![
//!     FieldMeta::new("k", ValueMeta::string()),
//!     FieldMeta::new("v", ValueMeta::integer()),
//! ]));
//! let rows = vec![
//!     Row::new(schema.clone(), vec!["a".into(), 1i64.into()])?,
//!     Row::new(schema, vec!["b".into(), 2i64.into()])?,
//! ];
//!
//! let mut fold = FoldOperator::new(FoldConfig::new("k", "v", "m"));
//! let mut folded = VecSink::new();
//! fold.run(&mut VecSource::new(rows), &mut folded, &StopFlag::new())
//!     .into_result()?;
//!
//! let mut unfold = UnfoldOperator::new(UnfoldConfig::new("m", "key", "value"));
//! let mut unfolded = VecSink::new();
//! unfold
//!     .run(&mut VecSource::new(folded.into_rows()), &mut unfolded, &StopFlag::new())
//!     .into_result()?;
//! assert_eq!(unfolded.rows().len(), 2);
//! # Ok::<(), rowmap::Error>(())
//! ```
//!
//! # Modules
//!
//! - [`value`] - Values, element types, the map type and its text form
//! - [`codec`] - Binary cell codec
//! - [`row`] - Rows, schemas, transports and the binary row stream
//! - [`step`] - The fold and unfold operators
//! - [`config`] - TOML configuration (requires `config` feature)
//!
//! # Feature Flags
//!
//! - `config` - Enable TOML configuration loading
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `cli` - Enable the command-line interface binary
//! - `full` - Enable all features

pub mod codec;
#[cfg(feature = "config")]
pub mod config;
mod logging;
pub mod prelude;
pub mod row;
pub mod step;
pub mod value;

mod error;

// Re-export the unified error type
pub use error::{Error, Result};

pub use codec::{CellCodec, CodecError};
pub use row::{FieldMeta, Row, RowError, RowSchema, RowSink, RowSource};
pub use step::{
    FoldConfig, FoldOperator, StepError, StepOutcome, StopFlag, UnfoldConfig, UnfoldOperator,
};
pub use value::{MapValue, MapValueType, TypeRegistry, Value, ValueError, ValueMeta};
