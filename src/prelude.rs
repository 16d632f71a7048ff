//! Convenient re-exports for common usage patterns.
//!
//! # Example
//!
//! ```
//! use rowmap::prelude::*;
//!
//! let registry = TypeRegistry::with_builtins();
//! let codec = CellCodec::new(&registry);
//! let meta = ValueMeta::default_map();
//! let bytes = codec.encode(&meta, &Value::Null)?;
//! assert_eq!(bytes, vec![1]);
//! # Ok::<(), rowmap::Error>(())
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Values and types
pub use crate::value::{
    MapValue, MapValueType, ScalarKind, Storage, StorageKind, TypeRegistry, Value, ValueError,
    ValueMeta,
};

// Binary encoding
pub use crate::codec::{CellCodec, CodecError, DataInput, DataOutput};

// Rows and transports
pub use crate::row::{
    FieldMeta, Row, RowError, RowSchema, RowSink, RowSource, RowStreamReader, RowStreamWriter,
    VecSink, VecSource, channel,
};

// Operators
pub use crate::step::{
    CheckRemark, FoldConfig, FoldOperator, FoldState, StepError, StepOutcome, StopFlag,
    UnfoldConfig, UnfoldOperator, UnfoldState,
};
