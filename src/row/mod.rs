//! Rows, row schemas and row transports.
//!
//! # Module Organization
//!
//! - [`error`]: Row construction errors
//! - [`transport`]: The blocking [`RowSource`]/[`RowSink`] seams plus
//!   in-memory and channel implementations
//! - [`stream`]: The binary row stream, a transport across a byte boundary

pub mod error;
pub mod stream;
pub mod transport;

use std::fmt;
use std::sync::Arc;

pub use error::RowError;
pub use stream::{RowStreamReader, RowStreamWriter};
pub use transport::{RowReceiver, RowSender, RowSink, RowSource, VecSink, VecSource, channel};

use crate::value::{Value, ValueMeta};

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMeta {
    pub name: String,
    pub meta: ValueMeta,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, meta: ValueMeta) -> Self {
        Self {
            name: name.into(),
            meta,
        }
    }
}

impl fmt::Display for FieldMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.meta)
    }
}

/// Ordered list of fields describing the cells of a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowSchema {
    fields: Vec<FieldMeta>,
}

impl RowSchema {
    pub fn new(fields: Vec<FieldMeta>) -> Self {
        Self { fields }
    }

    /// Position of the first field called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, index: usize) -> Option<&FieldMeta> {
        self.fields.get(index)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn append(&mut self, field: FieldMeta) {
        self.fields.push(field);
    }

    pub fn remove_at(&mut self, index: usize) -> Option<FieldMeta> {
        (index < self.fields.len()).then(|| self.fields.remove(index))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldMeta> {
        self.fields.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

impl FromIterator<FieldMeta> for RowSchema {
    fn from_iter<T: IntoIterator<Item = FieldMeta>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RowSchema {
    type Item = &'a FieldMeta;
    type IntoIter = std::slice::Iter<'a, FieldMeta>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl fmt::Display for RowSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", fields.join(", "))
    }
}

/// One row: a shared schema and one value per field.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<RowSchema>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(schema: Arc<RowSchema>, values: Vec<Value>) -> Result<Self, RowError> {
        if schema.len() != values.len() {
            return Err(RowError::Arity {
                expected: schema.len(),
                actual: values.len(),
            });
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}
