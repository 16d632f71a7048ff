//! Typed values carried in row cells.
//!
//! # Module Organization
//!
//! - [`error`]: Conversion errors
//! - `meta`: [`ValueMeta`], the closed set of element type descriptors
//! - `map`: [`MapValue`] payloads and the [`MapValueType`] descriptor
//! - [`registry`]: Type tag to descriptor constructors, used when decoding
//! - [`text`]: The `{k=v,k=v}` textual map syntax
//!
//! A [`Value`] is either a native value (`String`, `Integer`, `Map`, ...) or
//! one of the two non-native storage representations: [`Value::BinaryString`]
//! (pre-encoded text bytes) and [`Value::Index`] (a position in the shared
//! dictionary of the owning descriptor). Descriptors convert the latter two
//! into native form on demand.

pub mod error;
mod map;
mod meta;
pub mod registry;
pub mod text;

use std::hash::{Hash, Hasher};

pub use error::ValueError;
pub use map::{MapValue, MapValueType};
pub use meta::{ScalarKind, ScalarMeta, Storage, StorageKind, ValueMeta};
pub use registry::TypeRegistry;

/// Integer type tags written into binary map headers and row stream headers.
pub mod tags {
    pub const NUMBER: i32 = 1;
    pub const STRING: i32 = 2;
    pub const DATE: i32 = 3;
    pub const BOOLEAN: i32 = 4;
    pub const INTEGER: i32 = 5;
    pub const BIG_NUMBER: i32 = 6;
    pub const BINARY: i32 = 8;
    /// "MAP" on a phone keypad.
    pub const MAP: i32 = 627;
}

/// Text layout used for dates.
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// A single cell value.
///
/// Numbers compare and hash by bit pattern so every value can serve as a
/// map key. Maps hash by size only, which keeps hashing independent of
/// iteration order.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    String(String),
    Number(f64),
    Integer(i64),
    /// Arbitrary precision decimal kept in its textual form.
    BigNumber(String),
    Boolean(bool),
    /// Milliseconds since the Unix epoch, UTC.
    Date(i64),
    Binary(Vec<u8>),
    Map(MapValue),
    /// Text held as undecoded bytes (`BINARY_STRING` storage).
    BinaryString(Vec<u8>),
    /// Position in the descriptor's dictionary (`INDEXED` storage).
    Index(i32),
}

impl Value {
    /// Name of the runtime representation, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "String",
            Value::Number(_) => "Number",
            Value::Integer(_) => "Integer",
            Value::BigNumber(_) => "BigNumber",
            Value::Boolean(_) => "Boolean",
            Value::Date(_) => "Date",
            Value::Binary(_) => "Binary",
            Value::Map(_) => "Map",
            Value::BinaryString(_) => "BinaryString",
            Value::Index(_) => "Index",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Native text form of the value, `None` for null.
    ///
    /// Storage representations render as-is (lossy UTF-8 for binary strings,
    /// the raw position for indexes); resolve them through a [`ValueMeta`]
    /// first to get their logical text.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            Value::Null => return None,
            Value::String(s) | Value::BigNumber(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Boolean(b) => (if *b { "Y" } else { "N" }).to_string(),
            Value::Date(ms) => format_date(*ms),
            Value::Binary(bytes) | Value::BinaryString(bytes) => {
                String::from_utf8_lossy(bytes).into_owned()
            }
            Value::Map(map) => map.to_native_string(),
            Value::Index(i) => i.to_string(),
        };
        Some(text)
    }
}

pub(crate) fn format_date(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| millis.to_string())
}

pub(crate) fn parse_date(text: &str) -> Option<i64> {
    chrono::NaiveDateTime::parse_from_str(text.trim(), DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::BigNumber(a), Value::BigNumber(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::BinaryString(a), Value::BinaryString(b)) => a == b,
            (Value::Index(a), Value::Index(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::String(s) | Value::BigNumber(s) => s.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::Integer(i) | Value::Date(i) => i.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Binary(bytes) | Value::BinaryString(bytes) => bytes.hash(state),
            Value::Map(map) => map.len().hash(state),
            Value::Index(i) => i.hash(state),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<MapValue> for Value {
    fn from(map: MapValue) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_numbers_compare_by_bits() {
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(0.0), Value::Number(-0.0));
        assert_ne!(Value::Integer(1), Value::Number(1.0));
    }

    #[test]
    fn test_values_usable_as_set_members() {
        let mut set = HashSet::new();
        set.insert(Value::from("a"));
        set.insert(Value::from("a"));
        set.insert(Value::Integer(1));
        set.insert(Value::Null);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_text_forms() {
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::Boolean(true).to_text().as_deref(), Some("Y"));
        assert_eq!(Value::Integer(-4).to_text().as_deref(), Some("-4"));
        assert_eq!(Value::Number(1.5).to_text().as_deref(), Some("1.5"));
        assert_eq!(
            Value::Date(0).to_text().as_deref(),
            Some("1970/01/01 00:00:00.000")
        );
    }

    #[test]
    fn test_date_text_roundtrip() {
        let millis = 1_700_000_000_123;
        assert_eq!(parse_date(&format_date(millis)), Some(millis));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<&str>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
    }
}
