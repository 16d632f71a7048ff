//! Element type descriptors.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use super::error::ValueError;
use super::map::MapValueType;
use super::text;
use super::{Value, parse_date, tags};

/// How a value is physically held in a row cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// A live native value.
    Normal,
    /// Text kept as undecoded bytes.
    BinaryString,
    /// A position in a shared dictionary of distinct textual forms.
    Indexed,
}

impl StorageKind {
    /// Wire code of this storage kind.
    pub const fn code(self) -> i32 {
        match self {
            StorageKind::Normal => 0,
            StorageKind::BinaryString => 1,
            StorageKind::Indexed => 2,
        }
    }

    /// Storage kind for a wire code, `None` if the code is unknown.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(StorageKind::Normal),
            1 => Some(StorageKind::BinaryString),
            2 => Some(StorageKind::Indexed),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            StorageKind::Normal => "normal",
            StorageKind::BinaryString => "binary-string",
            StorageKind::Indexed => "indexed",
        }
    }
}

/// Storage kind plus the data it needs: indexed storage owns its dictionary.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Storage {
    #[default]
    Normal,
    BinaryString,
    Indexed(Arc<[String]>),
}

impl Storage {
    pub fn indexed<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Storage::Indexed(entries.into_iter().map(Into::into).collect())
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::Normal => StorageKind::Normal,
            Storage::BinaryString => StorageKind::BinaryString,
            Storage::Indexed(_) => StorageKind::Indexed,
        }
    }

    pub fn dictionary(&self) -> Option<&[String]> {
        match self {
            Storage::Indexed(entries) => Some(entries),
            _ => None,
        }
    }

    /// Dictionary entry at `index`; `type_name` labels the error when there
    /// is no dictionary.
    pub(crate) fn entry(&self, index: i32, type_name: impl FnOnce() -> String) -> Result<&str, ValueError> {
        let dictionary = self
            .dictionary()
            .ok_or_else(|| ValueError::MissingDictionary(type_name()))?;
        usize::try_from(index)
            .ok()
            .and_then(|i| dictionary.get(i))
            .map(String::as_str)
            .ok_or(ValueError::IndexOutOfRange {
                index: i64::from(index),
                size: dictionary.len(),
            })
    }
}

/// Scalar element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Number,
    String,
    Date,
    Boolean,
    Integer,
    BigNumber,
    Binary,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 7] = [
        ScalarKind::Number,
        ScalarKind::String,
        ScalarKind::Date,
        ScalarKind::Boolean,
        ScalarKind::Integer,
        ScalarKind::BigNumber,
        ScalarKind::Binary,
    ];

    pub const fn tag(self) -> i32 {
        match self {
            ScalarKind::Number => tags::NUMBER,
            ScalarKind::String => tags::STRING,
            ScalarKind::Date => tags::DATE,
            ScalarKind::Boolean => tags::BOOLEAN,
            ScalarKind::Integer => tags::INTEGER,
            ScalarKind::BigNumber => tags::BIG_NUMBER,
            ScalarKind::Binary => tags::BINARY,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ScalarKind::Number => "Number",
            ScalarKind::String => "String",
            ScalarKind::Date => "Date",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Integer => "Integer",
            ScalarKind::BigNumber => "BigNumber",
            ScalarKind::Binary => "Binary",
        }
    }

    /// Parse the textual form of a value of this kind.
    ///
    /// Booleans follow the lenient convention: `Y`, `YES`, `TRUE` and `1`
    /// are true, anything else is false.
    pub fn parse_text(self, text: &str) -> Result<Value, ValueError> {
        let value = match self {
            ScalarKind::String => Value::String(text.to_string()),
            ScalarKind::BigNumber => Value::BigNumber(text.trim().to_string()),
            ScalarKind::Binary => Value::Binary(text.as_bytes().to_vec()),
            ScalarKind::Number => Value::Number(
                text.trim()
                    .parse()
                    .map_err(|_| ValueError::conversion(self.name(), quoted(text), "a number"))?,
            ),
            ScalarKind::Integer => Value::Integer(
                text.trim()
                    .parse()
                    .map_err(|_| ValueError::conversion(self.name(), quoted(text), "an integer"))?,
            ),
            ScalarKind::Date => Value::Date(
                parse_date(text)
                    .ok_or_else(|| ValueError::conversion(self.name(), quoted(text), "a date"))?,
            ),
            ScalarKind::Boolean => {
                let t = text.trim();
                Value::Boolean(
                    ["Y", "YES", "TRUE", "1"]
                        .iter()
                        .any(|truthy| t.eq_ignore_ascii_case(truthy)),
                )
            }
        };
        Ok(value)
    }
}

fn quoted(text: &str) -> String {
    format!("text '{}'", text)
}

/// Descriptor for a scalar element.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarMeta {
    pub kind: ScalarKind,
    pub storage: Storage,
}

/// Element type descriptor: the closed set of value types a row cell, a map
/// key or a map value can have.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueMeta {
    Scalar(ScalarMeta),
    Map(MapValueType),
}

impl Default for ValueMeta {
    fn default() -> Self {
        ValueMeta::string()
    }
}

impl ValueMeta {
    pub fn scalar(kind: ScalarKind) -> Self {
        ValueMeta::Scalar(ScalarMeta {
            kind,
            storage: Storage::Normal,
        })
    }

    /// The generic textual type.
    pub fn string() -> Self {
        Self::scalar(ScalarKind::String)
    }

    pub fn integer() -> Self {
        Self::scalar(ScalarKind::Integer)
    }

    pub fn number() -> Self {
        Self::scalar(ScalarKind::Number)
    }

    pub fn boolean() -> Self {
        Self::scalar(ScalarKind::Boolean)
    }

    pub fn date() -> Self {
        Self::scalar(ScalarKind::Date)
    }

    pub fn big_number() -> Self {
        Self::scalar(ScalarKind::BigNumber)
    }

    pub fn binary() -> Self {
        Self::scalar(ScalarKind::Binary)
    }

    pub fn map(key: ValueMeta, value: ValueMeta) -> Self {
        ValueMeta::Map(MapValueType::new(key, value))
    }

    /// Map with textual keys and values.
    pub fn default_map() -> Self {
        ValueMeta::Map(MapValueType::default())
    }

    /// Replace the storage of this descriptor.
    pub fn with_storage(mut self, storage: Storage) -> Self {
        match &mut self {
            ValueMeta::Scalar(s) => s.storage = storage,
            ValueMeta::Map(m) => m.set_storage(storage),
        }
        self
    }

    /// Same type with `NORMAL` storage.
    pub fn as_normal(&self) -> Self {
        self.clone().with_storage(Storage::Normal)
    }

    pub fn type_tag(&self) -> i32 {
        match self {
            ValueMeta::Scalar(s) => s.kind.tag(),
            ValueMeta::Map(_) => tags::MAP,
        }
    }

    pub fn storage(&self) -> &Storage {
        match self {
            ValueMeta::Scalar(s) => &s.storage,
            ValueMeta::Map(m) => m.storage(),
        }
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage().kind()
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ValueMeta::Scalar(ScalarMeta {
                kind: ScalarKind::String,
                ..
            })
        )
    }

    pub fn as_map(&self) -> Option<&MapValueType> {
        match self {
            ValueMeta::Map(m) => Some(m),
            ValueMeta::Scalar(_) => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut MapValueType> {
        match self {
            ValueMeta::Map(m) => Some(m),
            ValueMeta::Scalar(_) => None,
        }
    }

    /// Text behind a dictionary position.
    pub fn dictionary_entry(&self, index: i32) -> Result<&str, ValueError> {
        self.storage().entry(index, || self.to_string())
    }

    /// Parse a textual form into a native value of this type.
    pub fn parse_text(&self, text: &str) -> Result<Value, ValueError> {
        match self {
            ValueMeta::Scalar(s) => s.kind.parse_text(text),
            ValueMeta::Map(_) => Ok(text::parse_map(Some(text)).map_or(Value::Null, Value::Map)),
        }
    }

    /// Raw text behind a storage representation, without parsing it.
    fn storage_text<'v>(&'v self, value: &'v Value) -> Result<Option<Cow<'v, str>>, ValueError> {
        match value {
            Value::BinaryString(bytes) => std::str::from_utf8(bytes)
                .map(|s| Some(Cow::Borrowed(s)))
                .map_err(|_| ValueError::InvalidText(self.to_string())),
            Value::Index(i) => self.dictionary_entry(*i).map(|s| Some(Cow::Borrowed(s))),
            other => Ok(other.to_text().map(Cow::Owned)),
        }
    }

    /// Convert a cell value to its native form.
    ///
    /// Binary strings and dictionary positions are resolved to text and
    /// parsed as this type; native values are returned as they are.
    pub fn to_native<'v>(&self, value: &'v Value) -> Result<Cow<'v, Value>, ValueError> {
        match value {
            Value::BinaryString(_) | Value::Index(_) => match self.storage_text(value)? {
                Some(text) => Ok(Cow::Owned(self.parse_text(&text)?)),
                None => Ok(Cow::Owned(Value::Null)),
            },
            native => Ok(Cow::Borrowed(native)),
        }
    }

    /// Text form of a cell value, `None` for null.
    pub fn get_string(&self, value: &Value) -> Result<Option<String>, ValueError> {
        match self {
            ValueMeta::Map(m) if !value.is_null() => m.get_string(value).map(Some),
            _ => Ok(self.storage_text(value)?.map(Cow::into_owned)),
        }
    }

    /// Numeric projection of a cell value, `None` for null.
    pub fn get_number(&self, value: &Value) -> Result<Option<f64>, ValueError> {
        if let ValueMeta::Map(m) = self {
            return m.get_number(value);
        }
        match self.to_native(value)?.as_ref() {
            Value::Null => Ok(None),
            Value::Number(n) => Ok(Some(*n)),
            Value::Integer(i) | Value::Date(i) => Ok(Some(*i as f64)),
            Value::Boolean(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
            Value::String(s) | Value::BigNumber(s) => ScalarKind::Number
                .parse_text(s)
                .map(|v| match v {
                    Value::Number(n) => Some(n),
                    _ => None,
                }),
            other => Err(ValueError::conversion(
                self.to_string(),
                other.type_name(),
                "a number",
            )),
        }
    }

    /// Integer projection of a cell value, `None` for null.
    pub fn get_integer(&self, value: &Value) -> Result<Option<i64>, ValueError> {
        if let ValueMeta::Map(m) = self {
            return m.get_integer(value);
        }
        match self.to_native(value)?.as_ref() {
            Value::Null => Ok(None),
            Value::Integer(i) | Value::Date(i) => Ok(Some(*i)),
            Value::Number(n) => Ok(Some(n.round() as i64)),
            Value::Boolean(b) => Ok(Some(i64::from(*b))),
            Value::String(s) | Value::BigNumber(s) => ScalarKind::Integer
                .parse_text(s)
                .map(|v| match v {
                    Value::Integer(i) => Some(i),
                    _ => None,
                }),
            other => Err(ValueError::conversion(
                self.to_string(),
                other.type_name(),
                "an integer",
            )),
        }
    }

    /// Boolean projection of a cell value, `None` for null.
    pub fn get_boolean(&self, value: &Value) -> Result<Option<bool>, ValueError> {
        if let ValueMeta::Map(m) = self {
            return m.get_boolean(value);
        }
        match self.to_native(value)?.as_ref() {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            Value::Integer(i) => Ok(Some(*i != 0)),
            Value::Number(n) => Ok(Some(*n != 0.0)),
            Value::String(s) => ScalarKind::Boolean
                .parse_text(s)
                .map(|v| Some(matches!(v, Value::Boolean(true)))),
            other => Err(ValueError::conversion(
                self.to_string(),
                other.type_name(),
                "a boolean",
            )),
        }
    }

    /// Date projection (epoch milliseconds) of a cell value, `None` for null.
    pub fn get_date(&self, value: &Value) -> Result<Option<i64>, ValueError> {
        if let ValueMeta::Map(m) = self {
            return m.get_date(value);
        }
        match self.to_native(value)?.as_ref() {
            Value::Null => Ok(None),
            Value::Date(ms) | Value::Integer(ms) => Ok(Some(*ms)),
            Value::String(s) => ScalarKind::Date.parse_text(s).map(|v| match v {
                Value::Date(ms) => Some(ms),
                _ => None,
            }),
            other => Err(ValueError::conversion(
                self.to_string(),
                other.type_name(),
                "a date",
            )),
        }
    }

    /// Decimal text projection of a cell value, `None` for null.
    pub fn get_big_number(&self, value: &Value) -> Result<Option<String>, ValueError> {
        if let ValueMeta::Map(m) = self {
            return m.get_big_number(value);
        }
        match self.to_native(value)?.as_ref() {
            Value::Null => Ok(None),
            Value::BigNumber(s) => Ok(Some(s.clone())),
            Value::Integer(i) => Ok(Some(i.to_string())),
            Value::Number(n) => Ok(Some(n.to_string())),
            Value::String(s) => ScalarKind::Number
                .parse_text(s)
                .map(|_| Some(s.trim().to_string())),
            other => Err(ValueError::conversion(
                self.to_string(),
                other.type_name(),
                "a big number",
            )),
        }
    }
}

impl fmt::Display for ValueMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueMeta::Scalar(s) => write!(f, "{}", s.kind.name())?,
            ValueMeta::Map(m) => write!(f, "Map<{}, {}>", m.key_meta(), m.value_meta())?,
        }
        match self.storage_kind() {
            StorageKind::Normal => Ok(()),
            kind => write!(f, "({})", kind.name()),
        }
    }
}
