//! Map payloads and the map value type.

use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map;

use super::error::ValueError;
use super::meta::{Storage, StorageKind, ValueMeta};
use super::text;
use super::Value;

/// Key/value payload of a map cell.
///
/// Keys are unique under [`Value`] equality. Iteration order is unspecified
/// and must not be relied upon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapValue {
    entries: HashMap<Value, Value>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Insert an entry, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, Value, Value> {
        self.entries.iter()
    }

    /// Native rendering: `key=value` entries joined by `", "`, no braces.
    /// Null keys or values render as `null`.
    pub fn to_native_string(&self) -> String {
        join_entries(
            self.iter()
                .map(|(k, v)| (native_or_null(k.to_text()), native_or_null(v.to_text()))),
        )
    }
}

fn native_or_null(text: Option<String>) -> String {
    text.unwrap_or_else(|| "null".to_string())
}

fn join_entries(entries: impl Iterator<Item = (String, String)>) -> String {
    entries
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'a> IntoIterator for &'a MapValue {
    type Item = (&'a Value, &'a Value);
    type IntoIter = hash_map::Iter<'a, Value, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for MapValue {
    type Item = (Value, Value);
    type IntoIter = hash_map::IntoIter<Value, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for MapValue {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<Value>, V: Into<Value>> Extend<(K, V)> for MapValue {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        self.entries
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

/// Descriptor of a map-typed cell.
///
/// Holds the element types of keys and values plus the storage of the cell
/// itself. Both element types default to the generic textual type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapValueType {
    key: Box<ValueMeta>,
    value: Box<ValueMeta>,
    storage: Storage,
}

impl MapValueType {
    pub fn new(key: ValueMeta, value: ValueMeta) -> Self {
        Self {
            key: Box::new(key),
            value: Box::new(value),
            storage: Storage::Normal,
        }
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn key_meta(&self) -> &ValueMeta {
        &self.key
    }

    pub fn value_meta(&self) -> &ValueMeta {
        &self.value
    }

    pub fn set_key_meta(&mut self, key: ValueMeta) {
        self.key = Box::new(key);
    }

    pub fn set_value_meta(&mut self, value: ValueMeta) {
        self.value = Box::new(value);
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn set_storage(&mut self, storage: Storage) {
        self.storage = storage;
    }

    fn name(&self) -> String {
        match self.storage.kind() {
            StorageKind::Normal => format!("Map<{}, {}>", self.key, self.value),
            kind => format!("Map<{}, {}>({})", self.key, self.value, kind.name()),
        }
    }

    /// Resolve a cell value to a map.
    ///
    /// Maps are returned borrowed and null stays null. Text in any storage
    /// form (plain, binary string, dictionary position) is parsed with the
    /// textual map syntax. Every other value type fails with a conversion
    /// error naming the source type.
    pub fn get_map<'v>(&self, value: &'v Value) -> Result<Option<Cow<'v, MapValue>>, ValueError> {
        let text = match value {
            Value::Null => return Ok(None),
            Value::Map(map) => return Ok(Some(Cow::Borrowed(map))),
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::BinaryString(bytes) => Cow::Borrowed(
                std::str::from_utf8(bytes).map_err(|_| ValueError::InvalidText(self.name()))?,
            ),
            Value::Index(i) => Cow::Owned(self.storage.entry(*i, || self.name())?.to_string()),
            other => {
                return Err(ValueError::conversion(
                    self.name(),
                    describe_source(other),
                    "a map",
                ));
            }
        };
        Ok(text::parse_map(Some(&*text)).map(Cow::Owned))
    }

    /// Render a map cell as `key=value` entries joined by `", "`.
    ///
    /// Keys and values use their element type's text form. A null cell is an
    /// error: callers check nullability first.
    pub fn get_string(&self, value: &Value) -> Result<String, ValueError> {
        let map = self
            .get_map(value)?
            .ok_or_else(|| ValueError::NullValue(self.name()))?;
        let mut entries = Vec::with_capacity(map.len());
        for (k, v) in map.iter() {
            let key = self.key.get_string(k)?;
            let value = self.value.get_string(v)?;
            entries.push((native_or_null(key), native_or_null(value)));
        }
        Ok(join_entries(entries.into_iter()))
    }

    pub fn get_number(&self, _value: &Value) -> Result<Option<f64>, ValueError> {
        Err(ValueError::unsupported(self.name(), "a number"))
    }

    pub fn get_integer(&self, _value: &Value) -> Result<Option<i64>, ValueError> {
        Err(ValueError::unsupported(self.name(), "an integer"))
    }

    pub fn get_big_number(&self, _value: &Value) -> Result<Option<String>, ValueError> {
        Err(ValueError::unsupported(self.name(), "a big number"))
    }

    pub fn get_boolean(&self, _value: &Value) -> Result<Option<bool>, ValueError> {
        Err(ValueError::unsupported(self.name(), "a boolean"))
    }

    pub fn get_date(&self, _value: &Value) -> Result<Option<i64>, ValueError> {
        Err(ValueError::unsupported(self.name(), "a date"))
    }

    /// Convert a value of another type into a map.
    ///
    /// Text is parsed and resets both element types to the generic textual
    /// type, since the text form carries no type information. Maps pass
    /// through unchanged.
    pub fn convert(&mut self, from: &ValueMeta, value: &Value) -> Result<Option<MapValue>, ValueError> {
        match from {
            ValueMeta::Map(source) => Ok(source.get_map(value)?.map(Cow::into_owned)),
            textual if textual.is_textual() => {
                let text = textual.get_string(value)?;
                let map = text::parse_map(text.as_deref());
                self.key = Box::new(ValueMeta::string());
                self.value = Box::new(ValueMeta::string());
                Ok(map)
            }
            other => Err(ValueError::conversion(
                self.name(),
                other.to_string(),
                "a map",
            )),
        }
    }

    /// Structural copy of a map cell. The copy shares no state with the
    /// source.
    pub fn clone_value(&self, value: &Value) -> Result<Option<MapValue>, ValueError> {
        self.get_map(value)
            .map(|map| map.map(Cow::into_owned))
            .map_err(|e| ValueError::Clone {
                type_name: self.name(),
                source: Box::new(e),
            })
    }
}

fn describe_source(value: &Value) -> &'static str {
    match value {
        Value::Number(_) => "a number",
        Value::Integer(_) => "an integer",
        Value::BigNumber(_) => "a big number",
        Value::Boolean(_) => "a boolean",
        Value::Date(_) => "a date",
        Value::Binary(_) => "binary data",
        other => other.type_name(),
    }
}
