//! Binary encoding of cells and type descriptors.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for encoding and decoding
//! - [`stream`]: Big-endian [`DataInput`]/[`DataOutput`] wrappers
//!
//! Every cell starts with a one-byte null flag. What follows depends on the
//! declared storage: `BINARY_STRING` cells are length-prefixed bytes,
//! `INDEXED` cells a single int32 dictionary position, and `NORMAL` cells the
//! native encoding of their type. A `NORMAL` map cell is self-describing:
//!
//! ```text
//! byte   null flag (1 = null, stop)
//! int32  entry count N
//! int32  key type tag
//! int32  value type tag
//! N x    key cell, value cell
//! ```

pub mod error;
pub mod stream;

use std::io::{Read, Write};

pub use error::CodecError;
pub use stream::{DataInput, DataOutput};

/// Deepest map-within-map nesting accepted in cells and descriptors.
pub const MAX_DEPTH: usize = 64;

use crate::logging::trace;
use crate::value::{
    MapValue, MapValueType, ScalarKind, ScalarMeta, Storage, StorageKind, TypeRegistry, Value,
    ValueMeta, tags,
};

/// Binary reader and writer for single cells.
///
/// Decoding rebuilds element types from the tags embedded in map cells, so
/// the codec borrows the [`TypeRegistry`] that knows those tags.
///
/// # Example
///
/// ```
/// use rowmap::codec::CellCodec;
/// use rowmap::value::{MapValue, TypeRegistry, Value, ValueMeta};
///
/// let registry = TypeRegistry::with_builtins();
/// let codec = CellCodec::new(&registry);
/// let meta = ValueMeta::map(ValueMeta::string(), ValueMeta::integer());
///
/// let mut map = MapValue::new();
/// map.insert("a", 1i64);
/// let bytes = codec.encode(&meta, &Value::Map(map.clone())).unwrap();
/// assert_eq!(codec.decode(&meta, &bytes).unwrap(), Value::Map(map));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CellCodec<'a> {
    registry: &'a TypeRegistry,
}

impl<'a> CellCodec<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Encode one cell into a fresh buffer.
    pub fn encode(&self, meta: &ValueMeta, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = DataOutput::new(Vec::new());
        self.write(&mut out, meta, value)?;
        Ok(out.into_inner())
    }

    /// Decode one cell from a buffer. Trailing bytes are ignored.
    pub fn decode(&self, meta: &ValueMeta, bytes: &[u8]) -> Result<Value, CodecError> {
        self.read(&mut DataInput::new(bytes), meta)
    }

    /// Write one cell.
    ///
    /// The value's runtime shape must match the declared storage: a
    /// `NORMAL` map type accepts only [`Value::Map`] (or null), a
    /// `BINARY_STRING` type only [`Value::BinaryString`] and an `INDEXED`
    /// type only [`Value::Index`]. Anything else is a
    /// [`CodecError::ContractViolation`].
    pub fn write<W: Write>(
        &self,
        out: &mut DataOutput<W>,
        meta: &ValueMeta,
        value: &Value,
    ) -> Result<(), CodecError> {
        self.write_cell(out, meta, value, 0)
    }

    fn write_cell<W: Write>(
        &self,
        out: &mut DataOutput<W>,
        meta: &ValueMeta,
        value: &Value,
        depth: usize,
    ) -> Result<(), CodecError> {
        check_depth(depth)?;
        out.write_bool(value.is_null())?;
        if value.is_null() {
            return Ok(());
        }
        match (meta.storage(), value) {
            (Storage::BinaryString, Value::BinaryString(bytes)) => out.write_bytes(bytes),
            (Storage::Indexed(_), Value::Index(index)) => out.write_i32(*index),
            (Storage::Normal, _) => match meta {
                ValueMeta::Scalar(scalar) => write_scalar(out, scalar, meta, value),
                ValueMeta::Map(map_type) => self.write_map(out, map_type, meta, value, depth),
            },
            _ => Err(violation(meta, value)),
        }
    }

    fn write_map<W: Write>(
        &self,
        out: &mut DataOutput<W>,
        map_type: &MapValueType,
        meta: &ValueMeta,
        value: &Value,
        depth: usize,
    ) -> Result<(), CodecError> {
        let Value::Map(map) = value else {
            return Err(violation(meta, value));
        };
        // Stored keys can resolve to the same native key, so the count is
        // taken after conversion.
        let mut native = MapValue::with_capacity(map.len());
        for (k, v) in map {
            native.insert(
                map_type.key_meta().to_native(k)?.into_owned(),
                map_type.value_meta().to_native(v)?.into_owned(),
            );
        }
        let key_meta = map_type.key_meta().as_normal();
        let value_meta = map_type.value_meta().as_normal();
        out.write_len(native.len())?;
        out.write_i32(key_meta.type_tag())?;
        out.write_i32(value_meta.type_tag())?;
        for (k, v) in &native {
            self.write_cell(out, &key_meta, k, depth + 1)?;
            self.write_cell(out, &value_meta, v, depth + 1)?;
        }
        Ok(())
    }

    /// Read one cell.
    ///
    /// End of input before the first byte of the cell is
    /// [`CodecError::EndOfStream`]; end of input anywhere after that is
    /// [`CodecError::Truncated`].
    pub fn read<R: Read>(&self, input: &mut DataInput<R>, meta: &ValueMeta) -> Result<Value, CodecError> {
        let start = input.position();
        self.read_cell(input, meta, 0).map_err(|e| match e {
            CodecError::Truncated { .. } if input.position() == start => CodecError::EndOfStream,
            other => other,
        })
    }

    fn read_cell<R: Read>(
        &self,
        input: &mut DataInput<R>,
        meta: &ValueMeta,
        depth: usize,
    ) -> Result<Value, CodecError> {
        check_depth(depth)?;
        if input.read_bool()? {
            return Ok(Value::Null);
        }
        match meta {
            _ if meta.storage_kind() == StorageKind::BinaryString => {
                Ok(Value::BinaryString(input.read_bytes()?))
            }
            _ if meta.storage_kind() == StorageKind::Indexed => Ok(Value::Index(input.read_i32()?)),
            ValueMeta::Scalar(scalar) => read_scalar(input, scalar.kind),
            ValueMeta::Map(_) => self.read_map(input, depth).map(Value::Map),
        }
    }

    fn read_map<R: Read>(&self, input: &mut DataInput<R>, depth: usize) -> Result<MapValue, CodecError> {
        let count = input.read_len()?;
        let key_meta = self.resolve(input.read_i32()?)?;
        let value_meta = self.resolve(input.read_i32()?)?;
        let mut map = MapValue::with_capacity(count.min(1024));
        for _ in 0..count {
            let key = self.read_cell(input, &key_meta, depth + 1)?;
            let value = self.read_cell(input, &value_meta, depth + 1)?;
            map.insert(key, value);
        }
        trace!(entries = count, key = %key_meta, value = %value_meta, "decoded map cell");
        Ok(map)
    }

    fn resolve(&self, tag: i32) -> Result<ValueMeta, CodecError> {
        self.registry
            .resolve(tag)
            .ok_or(CodecError::UnresolvedType(tag))
    }

    /// Write a type descriptor: tag, storage code, the dictionary of indexed
    /// storage, then the element descriptors of a map type.
    pub fn write_descriptor<W: Write>(
        &self,
        out: &mut DataOutput<W>,
        meta: &ValueMeta,
    ) -> Result<(), CodecError> {
        self.write_descriptor_at(out, meta, 0)
    }

    fn write_descriptor_at<W: Write>(
        &self,
        out: &mut DataOutput<W>,
        meta: &ValueMeta,
        depth: usize,
    ) -> Result<(), CodecError> {
        check_depth(depth)?;
        out.write_i32(meta.type_tag())?;
        out.write_i32(meta.storage_kind().code())?;
        if let Some(dictionary) = meta.storage().dictionary() {
            out.write_len(dictionary.len())?;
            for entry in dictionary {
                out.write_string(entry)?;
            }
        }
        if let ValueMeta::Map(map_type) = meta {
            self.write_descriptor_at(out, map_type.key_meta(), depth + 1)?;
            self.write_descriptor_at(out, map_type.value_meta(), depth + 1)?;
        }
        Ok(())
    }

    /// Read a type descriptor written by [`write_descriptor`](Self::write_descriptor).
    pub fn read_descriptor<R: Read>(&self, input: &mut DataInput<R>) -> Result<ValueMeta, CodecError> {
        self.read_descriptor_at(input, 0)
    }

    fn read_descriptor_at<R: Read>(
        &self,
        input: &mut DataInput<R>,
        depth: usize,
    ) -> Result<ValueMeta, CodecError> {
        check_depth(depth)?;
        let tag = input.read_i32()?;
        let code = input.read_i32()?;
        let mut meta = self.resolve(tag)?;
        let storage = match StorageKind::from_code(code) {
            Some(StorageKind::Normal) => Storage::Normal,
            Some(StorageKind::BinaryString) => Storage::BinaryString,
            Some(StorageKind::Indexed) => {
                let len = input.read_len()?;
                let mut entries = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    entries.push(input.read_string()?);
                }
                Storage::Indexed(entries.into())
            }
            None => return Err(CodecError::UnknownStorageKind(code)),
        };
        if tag == tags::MAP {
            let key = self.read_descriptor_at(input, depth + 1)?;
            let value = self.read_descriptor_at(input, depth + 1)?;
            let map_type = meta.as_map_mut().ok_or_else(|| {
                CodecError::Corrupt(format!("tag {} does not resolve to a map type", tag))
            })?;
            map_type.set_key_meta(key);
            map_type.set_value_meta(value);
        }
        Ok(meta.with_storage(storage))
    }
}

fn check_depth(depth: usize) -> Result<(), CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::Corrupt(format!(
            "nesting too deep (more than {} levels)",
            MAX_DEPTH
        )));
    }
    Ok(())
}

fn violation(meta: &ValueMeta, value: &Value) -> CodecError {
    CodecError::ContractViolation {
        expected: meta.to_string(),
        actual: value.type_name(),
    }
}

fn write_scalar<W: Write>(
    out: &mut DataOutput<W>,
    scalar: &ScalarMeta,
    meta: &ValueMeta,
    value: &Value,
) -> Result<(), CodecError> {
    match (scalar.kind, value) {
        (ScalarKind::Number, Value::Number(n)) => out.write_f64(*n),
        (ScalarKind::String, Value::String(s)) | (ScalarKind::BigNumber, Value::BigNumber(s)) => {
            out.write_string(s)
        }
        (ScalarKind::Date, Value::Date(ms)) | (ScalarKind::Integer, Value::Integer(ms)) => {
            out.write_i64(*ms)
        }
        (ScalarKind::Boolean, Value::Boolean(b)) => out.write_bool(*b),
        (ScalarKind::Binary, Value::Binary(bytes)) => out.write_bytes(bytes),
        _ => Err(violation(meta, value)),
    }
}

fn read_scalar<R: Read>(input: &mut DataInput<R>, kind: ScalarKind) -> Result<Value, CodecError> {
    Ok(match kind {
        ScalarKind::Number => Value::Number(input.read_f64()?),
        ScalarKind::String => Value::String(input.read_string()?),
        ScalarKind::Date => Value::Date(input.read_i64()?),
        ScalarKind::Boolean => Value::Boolean(input.read_bool()?),
        ScalarKind::Integer => Value::Integer(input.read_i64()?),
        ScalarKind::BigNumber => Value::BigNumber(input.read_string()?),
        ScalarKind::Binary => Value::Binary(input.read_bytes()?),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_builtins()
    }

    fn string_map() -> ValueMeta {
        ValueMeta::map(ValueMeta::string(), ValueMeta::string())
    }

    #[test]
    fn test_null_map_is_one_byte() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        assert_eq!(codec.encode(&string_map(), &Value::Null).unwrap(), vec![1]);
        assert_eq!(codec.decode(&string_map(), &[1]).unwrap(), Value::Null);
    }

    #[test]
    fn test_empty_map_layout() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let bytes = codec
            .encode(&string_map(), &Value::Map(MapValue::new()))
            .unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 2]);
        assert_eq!(
            codec.decode(&string_map(), &bytes).unwrap(),
            Value::Map(MapValue::new())
        );
    }

    #[test]
    fn test_single_entry_layout() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let mut map = MapValue::new();
        map.insert("k", "v");
        let bytes = codec.encode(&string_map(), &Value::Map(map)).unwrap();
        #[rustfmt::skip]
        let expected = vec![
            0,
            0, 0, 0, 1,
            0, 0, 0, 2,
            0, 0, 0, 2,
            0, 0, 0, 0, 1, b'k',
            0, 0, 0, 0, 1, b'v',
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_null_entry_value() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let mut map = MapValue::new();
        map.insert("k", Value::Null);
        let bytes = codec.encode(&string_map(), &Value::Map(map.clone())).unwrap();
        assert_eq!(bytes.last(), Some(&1));
        assert_eq!(codec.decode(&string_map(), &bytes).unwrap(), Value::Map(map));
    }

    #[test]
    fn test_binary_string_and_indexed_cells() {
        let reg = registry();
        let codec = CellCodec::new(&reg);

        let binary = string_map().with_storage(Storage::BinaryString);
        let cell = Value::BinaryString(b"a=1".to_vec());
        let bytes = codec.encode(&binary, &cell).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 3, b'a', b'=', b'1']);
        assert_eq!(codec.decode(&binary, &bytes).unwrap(), cell);

        let indexed = string_map().with_storage(Storage::indexed(["a=1", "b=2"]));
        let bytes = codec.encode(&indexed, &Value::Index(1)).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 0, 1]);
        assert_eq!(codec.decode(&indexed, &bytes).unwrap(), Value::Index(1));
    }

    #[test]
    fn test_entries_written_in_native_form() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let key = ValueMeta::string().with_storage(Storage::indexed(["x", "y"]));
        let value = ValueMeta::integer().with_storage(Storage::BinaryString);
        let meta = ValueMeta::map(key, value);

        let mut stored = MapValue::new();
        stored.insert(Value::Index(1), Value::BinaryString(b"42".to_vec()));
        let bytes = codec.encode(&meta, &Value::Map(stored)).unwrap();

        let mut native = MapValue::new();
        native.insert("y", 42i64);
        assert_eq!(codec.decode(&meta, &bytes).unwrap(), Value::Map(native));
        assert_eq!(bytes.get(9..13), Some(&[0, 0, 0, 5][..]));
    }

    #[test]
    fn test_nested_map() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let inner_meta = ValueMeta::map(ValueMeta::string(), ValueMeta::boolean());
        let meta = ValueMeta::map(ValueMeta::integer(), inner_meta);

        let inner: MapValue = [("on", true)].into_iter().collect();
        let outer: MapValue = [(1i64, Value::Map(inner))].into_iter().collect();
        let bytes = codec.encode(&meta, &Value::Map(outer.clone())).unwrap();
        assert_eq!(codec.decode(&meta, &bytes).unwrap(), Value::Map(outer));
    }

    #[test]
    fn test_wrong_shape_is_contract_violation() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let err = codec.encode(&string_map(), &Value::from("a=1")).unwrap_err();
        match err {
            CodecError::ContractViolation { expected, actual } => {
                assert_eq!(expected, "Map<String, String>");
                assert_eq!(actual, "String");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let binary = string_map().with_storage(Storage::BinaryString);
        assert!(matches!(
            codec.encode(&binary, &Value::Map(MapValue::new())),
            Err(CodecError::ContractViolation { .. })
        ));
    }

    #[test]
    fn test_end_of_stream_vs_truncated() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        assert!(matches!(
            codec.decode(&string_map(), &[]),
            Err(CodecError::EndOfStream)
        ));
        assert!(matches!(
            codec.decode(&string_map(), &[0, 0, 0]),
            Err(CodecError::Truncated { .. })
        ));

        let mut map = MapValue::new();
        map.insert("k", "v");
        let bytes = codec.encode(&string_map(), &Value::Map(map)).unwrap();
        for cut in 1..bytes.len() {
            let err = codec.decode(&string_map(), &bytes[..cut]).unwrap_err();
            assert!(
                matches!(err, CodecError::Truncated { .. }),
                "cut at {cut}: {err:?}"
            );
        }
    }

    #[test]
    fn test_unknown_tag_is_unresolved() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let bytes = [0, 0, 0, 0, 1, 0, 0, 0, 99, 0, 0, 0, 2];
        assert!(matches!(
            codec.decode(&string_map(), &bytes),
            Err(CodecError::UnresolvedType(99))
        ));
    }

    #[test]
    fn test_deep_nesting_is_corrupt() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        // Each level: present, one entry, key tag MAP, value tag STRING.
        let level = [0, 0, 0, 0, 1, 0, 0, 2, 115, 0, 0, 0, 2];
        let bytes: Vec<u8> = level.iter().copied().cycle().take(level.len() * 10_000).collect();
        let err = codec.decode(&ValueMeta::default_map(), &bytes).unwrap_err();
        assert!(matches!(&err, CodecError::Corrupt(msg) if msg.contains("too deep")), "{err:?}");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_deep_descriptor_is_corrupt() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        // tag MAP, storage NORMAL, repeated: every key descriptor is another map.
        let level = [0, 0, 2, 115, 0, 0, 0, 0];
        let bytes: Vec<u8> = level.iter().copied().cycle().take(level.len() * 10_000).collect();
        let err = codec.read_descriptor(&mut DataInput::new(bytes.as_slice())).unwrap_err();
        assert!(matches!(&err, CodecError::Corrupt(msg) if msg.contains("too deep")), "{err:?}");
    }

    #[test]
    fn test_nesting_within_limit() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let mut meta = ValueMeta::string();
        let mut value = Value::from("leaf");
        for _ in 0..MAX_DEPTH {
            meta = ValueMeta::map(ValueMeta::integer(), meta);
            value = Value::Map([(0i64, value)].into_iter().collect());
        }
        let bytes = codec.encode(&meta, &value).unwrap();
        assert_eq!(codec.decode(&meta, &bytes).unwrap(), value);

        let too_deep = ValueMeta::map(ValueMeta::integer(), meta);
        let value = Value::Map([(0i64, value)].into_iter().collect());
        assert!(matches!(
            codec.encode(&too_deep, &value),
            Err(CodecError::Corrupt(_))
        ));
    }

    #[test]
    fn test_colliding_stored_keys_write_one_entry() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let key = ValueMeta::string().with_storage(Storage::indexed(["red"]));
        let meta = ValueMeta::map(key, ValueMeta::integer());

        let mut map = MapValue::new();
        map.insert(Value::Index(0), 1i64);
        map.insert("red", 1i64);
        assert_eq!(map.len(), 2);

        let bytes = codec.encode(&meta, &Value::Map(map)).unwrap();
        assert_eq!(bytes.get(1..5), Some(&[0, 0, 0, 1][..]));
        let decoded = codec.decode(&meta, &bytes).unwrap();
        assert_eq!(decoded.as_map().map(MapValue::len), Some(1));
    }

    #[test]
    fn test_corrupt_null_flag() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        assert!(matches!(
            codec.decode(&string_map(), &[7]),
            Err(CodecError::Corrupt(_))
        ));
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let meta = ValueMeta::map(
            ValueMeta::string().with_storage(Storage::indexed(["a", "b"])),
            ValueMeta::map(ValueMeta::date(), ValueMeta::number()),
        )
        .with_storage(Storage::BinaryString);

        let mut out = DataOutput::new(Vec::new());
        codec.write_descriptor(&mut out, &meta).unwrap();
        let bytes = out.into_inner();
        let decoded = codec.read_descriptor(&mut DataInput::new(bytes.as_slice())).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_descriptor_unknown_storage() {
        let reg = registry();
        let codec = CellCodec::new(&reg);
        let bytes = [0, 0, 0, 2, 0, 0, 0, 9];
        assert!(matches!(
            codec.read_descriptor(&mut DataInput::new(&bytes[..])),
            Err(CodecError::UnknownStorageKind(9))
        ));
    }
}
