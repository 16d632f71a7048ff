//! Binary row stream.
//!
//! Carries rows across a byte boundary (a file, a pipe, a socket):
//!
//! ```text
//! 4 bytes  magic "RMS1"
//! int32    header length H
//! H bytes  int32 field count, then per field: name, type descriptor
//! uint32   CRC32 of the H header bytes
//! ...      rows, each its cells in field order
//! ```
//!
//! The header is written with the first row, so a writer can be created
//! before the schema is known.

use std::io::{Read, Write};
use std::sync::Arc;

use super::transport::{RowSink, RowSource};
use super::{FieldMeta, Row, RowSchema};
use crate::codec::{CellCodec, CodecError, DataInput, DataOutput};
use crate::logging::debug;
use crate::value::TypeRegistry;

pub const MAGIC: &[u8; 4] = b"RMS1";

/// Writes rows to a byte sink.
pub struct RowStreamWriter<'a, W: Write> {
    out: DataOutput<W>,
    codec: CellCodec<'a>,
    schema: Option<Arc<RowSchema>>,
    rows: u64,
}

impl<'a, W: Write> RowStreamWriter<'a, W> {
    pub fn new(registry: &'a TypeRegistry, inner: W) -> Self {
        Self {
            out: DataOutput::new(inner),
            codec: CellCodec::new(registry),
            schema: None,
            rows: 0,
        }
    }

    /// Create a writer and write the header right away, so that a stream
    /// without rows still records its schema.
    pub fn with_schema(
        registry: &'a TypeRegistry,
        inner: W,
        schema: Arc<RowSchema>,
    ) -> Result<Self, CodecError> {
        let mut writer = Self::new(registry, inner);
        writer.write_header(schema)?;
        Ok(writer)
    }

    pub fn schema(&self) -> Option<&Arc<RowSchema>> {
        self.schema.as_ref()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    fn write_header(&mut self, schema: Arc<RowSchema>) -> Result<(), CodecError> {
        let mut header = DataOutput::new(Vec::new());
        header.write_len(schema.len())?;
        for field in schema.iter() {
            header.write_string(&field.name)?;
            self.codec.write_descriptor(&mut header, &field.meta)?;
        }
        let header = header.into_inner();

        self.out.write_raw(MAGIC)?;
        self.out.write_len(header.len())?;
        self.out.write_raw(&header)?;
        self.out.write_u32(crc32fast::hash(&header))?;
        debug!(fields = schema.len(), header_bytes = header.len(), "wrote row stream header");
        self.schema = Some(schema);
        Ok(())
    }

    /// Write one row. Every row must share the schema of the first.
    pub fn write_row(&mut self, row: &Row) -> Result<(), CodecError> {
        let schema = match &self.schema {
            Some(schema) => Arc::clone(schema),
            None => {
                self.write_header(Arc::clone(row.schema()))?;
                Arc::clone(row.schema())
            }
        };
        if !Arc::ptr_eq(&schema, row.schema()) && schema.as_ref() != row.schema().as_ref() {
            return Err(CodecError::ContractViolation {
                expected: schema.to_string(),
                actual: "a row with a different schema",
            });
        }
        for (field, value) in schema.iter().zip(row.values()) {
            self.codec.write(&mut self.out, &field.meta, value)?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> RowSink for RowStreamWriter<'_, W> {
    fn emit(&mut self, row: Row) -> Result<(), CodecError> {
        self.write_row(&row)
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        self.flush()
    }
}

/// Reads rows from a byte source.
pub struct RowStreamReader<'a, R: Read> {
    input: DataInput<R>,
    codec: CellCodec<'a>,
    schema: Option<Arc<RowSchema>>,
    header_read: bool,
    failed: bool,
}

impl<'a, R: Read> RowStreamReader<'a, R> {
    pub fn new(registry: &'a TypeRegistry, inner: R) -> Self {
        Self {
            input: DataInput::new(inner),
            codec: CellCodec::new(registry),
            schema: None,
            header_read: false,
            failed: false,
        }
    }

    /// Schema of the stream, reading the header if needed. `None` for an
    /// empty stream.
    ///
    /// Once reading the header or a row has failed the input position is
    /// unknown, and every later call fails too.
    pub fn schema(&mut self) -> Result<Option<&Arc<RowSchema>>, CodecError> {
        self.check_failed()?;
        if !self.header_read {
            let header = self.read_header();
            self.schema = self.track(header)?;
            self.header_read = true;
        }
        Ok(self.schema.as_ref())
    }

    fn check_failed(&self) -> Result<(), CodecError> {
        if self.failed {
            return Err(CodecError::Corrupt("row stream already failed".into()));
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T, CodecError>) -> Result<T, CodecError> {
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn read_header(&mut self) -> Result<Option<Arc<RowSchema>>, CodecError> {
        let mut magic = [0u8; 4];
        match self.input.read_fully(&mut magic) {
            Ok(()) => {}
            Err(CodecError::Truncated { available: 0, .. }) => return Ok(None),
            Err(e) => return Err(e),
        }
        if &magic != MAGIC {
            return Err(CodecError::Corrupt(format!(
                "not a row stream: magic {:02x?}",
                magic
            )));
        }
        let len = self.input.read_len()?;
        let header = self.input.read_raw(len)?;
        let checksum = self.input.read_u32()?;
        let actual = crc32fast::hash(&header);
        if checksum != actual {
            return Err(CodecError::Corrupt(format!(
                "header checksum mismatch: stored {:#010x}, computed {:#010x}",
                checksum, actual
            )));
        }

        let mut input = DataInput::new(header.as_slice());
        let count = input.read_len()?;
        let mut fields = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = input.read_string()?;
            let meta = self.codec.read_descriptor(&mut input)?;
            fields.push(FieldMeta::new(name, meta));
        }
        let schema = RowSchema::new(fields);
        debug!(schema = %schema, "read row stream header");
        Ok(Some(Arc::new(schema)))
    }

    /// Next row, `None` at a clean end of input. A stream whose schema has
    /// no fields carries no rows.
    pub fn read_row(&mut self) -> Result<Option<Row>, CodecError> {
        let Some(schema) = self.schema()?.cloned() else {
            return Ok(None);
        };
        let row = self.read_cells(schema);
        self.track(row)
    }

    fn read_cells(&mut self, schema: Arc<RowSchema>) -> Result<Option<Row>, CodecError> {
        let mut values = Vec::with_capacity(schema.len());
        for (i, field) in schema.iter().enumerate() {
            match self.codec.read(&mut self.input, &field.meta) {
                Ok(value) => values.push(value),
                Err(CodecError::EndOfStream) if i == 0 => return Ok(None),
                Err(CodecError::EndOfStream) => {
                    return Err(CodecError::Truncated {
                        position: self.input.position(),
                        needed: 1,
                        available: 0,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        if values.is_empty() {
            return Ok(None);
        }
        Row::new(schema, values)
            .map(Some)
            .map_err(|e| CodecError::Corrupt(e.to_string()))
    }

    pub fn into_inner(self) -> R {
        self.input.into_inner()
    }
}

impl<R: Read> RowSource for RowStreamReader<'_, R> {
    fn next_row(&mut self) -> Result<Option<Row>, CodecError> {
        self.read_row()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::value::{MapValue, Storage, Value, ValueMeta};

    fn schema() -> Arc<RowSchema> {
        Arc::new(RowSchema::new(vec![
            FieldMeta::new("id", ValueMeta::integer()),
            FieldMeta::new(
                "attrs",
                ValueMeta::map(ValueMeta::string(), ValueMeta::number()),
            ),
            FieldMeta::new(
                "color",
                ValueMeta::string().with_storage(Storage::indexed(["red", "blue"])),
            ),
        ]))
    }

    fn rows() -> Vec<Row> {
        let attrs: MapValue = [("w", 1.5), ("h", 2.0)].into_iter().collect();
        vec![
            Row::new(
                schema(),
                vec![Value::Integer(1), Value::Map(attrs), Value::Index(1)],
            )
            .unwrap(),
            Row::new(schema(), vec![Value::Integer(2), Value::Null, Value::Null]).unwrap(),
        ]
    }

    fn encode(rows: &[Row]) -> Vec<u8> {
        let registry = TypeRegistry::with_builtins();
        let mut writer = RowStreamWriter::new(&registry, Vec::new());
        for row in rows {
            writer.write_row(row).unwrap();
        }
        writer.finish().unwrap();
        writer.into_inner()
    }

    #[test]
    fn test_rows_survive_the_stream() {
        let bytes = encode(&rows());
        assert_eq!(bytes.get(..4), Some(&MAGIC[..]));

        let registry = TypeRegistry::with_builtins();
        let mut reader = RowStreamReader::new(&registry, bytes.as_slice());
        assert_eq!(reader.schema().unwrap().map(|s| s.as_ref()), Some(schema().as_ref()));
        let mut read = Vec::new();
        while let Some(row) = reader.read_row().unwrap() {
            read.push(row);
        }
        assert_eq!(read, rows());
    }

    #[test]
    fn test_empty_stream() {
        let registry = TypeRegistry::with_builtins();
        let mut reader = RowStreamReader::new(&registry, &[][..]);
        assert!(reader.schema().unwrap().is_none());
        assert!(reader.read_row().unwrap().is_none());
    }

    #[test]
    fn test_header_only_stream() {
        let registry = TypeRegistry::with_builtins();
        let writer = RowStreamWriter::with_schema(&registry, Vec::new(), schema()).unwrap();
        let bytes = writer.into_inner();
        let mut reader = RowStreamReader::new(&registry, bytes.as_slice());
        assert_eq!(reader.schema().unwrap().map(|s| s.len()), Some(3));
        assert!(reader.read_row().unwrap().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let registry = TypeRegistry::with_builtins();
        let mut reader = RowStreamReader::new(&registry, &b"NOPE...."[..]);
        assert!(matches!(reader.read_row(), Err(CodecError::Corrupt(_))));
    }

    #[test]
    fn test_header_checksum_mismatch() {
        let mut bytes = encode(&rows());
        // First byte of the first field name.
        bytes[16] ^= 0xff;
        let registry = TypeRegistry::with_builtins();
        let mut reader = RowStreamReader::new(&registry, bytes.as_slice());
        match reader.read_row() {
            Err(CodecError::Corrupt(msg)) => assert!(msg.contains("checksum"), "{msg}"),
            other => panic!("expected corrupt header, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_row() {
        let bytes = encode(&rows());
        let registry = TypeRegistry::with_builtins();
        let mut reader = RowStreamReader::new(&registry, &bytes[..bytes.len() - 1]);
        assert!(reader.read_row().unwrap().is_some());
        assert!(matches!(
            reader.read_row(),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_mixed_schemas_rejected() {
        let registry = TypeRegistry::with_builtins();
        let mut writer = RowStreamWriter::new(&registry, Vec::new());
        writer.write_row(&rows()[0]).unwrap();
        let other = Arc::new(RowSchema::new(vec![FieldMeta::new("x", ValueMeta::string())]));
        let row = Row::new(other, vec![Value::from("a")]).unwrap();
        assert!(matches!(
            writer.write_row(&row),
            Err(CodecError::ContractViolation { .. })
        ));
    }

    #[test]
    fn test_failure_is_sticky() {
        let reg = TypeRegistry::with_builtins();
        let writer = RowStreamWriter::with_schema(&reg, Vec::new(), schema()).unwrap();
        let bytes = writer.into_inner();

        let empty = TypeRegistry::empty();
        let mut reader = RowStreamReader::new(&empty, bytes.as_slice());
        assert!(matches!(reader.read_row(), Err(CodecError::UnresolvedType(_))));
        assert!(matches!(reader.read_row(), Err(CodecError::Corrupt(_))));
        assert!(reader.schema().is_err());
    }

    #[test]
    fn test_failure_inside_rows_is_sticky() {
        let reg = TypeRegistry::with_builtins();
        let mut bytes = encode(&rows());
        bytes.truncate(bytes.len() - 2);

        let mut reader = RowStreamReader::new(&reg, bytes.as_slice());
        let mut results = Vec::new();
        for _ in 0..rows().len() + 2 {
            results.push(reader.read_row());
        }
        let first_err = results.iter().position(Result::is_err).unwrap();
        assert!(matches!(results[first_err], Err(CodecError::Truncated { .. })));
        assert!(results[first_err + 1..].iter().all(Result::is_err));
    }

    #[test]
    fn test_unknown_type_in_header() {
        let bytes = encode(&rows());
        let registry = TypeRegistry::empty();
        let mut reader = RowStreamReader::new(&registry, bytes.as_slice());
        assert!(matches!(
            reader.read_row(),
            Err(CodecError::UnresolvedType(_))
        ));
    }
}
