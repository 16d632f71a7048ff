//! Big-endian primitive streams.
//!
//! [`DataInput`] and [`DataOutput`] wrap any `Read`/`Write` and count the
//! bytes that pass through, so decode errors can report where the stream
//! went wrong.

use std::io::{self, Read, Write};

use super::CodecError;

/// Upper bound on a single allocation while reading a length-prefixed field.
/// Longer fields are read in chunks so a corrupt length fails on truncation
/// instead of allocating up front.
const READ_CHUNK: usize = 64 * 1024;

fn classify(err: io::Error) -> CodecError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CodecError::Timeout(err),
        _ => CodecError::Io(err),
    }
}

/// Reader side of the binary format.
#[derive(Debug)]
pub struct DataInput<R> {
    inner: R,
    position: u64,
}

impl<R: Read> DataInput<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Fill `buf` completely. End of input before that is `Truncated`, with
    /// `available` counting the bytes that did arrive.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        let mut filled = 0;
        while filled < buf.len() {
            let rest = buf.get_mut(filled..).unwrap_or_default();
            match self.inner.read(rest) {
                Ok(0) => {
                    return Err(CodecError::Truncated {
                        position: self.position,
                        needed: buf.len(),
                        available: filled,
                    });
                }
                Ok(n) => {
                    filled += n;
                    self.position += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(classify(e)),
            }
        }
        Ok(())
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut buf = [0u8; N];
        self.read_fully(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    /// Strict boolean: only `0` and `1` are accepted.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::Corrupt(format!(
                "invalid boolean byte {:#04x} at {}",
                other,
                self.position - 1
            ))),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_be_bytes(self.read_array()?))
    }

    /// A non-negative int32 length.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| {
            CodecError::Corrupt(format!("negative length {} at {}", len, self.position - 4))
        })
    }

    /// Exactly `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::with_capacity(len.min(READ_CHUNK));
        while bytes.len() < len {
            let start = bytes.len();
            let step = (len - start).min(READ_CHUNK);
            bytes.resize(start + step, 0);
            let chunk = bytes.get_mut(start..).unwrap_or_default();
            match self.read_fully(chunk) {
                Ok(()) => {}
                Err(CodecError::Truncated {
                    position, available, ..
                }) => {
                    return Err(CodecError::Truncated {
                        position,
                        needed: len,
                        available: start + available,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(bytes)
    }

    /// Length-prefixed bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_len()?;
        self.read_raw(len)
    }

    /// Length-prefixed UTF-8 text.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let start = self.position;
        String::from_utf8(self.read_bytes()?)
            .map_err(|_| CodecError::Corrupt(format!("invalid UTF-8 in string at {}", start)))
    }
}

/// Writer side of the binary format.
#[derive(Debug)]
pub struct DataOutput<W> {
    inner: W,
    position: u64,
}

impl<W: Write> DataOutput<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.inner.write_all(bytes).map_err(classify)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.write_raw(&[value])
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.write_u8(u8::from(value))
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), CodecError> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<(), CodecError> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn write_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = i32::try_from(len).map_err(|_| CodecError::TooLarge(len))?;
        self.write_i32(len)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.write_len(bytes.len())?;
        self.write_raw(bytes)
    }

    pub fn write_string(&mut self, text: &str) -> Result<(), CodecError> {
        self.write_bytes(text.as_bytes())
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.inner.flush().map_err(classify)
    }
}
