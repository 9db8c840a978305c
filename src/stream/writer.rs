//! Compressing writer, symmetric to [`ByteReader`](super::ByteReader).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::GzEncoder;
use flate2::Compression;

use super::StreamError;

/// Writes little-endian fields into a gzip stream.
///
/// Compression level favors speed: containers are written live at the
/// bedside and re-encoded in bulk, and the format was tuned for the fast
/// deflate levels.
pub struct ByteWriter<W: Write> {
    gz: GzEncoder<W>,
}

impl ByteWriter<File> {
    /// Create (truncating) a compressed container on disk.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let file = File::create(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> ByteWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            gz: GzEncoder::new(sink, Compression::fast()),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        self.gz.write_all(bytes)?;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), StreamError> {
        self.gz.write_u8(v)?;
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> Result<(), StreamError> {
        self.gz.write_i16::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), StreamError> {
        self.gz.write_u16::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), StreamError> {
        self.gz.write_u32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<(), StreamError> {
        self.gz.write_f32::<LittleEndian>(v)?;
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), StreamError> {
        self.gz.write_f64::<LittleEndian>(v)?;
        Ok(())
    }

    /// Write a `{len: u32, bytes[len]}` string field.
    pub fn write_str(&mut self, s: &str) -> Result<(), StreamError> {
        self.write_u32(s.len() as u32)?;
        self.write_bytes(s.as_bytes())
    }

    /// Flush the compressor and return the underlying sink.
    pub fn finish(self) -> Result<W, StreamError> {
        Ok(self.gz.finish()?)
    }
}
