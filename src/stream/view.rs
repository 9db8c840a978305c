//! Bounded field extraction over an in-memory byte slice.

use byteorder::{LittleEndian, ReadBytesExt};

use super::{FieldRead, StreamError};

/// A cursor over a fully-buffered byte range with the same bounded fetch
/// contract as a streaming packet body. Used when a packet's raw bytes are
/// held in memory and only a few fields need to be inspected.
pub struct ByteView<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteView<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn budget(&self, want: u32) -> Result<(), StreamError> {
        if self.remaining() < want {
            return Err(StreamError::Overrun {
                want,
                have: self.remaining(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        slice
    }
}

impl<'a> FieldRead for ByteView<'a> {
    fn remaining(&self) -> u32 {
        (self.buf.len() - self.pos) as u32
    }

    fn fetch_raw(&mut self, n: u32) -> Result<Vec<u8>, StreamError> {
        self.budget(n)?;
        Ok(self.take(n as usize).to_vec())
    }

    fn skip(&mut self, n: u32) -> Result<(), StreamError> {
        self.budget(n)?;
        self.pos += n as usize;
        Ok(())
    }

    fn fetch_u8(&mut self) -> Result<u8, StreamError> {
        self.budget(1)?;
        Ok(self.take(1)[0])
    }

    fn fetch_i16(&mut self) -> Result<i16, StreamError> {
        self.budget(2)?;
        Ok(self.take(2).read_i16::<LittleEndian>()?)
    }

    fn fetch_u16(&mut self) -> Result<u16, StreamError> {
        self.budget(2)?;
        Ok(self.take(2).read_u16::<LittleEndian>()?)
    }

    fn fetch_i32(&mut self) -> Result<i32, StreamError> {
        self.budget(4)?;
        Ok(self.take(4).read_i32::<LittleEndian>()?)
    }

    fn fetch_u32(&mut self) -> Result<u32, StreamError> {
        self.budget(4)?;
        Ok(self.take(4).read_u32::<LittleEndian>()?)
    }

    fn fetch_f32(&mut self) -> Result<f32, StreamError> {
        self.budget(4)?;
        Ok(self.take(4).read_f32::<LittleEndian>()?)
    }

    fn fetch_f64(&mut self) -> Result<f64, StreamError> {
        self.budget(8)?;
        Ok(self.take(8).read_f64::<LittleEndian>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_decode_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1234u16.to_le_bytes());
        bytes.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        bytes.extend_from_slice(&1.5f64.to_le_bytes());

        let mut view = ByteView::new(&bytes);
        assert_eq!(view.fetch_u16().unwrap(), 0x1234);
        assert_eq!(view.fetch_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(view.fetch_f64().unwrap(), 1.5);
        assert_eq!(view.remaining(), 0);
    }

    #[test]
    fn overrun_does_not_consume() {
        let bytes = [1u8, 2];
        let mut view = ByteView::new(&bytes);
        assert!(view.fetch_u32().is_err());
        // Failed fetch leaves the cursor where it was.
        assert_eq!(view.fetch_u16().unwrap(), 0x0201);
    }

    #[test]
    fn fetch_str_roundtrip() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"ECG");
        let mut view = ByteView::new(&bytes);
        assert_eq!(view.fetch_str().unwrap(), "ECG");
    }

    #[test]
    fn skip_str_advances_past_payload() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"abc");
        bytes.push(0x7F);
        let mut view = ByteView::new(&bytes);
        view.skip_str().unwrap();
        assert_eq!(view.fetch_u8().unwrap(), 0x7F);
    }
}
