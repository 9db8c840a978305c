//! Fully-buffered packets for the re-encoding path.
//!
//! The re-encoder does not model every field of every packet; it buffers a
//! packet's raw bytes once, peeks the few fields it needs at fixed offsets,
//! and forwards the bytes untouched. The only mutation allowed is
//! [`RawPacket::with_f64_at`], which returns a new packet so the original
//! bytes stay auditable.

use std::io::{Read, Seek, Write};

use crate::stream::{ByteReader, ByteView, ByteWriter, StreamError};

use super::{next_packet, VitalError};

/// One packet, fully buffered: type tag plus raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub tag: u8,
    pub body: Vec<u8>,
}

impl RawPacket {
    /// Read the next packet whole.
    ///
    /// Returns `None` at end of stream and on the same stream-corruption
    /// conditions that end a parsing pass (truncated preamble, oversized
    /// declared length, short body read).
    pub fn read_from<R: Read + Seek>(
        reader: &mut ByteReader<R>,
    ) -> Result<Option<Self>, VitalError> {
        let Some((tag, len)) = next_packet(reader)? else {
            return Ok(None);
        };
        let mut body = vec![0u8; len as usize];
        let got = reader.read_into(&mut body).map_err(StreamError::Io)?;
        if got != body.len() {
            log::warn!("stream ends inside a {} byte packet body", len);
            return Ok(None);
        }
        Ok(Some(RawPacket { tag, body }))
    }

    /// Write the packet back out: preamble plus verbatim body.
    pub fn write_to<W: Write>(&self, writer: &mut ByteWriter<W>) -> Result<(), StreamError> {
        writer.write_u8(self.tag)?;
        writer.write_u32(self.body.len() as u32)?;
        writer.write_bytes(&self.body)
    }

    /// Bounded sequential view over the body.
    pub fn view(&self) -> ByteView<'_> {
        ByteView::new(&self.body)
    }

    pub fn peek_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.body.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn peek_f64(&self, offset: usize) -> Option<f64> {
        let bytes: [u8; 8] = self.body.get(offset..offset + 8)?.try_into().ok()?;
        Some(f64::from_le_bytes(bytes))
    }

    /// Copy of this packet with the eight bytes at `offset` replaced by
    /// `value`. Returns `None` if the field does not fit in the body.
    #[must_use]
    pub fn with_f64_at(&self, offset: usize, value: f64) -> Option<Self> {
        if offset + 8 > self.body.len() {
            return None;
        }
        let mut body = self.body.clone();
        body[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        Some(RawPacket {
            tag: self.tag,
            body,
        })
    }
}
