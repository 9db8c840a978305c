//! Bounded byte-stream I/O over gzip containers.
//!
//! Everything above this module speaks in *packets*: a one-byte type tag, a
//! four-byte declared length, and that many body bytes. This module provides
//! the primitives that make packet decoding safe against truncated or
//! corrupted input:
//!
//! - [`ByteReader`] - buffered decompression with `read`/`skip`/`rewind`
//! - [`PacketBody`] - a length-bounded view into the current packet
//! - [`ByteView`] - the same bounded contract over an in-memory slice
//! - [`ByteWriter`] - the symmetric compressing writer
//!
//! A field fetch can never consume bytes past the end of the packet it
//! belongs to: every fetch goes through the [`FieldRead`] trait, which
//! checks the remaining byte budget before touching the underlying stream.

mod reader;
mod view;
mod writer;

pub use reader::{ByteReader, PacketBody};
pub use view::ByteView;
pub use writer::ByteWriter;

use std::io;

use thiserror::Error;

/// Size of the internal read-ahead buffer.
pub(crate) const BUF_LEN: usize = 8192;

/// Length-prefixed string fields above this are treated as corruption.
pub const MAX_STRING_LEN: u32 = 1_048_576;

/// Errors from the bounded stream layer.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A fetch asked for more bytes than the packet has left.
    #[error("field of {want} bytes exceeds the {have} bytes left in the packet")]
    Overrun { want: u32, have: u32 },

    /// A length-prefixed string declared a length over [`MAX_STRING_LEN`].
    #[error("string length {0} exceeds the 1 MiB field limit")]
    StringTooLong(u32),

    /// The compressed stream ended in the middle of a field.
    #[error("unexpected end of compressed stream")]
    Eof,
}

/// Typed, bounded field extraction.
///
/// Implemented by [`PacketBody`] (streaming) and [`ByteView`] (in-memory)
/// with identical semantics: each fetch decrements the remaining byte
/// budget, and a fetch that would exceed it fails with
/// [`StreamError::Overrun`] without consuming anything. All multi-byte
/// fields are little-endian.
pub trait FieldRead {
    /// Bytes left in the bounded region.
    fn remaining(&self) -> u32;

    /// Read exactly `n` bytes out of the bounded region.
    fn fetch_raw(&mut self, n: u32) -> Result<Vec<u8>, StreamError>;

    /// Advance `n` bytes without materializing them.
    fn skip(&mut self, n: u32) -> Result<(), StreamError>;

    fn fetch_u8(&mut self) -> Result<u8, StreamError>;
    fn fetch_i16(&mut self) -> Result<i16, StreamError>;
    fn fetch_u16(&mut self) -> Result<u16, StreamError>;
    fn fetch_i32(&mut self) -> Result<i32, StreamError>;
    fn fetch_u32(&mut self) -> Result<u32, StreamError>;
    fn fetch_f32(&mut self) -> Result<f32, StreamError>;
    fn fetch_f64(&mut self) -> Result<f64, StreamError>;

    /// Read a `{len: u32, bytes[len]}` string field.
    ///
    /// Fails with [`StreamError::StringTooLong`] before allocating when the
    /// declared length is at or above [`MAX_STRING_LEN`]. Invalid UTF-8 is
    /// replaced rather than rejected; device firmware is not reliable about
    /// encodings.
    fn fetch_str(&mut self) -> Result<String, StreamError> {
        let len = self.fetch_u32()?;
        if len >= MAX_STRING_LEN {
            return Err(StreamError::StringTooLong(len));
        }
        let bytes = self.fetch_raw(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Skip a length-prefixed string without decoding it.
    fn skip_str(&mut self) -> Result<(), StreamError> {
        let len = self.fetch_u32()?;
        if len >= MAX_STRING_LEN {
            return Err(StreamError::StringTooLong(len));
        }
        self.skip(len)
    }
}
