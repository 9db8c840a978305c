//! Buffered reader over a gzip-compressed container.
//!
//! The reader keeps a fixed read-ahead buffer in front of the decompressor
//! so that the hot path of field extraction is a memcpy. Packet bodies are
//! read through [`PacketBody`], which enforces the declared packet length as
//! a hard byte budget: a decoder bug or a corrupted field count can never
//! make a fetch bleed into the next packet.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::MultiGzDecoder;

use super::{FieldRead, StreamError, BUF_LEN};

/// Streaming reader over a gzip-compressed byte stream.
///
/// Generic over the raw source so tests can drive it from an in-memory
/// cursor; production use is [`ByteReader::open`] on a file path.
pub struct ByteReader<R: Read + Seek> {
    gz: MultiGzDecoder<BufReader<R>>,
    buf: Box<[u8; BUF_LEN]>,
    pos: usize,
    len: usize,
    at_end: bool,
}

impl ByteReader<File> {
    /// Open a compressed container on disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StreamError> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read + Seek> ByteReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            gz: MultiGzDecoder::new(BufReader::new(src)),
            buf: Box::new([0; BUF_LEN]),
            pos: 0,
            len: 0,
            at_end: false,
        }
    }

    /// Refill the read-ahead buffer if it is empty.
    ///
    /// Returns the number of buffered bytes available afterwards; zero
    /// means the decompressed stream is exhausted.
    fn fill(&mut self) -> io::Result<usize> {
        if self.pos < self.len {
            return Ok(self.len - self.pos);
        }
        let n = self.gz.read(&mut self.buf[..])?;
        self.pos = 0;
        self.len = n;
        if n == 0 {
            self.at_end = true;
        }
        Ok(n)
    }

    /// Copy up to `dest.len()` bytes into `dest`.
    ///
    /// Returns fewer bytes than requested only at end-of-stream.
    pub fn read_into(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        let mut copied = 0;
        while copied < dest.len() {
            let avail = self.fill()?;
            if avail == 0 {
                break;
            }
            let take = avail.min(dest.len() - copied);
            dest[copied..copied + take].copy_from_slice(&self.buf[self.pos..self.pos + take]);
            self.pos += take;
            copied += take;
        }
        Ok(copied)
    }

    /// Advance the logical position by `len` decompressed bytes.
    ///
    /// Consumes buffered bytes first, then decompresses and discards.
    /// Fails with [`StreamError::Eof`] if the stream ends first.
    pub fn skip(&mut self, len: u32) -> Result<(), StreamError> {
        let mut left = len as usize;
        while left > 0 {
            let avail = self.fill()?;
            if avail == 0 {
                return Err(StreamError::Eof);
            }
            let take = avail.min(left);
            self.pos += take;
            left -= take;
        }
        Ok(())
    }

    /// True once the decompressed stream is exhausted and no buffered
    /// bytes remain.
    pub fn eof(&mut self) -> bool {
        if self.pos < self.len {
            return false;
        }
        match self.fill() {
            Ok(n) => n == 0,
            Err(_) => true,
        }
    }

    /// Reset the logical position to the start of the decompressed stream.
    ///
    /// Consumes and returns the reader: the decompressor's state cannot be
    /// reset in place, so the raw source is seeked back to the beginning
    /// and a fresh decompressor is layered on top.
    pub fn rewind(self) -> Result<Self, StreamError> {
        let mut src = self.gz.into_inner();
        src.seek(SeekFrom::Start(0))?;
        Ok(Self {
            gz: MultiGzDecoder::new(src),
            buf: self.buf,
            pos: 0,
            len: 0,
            at_end: false,
        })
    }

    /// Borrow a length-bounded view of the next `len` body bytes.
    ///
    /// Dropping the body without consuming it leaves the stream mid-packet;
    /// callers finish with [`PacketBody::skip_rest`].
    pub fn packet(&mut self, len: u32) -> PacketBody<'_, R> {
        PacketBody {
            reader: self,
            remaining: len,
        }
    }
}

impl<R: Read + Seek> Read for ByteReader<R> {
    fn read(&mut self, dest: &mut [u8]) -> io::Result<usize> {
        let avail = self.fill()?;
        if avail == 0 {
            return Ok(0);
        }
        let take = avail.min(dest.len());
        dest[..take].copy_from_slice(&self.buf[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }
}

fn map_read_err(e: io::Error) -> StreamError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StreamError::Eof
    } else {
        StreamError::Io(e)
    }
}

/// A bounded view of one packet's body within a [`ByteReader`].
///
/// Carries the packet's remaining byte budget; every fetch decrements it
/// and a fetch over budget fails without touching the stream.
pub struct PacketBody<'a, R: Read + Seek> {
    reader: &'a mut ByteReader<R>,
    remaining: u32,
}

impl<'a, R: Read + Seek> PacketBody<'a, R> {
    /// Skip whatever is left of the packet, repositioning the stream at
    /// the next packet preamble.
    pub fn skip_rest(&mut self) -> Result<(), StreamError> {
        let left = self.remaining;
        self.remaining = 0;
        self.reader.skip(left)
    }

    fn budget(&mut self, want: u32) -> Result<(), StreamError> {
        if self.remaining < want {
            return Err(StreamError::Overrun {
                want,
                have: self.remaining,
            });
        }
        Ok(())
    }
}

impl<'a, R: Read + Seek> FieldRead for PacketBody<'a, R> {
    fn remaining(&self) -> u32 {
        self.remaining
    }

    fn fetch_raw(&mut self, n: u32) -> Result<Vec<u8>, StreamError> {
        self.budget(n)?;
        let mut bytes = vec![0u8; n as usize];
        self.reader.read_exact(&mut bytes).map_err(map_read_err)?;
        self.remaining -= n;
        Ok(bytes)
    }

    fn skip(&mut self, n: u32) -> Result<(), StreamError> {
        self.budget(n)?;
        self.reader.skip(n)?;
        self.remaining -= n;
        Ok(())
    }

    fn fetch_u8(&mut self) -> Result<u8, StreamError> {
        self.budget(1)?;
        let v = self.reader.read_u8().map_err(map_read_err)?;
        self.remaining -= 1;
        Ok(v)
    }

    fn fetch_i16(&mut self) -> Result<i16, StreamError> {
        self.budget(2)?;
        let v = self.reader.read_i16::<LittleEndian>().map_err(map_read_err)?;
        self.remaining -= 2;
        Ok(v)
    }

    fn fetch_u16(&mut self) -> Result<u16, StreamError> {
        self.budget(2)?;
        let v = self.reader.read_u16::<LittleEndian>().map_err(map_read_err)?;
        self.remaining -= 2;
        Ok(v)
    }

    fn fetch_i32(&mut self) -> Result<i32, StreamError> {
        self.budget(4)?;
        let v = self.reader.read_i32::<LittleEndian>().map_err(map_read_err)?;
        self.remaining -= 4;
        Ok(v)
    }

    fn fetch_u32(&mut self) -> Result<u32, StreamError> {
        self.budget(4)?;
        let v = self.reader.read_u32::<LittleEndian>().map_err(map_read_err)?;
        self.remaining -= 4;
        Ok(v)
    }

    fn fetch_f32(&mut self) -> Result<f32, StreamError> {
        self.budget(4)?;
        let v = self.reader.read_f32::<LittleEndian>().map_err(map_read_err)?;
        self.remaining -= 4;
        Ok(v)
    }

    fn fetch_f64(&mut self) -> Result<f64, StreamError> {
        self.budget(8)?;
        let v = self.reader.read_f64::<LittleEndian>().map_err(map_read_err)?;
        self.remaining -= 8;
        Ok(v)
    }
}
