//! VITA container format: types, byte layout, and passes.
//!
//! A container is a gzip stream holding a fixed header followed by a flat
//! sequence of packets `{type: u8, length: u32, body[length]}`. Three packet
//! types matter: track definitions, device definitions, and records; anything
//! else is skipped wholesale by its declared length.
//!
//! # Structure
//!
//! - `catalog` - pass 1: device/track registry and time bounds
//! - `grid` - pass 2: resampling onto a fixed-interval grid
//! - `packet` + `recode` - selective re-encoding of a container
//! - `error` - the failure taxonomy shared by all passes

pub mod catalog;
pub mod error;
pub mod grid;
pub mod packet;
pub mod recode;

pub use catalog::{Catalog, CatalogBuilder};
pub use error::VitalError;
pub use grid::{CellPolicy, DataPass, Grid, GridOptions, TrackSelector};
pub use packet::RawPacket;

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::stream::{ByteReader, ByteWriter, FieldRead, StreamError};

/// Leading tag of every container.
pub const MAGIC: [u8; 4] = *b"VITA";

/// Packets declaring a body longer than this are treated as stream
/// corruption; parsing stops at that point.
pub const MAX_PACKET_LEN: u32 = 1_000_000;

/// Containers spanning more than this are rejected outright.
pub const MAX_SPAN_SECS: f64 = 48.0 * 3600.0;

/// Packet type tags.
pub mod packet_type {
    pub const TRACK: u8 = 0;
    pub const RECORD: u8 = 1;
    pub const DEVICE: u8 = 9;
}

/// Fixed offsets within a record packet body.
pub mod record_offset {
    /// `f64` timestamp, after the `u16` info length.
    pub const TIMESTAMP: usize = 2;
    /// `u16` track id, after the timestamp.
    pub const TRACK_ID: usize = 10;
}

/// What a track's records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A burst of consecutive samples at the track's sample rate.
    Wave,
    /// One scalar per record.
    Numeric,
    /// A free-text annotation per record.
    Text,
}

impl RecordKind {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(RecordKind::Wave),
            2 => Some(RecordKind::Numeric),
            5 => Some(RecordKind::Text),
            _ => None,
        }
    }

    pub fn to_code(self) -> u8 {
        match self {
            RecordKind::Wave => 1,
            RecordKind::Numeric => 2,
            RecordKind::Text => 5,
        }
    }

    /// Short tag used in track listings.
    pub fn label(self) -> &'static str {
        match self {
            RecordKind::Wave => "WAV",
            RecordKind::Numeric => "NUM",
            RecordKind::Text => "STR",
        }
    }
}

/// On-disk width and signedness of wave samples.
///
/// This is the single decode table for sample payloads; both the grid pass
/// and any future encoder go through it rather than switching on raw codes
/// at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    Float32,
    Float64,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
}

impl SampleEncoding {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SampleEncoding::Float32),
            2 => Some(SampleEncoding::Float64),
            3 => Some(SampleEncoding::Int8),
            4 => Some(SampleEncoding::UInt8),
            5 => Some(SampleEncoding::Int16),
            6 => Some(SampleEncoding::UInt16),
            7 => Some(SampleEncoding::Int32),
            8 => Some(SampleEncoding::UInt32),
            _ => None,
        }
    }

    pub fn to_code(self) -> u8 {
        match self {
            SampleEncoding::Float32 => 1,
            SampleEncoding::Float64 => 2,
            SampleEncoding::Int8 => 3,
            SampleEncoding::UInt8 => 4,
            SampleEncoding::Int16 => 5,
            SampleEncoding::UInt16 => 6,
            SampleEncoding::Int32 => 7,
            SampleEncoding::UInt32 => 8,
        }
    }

    /// Encoded width in bytes.
    pub fn width(self) -> u32 {
        match self {
            SampleEncoding::Int8 | SampleEncoding::UInt8 => 1,
            SampleEncoding::Int16 | SampleEncoding::UInt16 => 2,
            SampleEncoding::Float32 | SampleEncoding::Int32 | SampleEncoding::UInt32 => 4,
            SampleEncoding::Float64 => 8,
        }
    }

    /// Decode one sample from a bounded field source.
    pub fn read_sample<F: FieldRead>(self, src: &mut F) -> Result<f64, StreamError> {
        Ok(match self {
            SampleEncoding::Float32 => src.fetch_f32()? as f64,
            SampleEncoding::Float64 => src.fetch_f64()?,
            SampleEncoding::Int8 => src.fetch_u8()? as i8 as f64,
            SampleEncoding::UInt8 => src.fetch_u8()? as f64,
            SampleEncoding::Int16 => src.fetch_i16()? as f64,
            SampleEncoding::UInt16 => src.fetch_u16()? as f64,
            SampleEncoding::Int32 => src.fetch_i32()? as f64,
            SampleEncoding::UInt32 => src.fetch_u32()? as f64,
        })
    }
}

/// A named source system owning zero or more tracks.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: u32,
    /// Raw device-type string; the fallback name for unnamed devices.
    pub kind: String,
    pub name: String,
}

impl Device {
    /// Decode a device-definition packet body.
    pub fn decode<F: FieldRead>(src: &mut F) -> Result<Self, StreamError> {
        let id = src.fetch_u32()?;
        let kind = src.fetch_str()?;
        let mut name = src.fetch_str()?;
        if name.is_empty() {
            name = kind.clone();
        }
        Ok(Device { id, kind, name })
    }
}

/// Running numeric statistics for one track, accumulated in pass 1.
#[derive(Debug, Clone, Default)]
pub struct TrackStats {
    /// Numeric records observed.
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    /// First numeric or text value seen, preformatted for listings.
    pub first: Option<String>,
}

impl TrackStats {
    pub fn push_numeric(&mut self, v: f32) {
        let v = v as f64;
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.count += 1;
        self.sum += v;
        if self.first.is_none() {
            self.first = Some(format!("{:.6}", v));
        }
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// One named, typed time series within a container.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u16,
    pub name: String,
    pub unit: String,
    pub kind: RecordKind,
    pub encoding: SampleEncoding,
    pub rate_hz: f64,
    /// Linear rescale applied to raw wave samples.
    pub gain: f64,
    pub offset: f64,
    pub display_min: f32,
    pub display_max: f32,
    pub color: u32,
    pub monitor_type: u8,
    pub device_id: u32,
    /// Device name as known when the track was registered; devices defined
    /// later do not retroactively rename already-registered tracks.
    pub device_name: String,
    /// Earliest record timestamp observed, `f64::MAX` until the first one.
    pub time_start: f64,
    /// Latest record end-time observed, `0.0` until the first one.
    pub time_end: f64,
    pub stats: TrackStats,
}

impl Track {
    /// Decode a track-definition packet body.
    ///
    /// All fields are required; a body short enough to cut one off fails
    /// the whole definition rather than registering a half-filled track.
    /// Unknown kind or encoding codes fall back to `Numeric`/`Float32`,
    /// matching how permissive the recorders are about these bytes.
    pub fn decode<F: FieldRead>(src: &mut F) -> Result<Self, StreamError> {
        let id = src.fetch_u16()?;
        let kind_code = src.fetch_u8()?;
        let enc_code = src.fetch_u8()?;
        let name = src.fetch_str()?;
        let unit = src.fetch_str()?;
        let display_min = src.fetch_f32()?;
        let display_max = src.fetch_f32()?;
        let color = src.fetch_u32()?;
        let rate_hz = src.fetch_f32()? as f64;
        let gain = src.fetch_f64()?;
        let offset = src.fetch_f64()?;
        let monitor_type = src.fetch_u8()?;
        let device_id = src.fetch_u32()?;

        Ok(Track {
            id,
            name,
            unit,
            kind: RecordKind::from_code(kind_code).unwrap_or(RecordKind::Numeric),
            encoding: SampleEncoding::from_code(enc_code).unwrap_or(SampleEncoding::Float32),
            rate_hz,
            gain,
            offset,
            display_min,
            display_max,
            color,
            monitor_type,
            device_id,
            device_name: String::new(),
            time_start: f64::MAX,
            time_end: 0.0,
            stats: TrackStats::default(),
        })
    }

    /// Whether at least one record has been observed for this track.
    pub fn has_data(&self) -> bool {
        self.time_end > 0.0 && self.time_start < f64::MAX
    }
}

/// Container header: magic, format version, and the extension block.
#[derive(Debug, Clone)]
pub struct Header {
    /// Preserved for round-trip; parsing does not branch on it.
    pub format_version: u32,
    /// Raw extension bytes after the fixed 10-byte prefix.
    pub ext: Vec<u8>,
}

impl Header {
    /// Read and validate the container header, leaving the reader
    /// positioned at the first packet preamble.
    pub fn read<R: Read + Seek>(r: &mut ByteReader<R>) -> Result<Self, VitalError> {
        let mut magic = [0u8; 4];
        if r.read_into(&mut magic).map_err(StreamError::Io)? != 4 {
            return Err(VitalError::TruncatedHeader);
        }
        if magic != MAGIC {
            return Err(VitalError::BadMagic);
        }

        let format_version = r
            .read_u32::<LittleEndian>()
            .map_err(|_| VitalError::TruncatedHeader)?;
        let ext_len = r
            .read_u16::<LittleEndian>()
            .map_err(|_| VitalError::TruncatedHeader)?;

        let mut ext = vec![0u8; ext_len as usize];
        if r.read_into(&mut ext).map_err(StreamError::Io)? != ext.len() {
            return Err(VitalError::TruncatedHeader);
        }

        Ok(Header {
            format_version,
            ext,
        })
    }

    /// Total header size in bytes: the authoritative skip distance when
    /// repositioning for a second pass.
    pub fn byte_len(&self) -> u32 {
        10 + self.ext.len() as u32
    }

    /// Signed timezone bias in minutes, when the extension carries one.
    pub fn tz_bias_min(&self) -> Option<i16> {
        if self.ext.len() >= 2 {
            Some(i16::from_le_bytes([self.ext[0], self.ext[1]]))
        } else {
            None
        }
    }

    /// Serialize back to the exact on-disk byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len() as usize);
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&self.format_version.to_le_bytes());
        bytes.extend_from_slice(&(self.ext.len() as u16).to_le_bytes());
        bytes.extend_from_slice(&self.ext);
        bytes
    }

    pub fn write<W: std::io::Write>(&self, w: &mut ByteWriter<W>) -> Result<(), StreamError> {
        w.write_bytes(&self.to_bytes())
    }
}

/// Read the next packet preamble.
///
/// Returns `None` at a clean end of stream, or when the preamble itself is
/// truncated or the declared length exceeds [`MAX_PACKET_LEN`]; both are
/// treated as the end of usable data, and whatever was parsed before stays
/// valid.
pub fn next_packet<R: Read + Seek>(
    r: &mut ByteReader<R>,
) -> Result<Option<(u8, u32)>, StreamError> {
    let mut tag = [0u8; 1];
    if r.read_into(&mut tag)? != 1 {
        return Ok(None);
    }
    let len = match r.read_u32::<LittleEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            log::warn!("stream ends inside a packet preamble");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if len > MAX_PACKET_LEN {
        log::warn!(
            "packet declares {} byte body (limit {}); treating stream as corrupt from here",
            len,
            MAX_PACKET_LEN
        );
        return Ok(None);
    }
    Ok(Some((tag[0], len)))
}
