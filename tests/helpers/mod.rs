//! Shared fixtures: synthesize real gzip containers in memory.

#![allow(dead_code)]

use std::io::Cursor;

use vft::stream::ByteWriter;
use vft::vital::{packet_type, RecordKind, SampleEncoding};

/// Track-definition parameters with workable defaults.
#[derive(Clone)]
pub struct TrackDef {
    pub id: u16,
    pub kind: RecordKind,
    pub encoding: SampleEncoding,
    pub name: String,
    pub unit: String,
    pub rate_hz: f32,
    pub gain: f64,
    pub offset: f64,
    pub device_id: u32,
}

impl TrackDef {
    pub fn numeric(id: u16, name: &str) -> Self {
        Self {
            id,
            kind: RecordKind::Numeric,
            encoding: SampleEncoding::Float32,
            name: name.to_string(),
            unit: String::new(),
            rate_hz: 0.0,
            gain: 1.0,
            offset: 0.0,
            device_id: 0,
        }
    }

    pub fn wave(id: u16, name: &str, rate_hz: f32, encoding: SampleEncoding) -> Self {
        Self {
            id,
            kind: RecordKind::Wave,
            encoding,
            name: name.to_string(),
            unit: String::new(),
            rate_hz,
            gain: 1.0,
            offset: 0.0,
            device_id: 0,
        }
    }

    pub fn text(id: u16, name: &str) -> Self {
        Self {
            id,
            kind: RecordKind::Text,
            encoding: SampleEncoding::Float32,
            name: name.to_string(),
            unit: String::new(),
            rate_hz: 0.0,
            gain: 1.0,
            offset: 0.0,
            device_id: 0,
        }
    }

    pub fn on_device(mut self, device_id: u32) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_scale(mut self, gain: f64, offset: f64) -> Self {
        self.gain = gain;
        self.offset = offset;
        self
    }
}

/// Little-endian packet-body builder.
#[derive(Default)]
pub struct Body(pub Vec<u8>);

impl Body {
    pub fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }
    pub fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn f32(mut self, v: f32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn f64(mut self, v: f64) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    pub fn str(mut self, s: &str) -> Self {
        self.0.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.0.extend_from_slice(s.as_bytes());
        self
    }
}

/// Builds a complete compressed container, packet by packet.
pub struct ContainerBuilder {
    writer: ByteWriter<Vec<u8>>,
}

impl ContainerBuilder {
    /// Standard header: version 3 with a 26-byte extension carrying the
    /// timezone bias.
    pub fn new() -> Self {
        Self::with_tz_bias(0)
    }

    pub fn with_tz_bias(bias_min: i16) -> Self {
        let mut writer = ByteWriter::new(Vec::new());
        writer.write_bytes(b"VITA").unwrap();
        writer.write_u32(3).unwrap();
        writer.write_u16(26).unwrap();
        writer.write_i16(bias_min).unwrap();
        writer.write_bytes(&[0u8; 24]).unwrap();
        Self { writer }
    }

    pub fn packet(&mut self, tag: u8, body: &[u8]) -> &mut Self {
        self.writer.write_u8(tag).unwrap();
        self.writer.write_u32(body.len() as u32).unwrap();
        self.writer.write_bytes(body).unwrap();
        self
    }

    /// A packet preamble that declares an absurd body length; everything
    /// after it should be treated as lost.
    pub fn corrupt_preamble(&mut self) -> &mut Self {
        self.writer.write_u8(packet_type::RECORD).unwrap();
        self.writer.write_u32(2_000_000).unwrap();
        self
    }

    pub fn device(&mut self, id: u32, kind: &str, name: &str) -> &mut Self {
        let body = Body::default().u32(id).str(kind).str(name);
        self.packet(packet_type::DEVICE, &body.0)
    }

    pub fn track(&mut self, def: &TrackDef) -> &mut Self {
        let body = Body::default()
            .u16(def.id)
            .u8(def.kind.to_code())
            .u8(def.encoding.to_code())
            .str(&def.name)
            .str(&def.unit)
            .f32(0.0)
            .f32(100.0)
            .u32(0)
            .f32(def.rate_hz)
            .f64(def.gain)
            .f64(def.offset)
            .u8(0)
            .u32(def.device_id);
        self.packet(packet_type::TRACK, &body.0)
    }

    pub fn numeric_record(&mut self, tid: u16, t: f64, v: f32) -> &mut Self {
        let body = Body::default().u16(10).f64(t).u16(tid).f32(v);
        self.packet(packet_type::RECORD, &body.0)
    }

    pub fn text_record(&mut self, tid: u16, t: f64, s: &str) -> &mut Self {
        let body = Body::default().u16(10).f64(t).u16(tid).u32(0).str(s);
        self.packet(packet_type::RECORD, &body.0)
    }

    pub fn wave_record(
        &mut self,
        tid: u16,
        t: f64,
        encoding: SampleEncoding,
        samples: &[f64],
    ) -> &mut Self {
        let mut body = Body::default()
            .u16(10)
            .f64(t)
            .u16(tid)
            .u32(samples.len() as u32);
        for &s in samples {
            body = match encoding {
                SampleEncoding::Float32 => body.f32(s as f32),
                SampleEncoding::Float64 => body.f64(s),
                SampleEncoding::Int8 => body.u8(s as i8 as u8),
                SampleEncoding::UInt8 => body.u8(s as u8),
                SampleEncoding::Int16 => body.u16(s as i16 as u16),
                SampleEncoding::UInt16 => body.u16(s as u16),
                SampleEncoding::Int32 => body.u32(s as i32 as u32),
                SampleEncoding::UInt32 => body.u32(s as u32),
            };
        }
        self.packet(packet_type::RECORD, &body.0)
    }

    /// Finish compression and return the container bytes.
    pub fn finish(self) -> Vec<u8> {
        self.writer.finish().unwrap()
    }
}

/// A reader over freshly-built container bytes.
pub fn reader(bytes: Vec<u8>) -> vft::stream::ByteReader<Cursor<Vec<u8>>> {
    vft::stream::ByteReader::new(Cursor::new(bytes))
}
